//! Field checks shared by the record modules.

use crate::error::{AppError, AppResult};
use crate::format;

/// Trimmed, non-empty text.
pub fn required(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Trimmed text; blank becomes `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Optional `YYYY-MM-DD`; blank becomes `None`.
pub fn optional_date(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    match optional_text(value) {
        None => Ok(None),
        Some(v) => format::parse_date(&v)
            .map(|d| Some(d.format("%Y-%m-%d").to_string()))
            .map_err(|_| AppError::validation(format!("{field} must be a YYYY-MM-DD date"))),
    }
}

pub fn non_negative(value: f64, field: &str) -> AppResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::validation(format!("{field} must be zero or more")));
    }
    Ok(value)
}

pub fn positive(value: f64, field: &str) -> AppResult<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::validation(format!("{field} must be greater than zero")));
    }
    Ok(value)
}

pub fn optional_positive(value: Option<f64>, field: &str) -> AppResult<Option<f64>> {
    value.map(|v| positive(v, field)).transpose()
}
