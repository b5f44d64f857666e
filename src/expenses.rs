//! Standalone expense ledger (fuel, tolls, maintenance, allowances), optionally
//! tied to a trip. Independent of the per-trip expense columns.

use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::format;
use crate::input;
use crate::models::{Expense, ExpenseType};
use crate::trips;

#[derive(Debug, Clone, Deserialize)]
pub struct NewExpense {
    /// Row id or `TRIP-…` code.
    #[serde(default)]
    pub trip_id: Option<String>,
    pub expense_type: ExpenseType,
    pub amount: f64,
    /// `YYYY-MM-DD`; today when omitted.
    #[serde(default)]
    pub expense_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseFilter {
    pub trip_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExpenseTotal {
    pub expense_type: ExpenseType,
    pub label: &'static str,
    pub count: i64,
    pub total: f64,
}

fn date_bounds(from: Option<String>, to: Option<String>) -> AppResult<(Option<String>, Option<String>)> {
    let from = input::optional_date(from, "from")?;
    let to = input::optional_date(to, "to")?;
    if let (Some(f), Some(t)) = (&from, &to) {
        if f > t {
            return Err(AppError::validation("from must not be after to"));
        }
    }
    Ok((from, to))
}

pub fn create_expense(conn: &Connection, input: NewExpense, created_by: Option<&str>) -> AppResult<Expense> {
    let trip_row_id = match input::optional_text(input.trip_id) {
        Some(t) => Some(trips::get_trip(conn, &t)?.trip.id),
        None => None,
    };
    let amount = input::positive(input.amount, "amount")?;
    let expense_date = input::optional_date(input.expense_date, "expense_date")?
        .unwrap_or_else(|| Local::now().date_naive().format("%Y-%m-%d").to_string());

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO expenses (id, trip_id, expense_type, amount, expense_date, description,
            created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            trip_row_id,
            input.expense_type,
            amount,
            expense_date,
            input::optional_text(input.description),
            created_by,
            db::now_ts()
        ],
    )?;
    info!(expense_id = %id, kind = %input.expense_type, amount, "expense recorded");
    get_expense(conn, &id)
}

pub fn get_expense(conn: &Connection, id: &str) -> AppResult<Expense> {
    conn.query_row("SELECT * FROM expenses WHERE id = ?1", params![id], Expense::from_row)
        .optional()?
        .ok_or_else(|| AppError::not_found("expense", id))
}

/// Latest first, filtered by trip and an inclusive date range.
pub fn list_expenses(conn: &Connection, filter: &ExpenseFilter) -> AppResult<Vec<Expense>> {
    let trip_row_id = match &filter.trip_id {
        Some(t) => Some(trips::get_trip(conn, t)?.trip.id),
        None => None,
    };
    let (from, to) = date_bounds(filter.from.clone(), filter.to.clone())?;
    let mut stmt = conn.prepare(
        "SELECT * FROM expenses
         WHERE (?1 IS NULL OR trip_id = ?1)
           AND (?2 IS NULL OR expense_date >= ?2)
           AND (?3 IS NULL OR expense_date <= ?3)
         ORDER BY expense_date DESC, created_at DESC",
    )?;
    let rows = stmt
        .query_map(params![trip_row_id, from, to], Expense::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_expense(conn: &Connection, id: &str) -> AppResult<()> {
    let n = conn.execute("DELETE FROM expenses WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(AppError::not_found("expense", id));
    }
    info!(expense_id = %id, "expense deleted");
    Ok(())
}

/// Totals per expense type over an inclusive date range. Types with no
/// entries are reported with zero.
pub fn expense_totals_by_type(
    conn: &Connection,
    from: Option<String>,
    to: Option<String>,
) -> AppResult<Vec<ExpenseTotal>> {
    let (from, to) = date_bounds(from, to)?;
    let mut stmt = conn.prepare(
        "SELECT expense_type, COUNT(*), COALESCE(SUM(amount), 0) FROM expenses
         WHERE (?1 IS NULL OR expense_date >= ?1)
           AND (?2 IS NULL OR expense_date <= ?2)
         GROUP BY expense_type",
    )?;
    let found = stmt
        .query_map(params![from, to], |row| {
            Ok((
                row.get::<_, ExpenseType>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExpenseType::ALL
        .iter()
        .map(|kind| {
            let (count, total) = found
                .iter()
                .find(|(k, _, _)| k == kind)
                .map(|(_, c, t)| (*c, format::round2(*t)))
                .unwrap_or((0, 0.0));
            ExpenseTotal {
                expense_type: *kind,
                label: kind.label(),
                count,
                total,
            }
        })
        .collect())
}
