//! Presentation helpers: Indian currency grouping, dates, record codes.

use chrono::{
    DateTime, Datelike, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Group the integer part of a non-negative amount the en-IN way:
/// last three digits, then pairs (`12,34,567`).
fn group_indian(integer: u64) -> String {
    let digits = integer.to_string();
    if digits.len() <= 3 {
        return digits;
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 0 {
        let start = end.saturating_sub(2);
        groups.push(&head[start..end]);
        end = start;
    }
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}

fn split_amount(amount: f64) -> (bool, u64, u64) {
    let paise = (amount.abs() * 100.0).round() as u64;
    (amount < 0.0 && paise > 0, paise / 100, paise % 100)
}

/// `₹1,23,456.78`; negatives as `-₹500.00`.
pub fn format_currency(amount: f64) -> String {
    let (negative, rupees, paise) = split_amount(amount);
    let sign = if negative { "-" } else { "" };
    format!("{sign}\u{20b9}{}.{paise:02}", group_indian(rupees))
}

/// ASCII rupee amount for the PDF renderer (`Rs. 123456.78`).
pub fn format_rupees(amount: f64) -> String {
    let (negative, rupees, paise) = split_amount(amount);
    let sign = if negative { "-" } else { "" };
    format!("{sign}Rs. {rupees}.{paise:02}")
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Stored form of an instant: RFC 3339, UTC, milliseconds, `Z` suffix.
pub fn stored_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accept an RFC 3339 instant or a local `YYYY-MM-DDTHH:MM[:SS]` form value
/// and return the stored UTC form.
pub fn parse_timestamp(input: &str) -> AppResult<String> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(stored_ts(dt.with_timezone(&Utc)));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
            let local = Local
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| AppError::validation(format!("nonexistent local time: {s}")))?;
            return Ok(stored_ts(local.with_timezone(&Utc)));
        }
    }
    Err(AppError::validation(format!("invalid timestamp: {s:?}")))
}

/// `YYYY-MM-DD`.
pub fn parse_date(input: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("invalid date (expected YYYY-MM-DD): {input:?}")))
}

fn parse_stored(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn date_in<Tz: TimeZone>(ts: &str, tz: &Tz) -> Option<NaiveDate> {
    if let Some(dt) = parse_stored(ts) {
        return Some(dt.with_timezone(tz).date_naive());
    }
    NaiveDate::parse_from_str(ts, "%Y-%m-%d").ok()
}

fn format_datetime_in<Tz: TimeZone>(ts: &str, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match parse_stored(ts) {
        Some(dt) => dt
            .with_timezone(tz)
            .format("%d %b %Y, %I:%M %P")
            .to_string(),
        None => format_date(ts),
    }
}

/// `19 Oct 2026`. Accepts a stored timestamp or a bare date.
pub fn format_date(ts: &str) -> String {
    match date_in(ts, &Local) {
        Some(d) => d.format("%d %b %Y").to_string(),
        None => ts.to_string(),
    }
}

/// `19 Oct 2026, 02:30 pm` in local time.
pub fn format_datetime(ts: &str) -> String {
    format_datetime_in(ts, &Local)
}

/// `19/10/2026`.
pub fn format_short_date(ts: &str) -> String {
    match date_in(ts, &Local) {
        Some(d) => d.format("%d/%m/%Y").to_string(),
        None => ts.to_string(),
    }
}

/// `October 2026`.
pub fn format_month(date: NaiveDate) -> String {
    format!("{} {}", month_name(date.month()), date.year())
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

// ---------------------------------------------------------------------------
// Record codes
// ---------------------------------------------------------------------------

fn random_suffix(len: usize) -> String {
    let mut n = Uuid::new_v4().as_u128();
    (0..len)
        .map(|_| {
            let c = BASE36[(n % 36) as usize] as char;
            n /= 36;
            c
        })
        .collect()
}

fn code(prefix: &str, suffix_len: usize) -> String {
    format!(
        "{prefix}-{}-{}",
        Utc::now().format("%Y%m%d"),
        random_suffix(suffix_len)
    )
}

/// `TRIP-YYYYMMDD-XXXX`
pub fn generate_trip_id() -> String {
    code("TRIP", 4)
}

/// `GC-YYYYMMDD-XXXXX`
pub fn generate_gc_number() -> String {
    code("GC", 5)
}
