//! Payments collected against GC notes.
//!
//! A payment may not exceed the note's outstanding balance. When the
//! collected total reaches the note's amount the note becomes `paid`.

use chrono::Local;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::format;
use crate::gc_notes;
use crate::input;
use crate::models::{GcNoteView, Payment, PaymentMethod, PaymentStatus};

/// Paise-level tolerance for float comparisons on money.
const EPSILON: f64 = 0.005;

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub amount: f64,
    pub payment_method: PaymentMethod,
    /// `YYYY-MM-DD`; today when omitted.
    #[serde(default)]
    pub payment_date: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub gc_note: GcNoteView,
    pub outstanding: f64,
}

fn collected(conn: &Connection, gc_note_id: &str) -> AppResult<f64> {
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE gc_note_id = ?1",
        params![gc_note_id],
        |row| row.get(0),
    )?)
}

/// Amount still to be collected on a note.
pub fn outstanding_balance(conn: &Connection, gc_note_id: &str) -> AppResult<f64> {
    let note = gc_notes::get_gc_note(conn, gc_note_id)?.note;
    if note.payment_status == PaymentStatus::Paid {
        return Ok(0.0);
    }
    let paid = collected(conn, &note.id)?;
    Ok(format::round2((note.total_amount - paid).max(0.0)))
}

pub fn record_payment(
    conn: &Connection,
    gc_note_id: &str,
    input: NewPayment,
    received_by: Option<&str>,
) -> AppResult<PaymentReceipt> {
    let note = gc_notes::get_gc_note(conn, gc_note_id)?.note;
    if note.payment_status == PaymentStatus::Paid {
        return Err(AppError::Conflict(format!(
            "GC note {} is already paid",
            note.gc_number
        )));
    }
    let amount = input::positive(input.amount, "amount")?;
    let outstanding = outstanding_balance(conn, &note.id)?;
    if amount > outstanding + EPSILON {
        return Err(AppError::validation(format!(
            "amount {} exceeds outstanding balance {}",
            format::format_currency(amount),
            format::format_currency(outstanding)
        )));
    }
    let payment_date = input::optional_date(input.payment_date, "payment_date")?
        .unwrap_or_else(|| Local::now().date_naive().format("%Y-%m-%d").to_string());

    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO payments (id, gc_note_id, payment_date, amount, payment_method,
            reference_number, remarks, received_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            note.id,
            payment_date,
            amount,
            input.payment_method,
            input::optional_text(input.reference_number),
            input::optional_text(input.remarks),
            received_by,
            now
        ],
    )?;
    let remaining = format::round2(outstanding - amount);
    if remaining <= EPSILON {
        tx.execute(
            "UPDATE gc_notes SET payment_status = ?1, updated_at = ?2 WHERE id = ?3",
            params![PaymentStatus::Paid, now, note.id],
        )?;
    }
    tx.commit()?;

    info!(
        gc_number = %note.gc_number,
        amount,
        method = %input.payment_method,
        "payment recorded"
    );

    let payment = conn.query_row(
        "SELECT * FROM payments WHERE id = ?1",
        params![id],
        Payment::from_row,
    )?;
    Ok(PaymentReceipt {
        payment,
        gc_note: gc_notes::get_gc_note(conn, &note.id)?,
        outstanding: remaining.max(0.0),
    })
}

pub fn list_payments(conn: &Connection, gc_note_id: &str) -> AppResult<Vec<Payment>> {
    let note = gc_notes::get_gc_note(conn, gc_note_id)?.note;
    let mut stmt = conn.prepare(
        "SELECT * FROM payments WHERE gc_note_id = ?1 ORDER BY payment_date, created_at",
    )?;
    let rows = stmt
        .query_map(params![note.id], Payment::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
