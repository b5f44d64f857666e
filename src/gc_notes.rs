//! GC notes (goods consignment notes): creation, listing, delivery and
//! payment status, and delivery-proof images.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::ImageFormat;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::format;
use crate::input;
use crate::models::{
    DeliveryOption, DeliveryStatus, GcNoteView, PaymentMode, PaymentStatus, TripStatus,
};
use crate::trips;

pub(crate) const GC_VIEW_SELECT: &str = "SELECT g.*, t.trip_id AS trip_code, t.from_location,
            t.to_location, tk.lorry_number
     FROM gc_notes g
     JOIN trips t ON t.id = g.trip_id
     JOIN trucks tk ON tk.id = t.truck_id";

const DEFAULT_LIST_LIMIT: u32 = 50;
const GSTIN_LEN: usize = 15;
const MAX_PROOF_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct NewGcNote {
    /// Row id or `TRIP-…` code of a running trip.
    pub trip_id: String,
    #[serde(default)]
    pub date_time: Option<String>,
    pub consignor_name: String,
    pub consignor_address: String,
    pub consignor_phone: String,
    #[serde(default)]
    pub consignor_gstin: Option<String>,
    pub consignee_name: String,
    pub consignee_address: String,
    pub consignee_phone: String,
    #[serde(default)]
    pub consignee_gstin: Option<String>,
    pub number_of_articles: i64,
    pub description_of_goods: String,
    pub weight_kg: f64,
    #[serde(default)]
    pub freight_rate: f64,
    #[serde(default)]
    pub freight_amount: Option<f64>,
    #[serde(default)]
    pub hc_charge: Option<f64>,
    #[serde(default)]
    pub sc_charge: Option<f64>,
    pub payment_mode: PaymentMode,
    #[serde(default)]
    pub delivery_option: Option<DeliveryOption>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GcNoteFilter {
    pub trip_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub delivery_status: Option<DeliveryStatus>,
    pub limit: Option<u32>,
}

fn gstin(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    match input::optional_text(value) {
        None => Ok(None),
        Some(v) => {
            let v = v.to_uppercase();
            if v.len() != GSTIN_LEN || !v.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(AppError::validation(format!(
                    "{field} must be {GSTIN_LEN} letters or digits"
                )));
            }
            Ok(Some(v))
        }
    }
}

/// Book a consignment on a running trip.
pub fn create_gc_note(
    conn: &Connection,
    input: NewGcNote,
    created_by: Option<&str>,
) -> AppResult<GcNoteView> {
    let trip = trips::get_trip(conn, &input.trip_id)?.trip;
    if trip.trip_status != TripStatus::Running {
        return Err(AppError::validation(format!(
            "trip {} is completed; GC notes can only be added to running trips",
            trip.trip_id
        )));
    }

    let date_time = match input::optional_text(input.date_time) {
        Some(v) => format::parse_timestamp(&v)?,
        None => db::now_ts(),
    };
    let consignor_name = input::required(&input.consignor_name, "consignor_name")?;
    let consignor_address = input::required(&input.consignor_address, "consignor_address")?;
    let consignor_phone = input::required(&input.consignor_phone, "consignor_phone")?;
    let consignor_gstin = gstin(input.consignor_gstin, "consignor_gstin")?;
    let consignee_name = input::required(&input.consignee_name, "consignee_name")?;
    let consignee_address = input::required(&input.consignee_address, "consignee_address")?;
    let consignee_phone = input::required(&input.consignee_phone, "consignee_phone")?;
    let consignee_gstin = gstin(input.consignee_gstin, "consignee_gstin")?;
    if input.number_of_articles < 1 {
        return Err(AppError::validation("number_of_articles must be at least 1"));
    }
    let description = input::required(&input.description_of_goods, "description_of_goods")?;
    let weight_kg = input::positive(input.weight_kg, "weight_kg")?;
    let freight_rate = input::non_negative(input.freight_rate, "freight_rate")?;
    let freight_amount = input::non_negative(
        input
            .freight_amount
            .unwrap_or_else(|| format::round2(freight_rate * weight_kg)),
        "freight_amount",
    )?;
    let hc_charge = input::non_negative(input.hc_charge.unwrap_or(0.0), "hc_charge")?;
    let sc_charge = input::non_negative(input.sc_charge.unwrap_or(0.0), "sc_charge")?;
    let payment_status = input.payment_mode.initial_payment_status();
    let delivery_option = input.delivery_option.unwrap_or(DeliveryOption::Office);
    let remarks = input::optional_text(input.remarks);

    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    let gc_number = db::insert_with_unique_code(format::generate_gc_number, |code| {
        conn.execute(
            "INSERT INTO gc_notes (id, gc_number, trip_id, date_time, consignor_name, consignor_address,
                consignor_phone, consignor_gstin, consignee_name, consignee_address, consignee_phone,
                consignee_gstin, number_of_articles, description_of_goods, weight_kg, freight_rate,
                freight_amount, hc_charge, sc_charge, payment_mode, payment_status, delivery_option,
                delivery_status, qr_code_data, remarks, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                ?18, ?19, ?20, ?21, ?22, ?23, ?2, ?24, ?25, ?26, ?26)",
            params![
                id,
                code,
                trip.id,
                date_time,
                consignor_name,
                consignor_address,
                consignor_phone,
                consignor_gstin,
                consignee_name,
                consignee_address,
                consignee_phone,
                consignee_gstin,
                input.number_of_articles,
                description,
                weight_kg,
                freight_rate,
                freight_amount,
                hc_charge,
                sc_charge,
                input.payment_mode,
                payment_status,
                delivery_option,
                DeliveryStatus::Pending,
                remarks,
                created_by,
                now
            ],
        )
    })?;

    info!(gc_number = %gc_number, trip_id = %trip.trip_id, "GC note created");
    get_gc_note(conn, &id)
}

/// Fetch by row id or GC number.
pub fn get_gc_note(conn: &Connection, id: &str) -> AppResult<GcNoteView> {
    conn.query_row(
        &format!("{GC_VIEW_SELECT} WHERE g.id = ?1 OR g.gc_number = ?1"),
        params![id],
        GcNoteView::from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("GC note", id))
}

/// Newest first, at most 50 unless a limit is given.
pub fn list_gc_notes(conn: &Connection, filter: &GcNoteFilter) -> AppResult<Vec<GcNoteView>> {
    let trip_row_id = match &filter.trip_id {
        Some(t) => Some(trips::get_trip(conn, t)?.trip.id),
        None => None,
    };
    let limit = i64::from(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT));
    let mut stmt = conn.prepare(&format!(
        "{GC_VIEW_SELECT}
         WHERE (?1 IS NULL OR g.trip_id = ?1)
           AND (?2 IS NULL OR g.payment_status = ?2)
           AND (?3 IS NULL OR g.delivery_status = ?3)
         ORDER BY g.created_at DESC, g.rowid DESC
         LIMIT ?4"
    ))?;
    let rows = stmt
        .query_map(
            params![
                trip_row_id,
                filter.payment_status,
                filter.delivery_status,
                limit
            ],
            GcNoteView::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_gc_note(conn: &Connection, id: &str) -> AppResult<()> {
    let note = get_gc_note(conn, id)?.note;
    conn.execute("DELETE FROM gc_notes WHERE id = ?1", params![note.id])?;
    if let Some(path) = &note.delivery_proof_image {
        remove_proof_file(Path::new(path));
    }
    info!(gc_number = %note.gc_number, "GC note deleted");
    Ok(())
}

/// Move delivery forward. Reaching `delivered` records when and by whom.
pub fn update_delivery_status(
    conn: &Connection,
    id: &str,
    status: DeliveryStatus,
    by: Option<&str>,
) -> AppResult<GcNoteView> {
    let note = get_gc_note(conn, id)?.note;
    if !note.delivery_status.can_advance_to(status) {
        return Err(AppError::Conflict(format!(
            "delivery status cannot go from {} to {status}",
            note.delivery_status
        )));
    }
    let now = db::now_ts();
    if status == DeliveryStatus::Delivered {
        conn.execute(
            "UPDATE gc_notes SET delivery_status = ?1, delivered_at = ?2, delivered_by = ?3,
                updated_at = ?2
             WHERE id = ?4",
            params![status, now, by, note.id],
        )?;
    } else {
        conn.execute(
            "UPDATE gc_notes SET delivery_status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, now, note.id],
        )?;
    }
    info!(gc_number = %note.gc_number, status = %status, "delivery status updated");
    get_gc_note(conn, &note.id)
}

/// Change payment status; `paid` cannot be left once reached.
pub fn update_payment_status(
    conn: &Connection,
    id: &str,
    status: PaymentStatus,
) -> AppResult<GcNoteView> {
    let note = get_gc_note(conn, id)?.note;
    if !note.payment_status.can_change_to(status) {
        return Err(AppError::Conflict(format!(
            "payment status cannot go from {} to {status}",
            note.payment_status
        )));
    }
    conn.execute(
        "UPDATE gc_notes SET payment_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, db::now_ts(), note.id],
    )?;
    info!(gc_number = %note.gc_number, status = %status, "payment status updated");
    get_gc_note(conn, &note.id)
}

// ---------------------------------------------------------------------------
// Delivery proof
// ---------------------------------------------------------------------------

fn decode_image(payload: &str) -> AppResult<(Vec<u8>, ImageFormat)> {
    let data = match payload.trim().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, b64)| b64)
            .ok_or_else(|| AppError::validation("malformed data URL"))?,
        None => payload.trim(),
    };
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| AppError::validation(format!("image is not valid base64: {e}")))?;
    if bytes.len() > MAX_PROOF_BYTES {
        return Err(AppError::validation("image is larger than 5 MB"));
    }
    let fmt = image::guess_format(&bytes)
        .ok()
        .filter(|f| matches!(f, ImageFormat::Png | ImageFormat::Jpeg))
        .ok_or_else(|| AppError::validation("image must be PNG or JPEG"))?;
    image::load_from_memory_with_format(&bytes, fmt)
        .map_err(|e| AppError::validation(format!("image could not be decoded: {e}")))?;
    Ok((bytes, fmt))
}

fn extension(fmt: ImageFormat) -> &'static str {
    if fmt == ImageFormat::Png {
        "png"
    } else {
        "jpg"
    }
}

fn remove_proof_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "could not remove delivery proof");
    }
}

/// Store a PNG/JPEG proof-of-delivery image (base64 or data URL) under
/// `proof_dir/<gc_number>.<ext>` and record its path.
pub fn attach_delivery_proof(
    conn: &Connection,
    proof_dir: &Path,
    id: &str,
    payload: &str,
) -> AppResult<GcNoteView> {
    let note = get_gc_note(conn, id)?.note;
    let (bytes, fmt) = decode_image(payload)?;

    fs::create_dir_all(proof_dir)?;
    let path = proof_dir.join(format!("{}.{}", note.gc_number, extension(fmt)));
    let replaced = note
        .delivery_proof_image
        .as_deref()
        .filter(|old| Path::new(old) != path);
    fs::write(&path, &bytes)?;

    if let Err(e) = conn.execute(
        "UPDATE gc_notes SET delivery_proof_image = ?1, updated_at = ?2 WHERE id = ?3",
        params![path.to_string_lossy().into_owned(), db::now_ts(), note.id],
    ) {
        if note.delivery_proof_image.as_deref().map(Path::new) != Some(path.as_path()) {
            remove_proof_file(&path);
        }
        return Err(e.into());
    }
    if let Some(old) = replaced {
        remove_proof_file(Path::new(old));
    }
    info!(gc_number = %note.gc_number, bytes = bytes.len(), "delivery proof stored");
    get_gc_note(conn, &note.id)
}

/// Stored proof image bytes and MIME type.
pub fn delivery_proof(conn: &Connection, id: &str) -> AppResult<(Vec<u8>, &'static str)> {
    let note = get_gc_note(conn, id)?.note;
    let path = note
        .delivery_proof_image
        .map(PathBuf::from)
        .ok_or_else(|| AppError::NotFound(format!("delivery proof for {}", note.gc_number)))?;
    let bytes = fs::read(&path)?;
    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        _ => "image/jpeg",
    };
    Ok((bytes, mime))
}
