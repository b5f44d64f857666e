//! GC notes: booking, status changes, payments, delivery proof and the
//! printable consignment note.

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::{attachment, CurrentUser};
use crate::auth::perm;
use crate::error::AppResult;
use crate::gc_notes::{self, GcNoteFilter, NewGcNote};
use crate::models::{DeliveryStatus, GcNoteView, Payment, PaymentStatus};
use crate::payments::{self, NewPayment, PaymentReceipt};
use crate::reports;
use crate::server::SharedState;

/// Base64 inflates the 5 MB image cap by a third.
const PROOF_BODY_LIMIT: usize = 8 * 1024 * 1024;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/gc-notes", get(list_notes).post(create_note))
        .route("/api/gc-notes/{id}", get(get_note).delete(delete_note))
        .route("/api/gc-notes/{id}/delivery-status", post(set_delivery_status))
        .route("/api/gc-notes/{id}/payment-status", post(set_payment_status))
        .route(
            "/api/gc-notes/{id}/payments",
            get(list_payments).post(record_payment),
        )
        .route("/api/gc-notes/{id}/document.pdf", get(document))
        .route(
            "/api/gc-notes/{id}/delivery-proof",
            get(get_proof)
                .post(upload_proof)
                .layer(DefaultBodyLimit::max(PROOF_BODY_LIMIT)),
        )
}

#[derive(Deserialize)]
struct StatusChange<T> {
    status: T,
}

#[derive(Deserialize)]
struct ProofUpload {
    /// Base64 or a `data:image/...;base64,` URL.
    image: String,
}

async fn list_notes(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(filter): Query<GcNoteFilter>,
) -> AppResult<Json<Vec<GcNoteView>>> {
    user.require(perm::VIEW_RECORDS)?;
    let notes = state
        .db
        .call(move |conn| gc_notes::list_gc_notes(conn, &filter))
        .await?;
    Ok(Json(notes))
}

async fn create_note(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(input): Json<NewGcNote>,
) -> AppResult<(StatusCode, Json<GcNoteView>)> {
    user.require(perm::CREATE_GC_NOTE)?;
    let by = user.user_id().to_string();
    let note = state
        .db
        .call(move |conn| gc_notes::create_gc_note(conn, input, Some(&by)))
        .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn get_note(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<GcNoteView>> {
    user.require(perm::VIEW_RECORDS)?;
    Ok(Json(
        state
            .db
            .call(move |conn| gc_notes::get_gc_note(conn, &id))
            .await?,
    ))
}

async fn delete_note(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    user.require(perm::DELETE_RECORDS)?;
    state
        .db
        .call(move |conn| gc_notes::delete_gc_note(conn, &id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_delivery_status(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(change): Json<StatusChange<DeliveryStatus>>,
) -> AppResult<Json<GcNoteView>> {
    user.require(perm::UPDATE_STATUS)?;
    let by = user.user_id().to_string();
    let note = state
        .db
        .call(move |conn| gc_notes::update_delivery_status(conn, &id, change.status, Some(&by)))
        .await?;
    Ok(Json(note))
}

async fn set_payment_status(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(change): Json<StatusChange<PaymentStatus>>,
) -> AppResult<Json<GcNoteView>> {
    user.require(perm::UPDATE_STATUS)?;
    let note = state
        .db
        .call(move |conn| gc_notes::update_payment_status(conn, &id, change.status))
        .await?;
    Ok(Json(note))
}

async fn list_payments(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Payment>>> {
    user.require(perm::VIEW_RECORDS)?;
    let payments = state
        .db
        .call(move |conn| {
            let note = gc_notes::get_gc_note(conn, &id)?;
            payments::list_payments(conn, &note.note.id)
        })
        .await?;
    Ok(Json(payments))
}

async fn record_payment(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(input): Json<NewPayment>,
) -> AppResult<(StatusCode, Json<PaymentReceipt>)> {
    user.require(perm::RECORD_PAYMENT)?;
    let by = user.user_id().to_string();
    let receipt = state
        .db
        .call(move |conn| payments::record_payment(conn, &id, input, Some(&by)))
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn document(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    user.require(perm::VIEW_RECORDS)?;
    let file = state
        .db
        .call(move |conn| reports::gc_note_document(conn, &id))
        .await?;
    Ok(attachment(file))
}

async fn upload_proof(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(upload): Json<ProofUpload>,
) -> AppResult<Json<GcNoteView>> {
    user.require(perm::UPDATE_STATUS)?;
    let proof_dir = state.config.proof_dir();
    let note = state
        .db
        .call(move |conn| gc_notes::attach_delivery_proof(conn, &proof_dir, &id, &upload.image))
        .await?;
    Ok(Json(note))
}

async fn get_proof(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    user.require(perm::VIEW_RECORDS)?;
    let (bytes, mime) = state
        .db
        .call(move |conn| gc_notes::delivery_proof(conn, &id))
        .await?;
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use crate::routes::trips::tests::start_trip;
    use crate::server::tests::{admin_token, body_json, send, test_app};
    use axum::http::StatusCode;
    use axum::Router;
    use base64::Engine as _;
    use serde_json::{json, Value};

    async fn book(app: &Router, token: &str, trip: &Value, mode: &str) -> Value {
        let note = json!({
            "trip_id": trip["trip_id"],
            "consignor_name": "Lakshmi Mills",
            "consignor_address": "Avinashi Road, Coimbatore",
            "consignor_phone": "0422-2571234",
            "consignor_gstin": "33aaacl1234f1z5",
            "consignee_name": "Sri Murugan Traders",
            "consignee_address": "Parrys Corner, Chennai",
            "consignee_phone": "044-25221234",
            "number_of_articles": 12,
            "description_of_goods": "Cotton yarn bales",
            "weight_kg": 1200.0,
            "freight_rate": 3.0,
            "hc_charge": 150.0,
            "sc_charge": 150.0,
            "payment_mode": mode,
        });
        let resp = send(app, "POST", "/api/gc-notes", Some(token), Some(note)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp).await
    }

    #[tokio::test]
    async fn booking_and_delivery_flow() {
        let (app, state) = test_app();
        let token = admin_token(&app).await;
        let trip = start_trip(&app, &token).await;
        let note = book(&app, &token, &trip, "topay").await;
        assert_eq!(note["payment_status"], "topay");
        assert_eq!(note["delivery_status"], "pending");
        assert_eq!(note["total_amount"], 3900.0);
        assert_eq!(note["consignor_gstin"], "33AAACL1234F1Z5");
        let gc = note["gc_number"].as_str().expect("gc").to_string();

        let uri = format!("/api/gc-notes/{gc}/delivery-status");
        let resp = send(&app, "POST", &uri, Some(&token), Some(json!({ "status": "delivered" }))).await;
        let delivered = body_json(resp).await;
        assert_eq!(delivered["delivery_status"], "delivered");
        assert!(delivered["delivered_at"].is_string());

        let resp = send(&app, "POST", &uri, Some(&token), Some(json!({ "status": "in_transit" }))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = send(&app, "GET", "/api/gc-notes?payment_status=topay", Some(&token), None).await;
        assert_eq!(body_json(resp).await.as_array().map(Vec::len), Some(1));

        let trip_uri = format!("/api/trips/{}", trip["id"].as_str().expect("id"));
        let resp = send(&app, "GET", &trip_uri, Some(&token), None).await;
        assert_eq!(body_json(resp).await["total_revenue"], 3900.0);
        let _ = std::fs::remove_dir_all(&state.config.data_dir);
    }

    #[tokio::test]
    async fn partial_then_full_payment() {
        let (app, _) = test_app();
        let token = admin_token(&app).await;
        let trip = start_trip(&app, &token).await;
        let note = book(&app, &token, &trip, "topay").await;
        let uri = format!("/api/gc-notes/{}/payments", note["id"].as_str().expect("id"));

        let first = json!({ "amount": 1900.0, "payment_method": "upi", "reference_number": "UPI-88231" });
        let resp = send(&app, "POST", &uri, Some(&token), Some(first)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let receipt = body_json(resp).await;
        assert_eq!(receipt["outstanding"], 2000.0);
        assert_eq!(receipt["gc_note"]["payment_status"], "topay");

        let too_much = json!({ "amount": 2500.0, "payment_method": "cash" });
        let resp = send(&app, "POST", &uri, Some(&token), Some(too_much)).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let rest = json!({ "amount": 2000.0, "payment_method": "cash" });
        let resp = send(&app, "POST", &uri, Some(&token), Some(rest)).await;
        let receipt = body_json(resp).await;
        assert_eq!(receipt["gc_note"]["payment_status"], "paid");

        let resp = send(&app, "GET", &uri, Some(&token), None).await;
        assert_eq!(body_json(resp).await.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn document_and_delivery_proof() {
        let (app, state) = test_app();
        let token = admin_token(&app).await;
        let trip = start_trip(&app, &token).await;
        let note = book(&app, &token, &trip, "cash").await;
        let id = note["id"].as_str().expect("id");

        let resp = send(&app, "GET", &format!("/api/gc-notes/{id}/document.pdf"), Some(&token), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "application/pdf");

        let proof_uri = format!("/api/gc-notes/{id}/delivery-proof");
        let resp = send(&app, "GET", &proof_uri, Some(&token), None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let mut png = Vec::new();
        image::RgbImage::new(2, 2)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode png");
        let payload = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let resp = send(&app, "POST", &proof_uri, Some(&token), Some(json!({ "image": payload }))).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&app, "GET", &proof_uri, Some(&token), None).await;
        assert_eq!(resp.headers()["content-type"], "image/png");
        let _ = std::fs::remove_dir_all(&state.config.data_dir);
    }
}
