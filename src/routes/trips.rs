//! Trips, their expenses and the printable trip sheet.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::{attachment, CurrentUser};
use crate::auth::perm;
use crate::error::AppResult;
use crate::models::TripView;
use crate::reports;
use crate::server::SharedState;
use crate::trips::{self, NewTrip, TripExpenseUpdate, TripFilter};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/trips", get(list_trips).post(create_trip))
        .route("/api/trips/running", get(running_trips))
        .route(
            "/api/trips/{id}",
            get(get_trip).patch(update_trip).delete(delete_trip),
        )
        .route("/api/trips/{id}/complete", post(complete_trip))
        .route("/api/trips/{id}/sheet.pdf", get(trip_sheet))
}

async fn list_trips(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(filter): Query<TripFilter>,
) -> AppResult<Json<Vec<TripView>>> {
    user.require(perm::VIEW_RECORDS)?;
    let trips = state
        .db
        .call(move |conn| trips::list_trips(conn, &filter))
        .await?;
    Ok(Json(trips))
}

async fn running_trips(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<TripView>>> {
    user.require(perm::VIEW_RECORDS)?;
    Ok(Json(state.db.call(trips::running_trips).await?))
}

async fn create_trip(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(input): Json<NewTrip>,
) -> AppResult<(StatusCode, Json<TripView>)> {
    user.require(perm::CREATE_TRIP)?;
    let by = user.user_id().to_string();
    let trip = state
        .db
        .call(move |conn| trips::create_trip(conn, input, Some(&by)))
        .await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn get_trip(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<TripView>> {
    user.require(perm::VIEW_RECORDS)?;
    Ok(Json(state.db.call(move |conn| trips::get_trip(conn, &id)).await?))
}

async fn update_trip(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(update): Json<TripExpenseUpdate>,
) -> AppResult<Json<TripView>> {
    user.require(perm::CREATE_TRIP)?;
    let trip = state
        .db
        .call(move |conn| trips::update_trip_expenses(conn, &id, update))
        .await?;
    Ok(Json(trip))
}

async fn complete_trip(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<TripView>> {
    user.require(perm::CREATE_TRIP)?;
    let trip = state
        .db
        .call(move |conn| trips::complete_trip(conn, &id))
        .await?;
    Ok(Json(trip))
}

async fn delete_trip(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    user.require(perm::DELETE_RECORDS)?;
    state
        .db
        .call(move |conn| trips::delete_trip(conn, &id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn trip_sheet(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    user.require(perm::VIEW_RECORDS)?;
    let file = state
        .db
        .call(move |conn| reports::trip_sheet(conn, &id))
        .await?;
    Ok(attachment(file))
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::server::tests::{admin_token, body_json, send, test_app};
    use axum::http::StatusCode;
    use axum::Router;
    use serde_json::{json, Value};

    /// Truck, driver and route through the API, then a running trip.
    pub(crate) async fn start_trip(app: &Router, token: &str) -> Value {
        let truck = json!({ "lorry_number": "TN38BY4455" });
        let truck = body_json(send(app, "POST", "/api/trucks", Some(token), Some(truck)).await).await;
        let driver = json!({
            "driver_name": "Selvam",
            "license_number": "TN-38-2011",
            "phone_number": "9443012345",
        });
        let driver = body_json(send(app, "POST", "/api/drivers", Some(token), Some(driver)).await).await;
        let route = json!({ "from_location": "Coimbatore", "to_location": "Chennai", "distance_km": 510.0 });
        let route = body_json(send(app, "POST", "/api/routes", Some(token), Some(route)).await).await;

        let trip = json!({
            "truck_id": truck["id"],
            "driver_id": driver["id"],
            "route_id": route["id"],
            "starting_time": "2026-10-19T06:30",
            "diesel_cost": 9000.0,
            "toll_charges": 1250.0,
        });
        let resp = send(app, "POST", "/api/trips", Some(token), Some(trip)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp).await
    }

    #[tokio::test]
    async fn trip_lifecycle() {
        let (app, _) = test_app();
        let token = admin_token(&app).await;
        let trip = start_trip(&app, &token).await;
        assert_eq!(trip["trip_status"], "running");
        assert_eq!(trip["from_location"], "Coimbatore");
        assert_eq!(trip["lorry_number"], "TN38BY4455");
        let code = trip["trip_id"].as_str().expect("code").to_string();
        assert!(code.starts_with("TRIP-"));

        let uri = format!("/api/trips/{code}");
        let resp = send(&app, "PATCH", &uri, Some(&token), Some(json!({ "driver_allowance": 800.0 }))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["driver_allowance"], 800.0);

        let resp = send(&app, "GET", "/api/trips/running", Some(&token), None).await;
        assert_eq!(body_json(resp).await.as_array().map(Vec::len), Some(1));

        let resp = send(&app, "POST", &format!("{uri}/complete"), Some(&token), None).await;
        let done = body_json(resp).await;
        assert_eq!(done["trip_status"], "completed");
        assert!(done["ending_time"].is_string());

        let resp = send(&app, "POST", &format!("{uri}/complete"), Some(&token), None).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = send(&app, "GET", "/api/trips?status=completed&limit=5", Some(&token), None).await;
        assert_eq!(body_json(resp).await.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn trip_sheet_is_pdf_attachment() {
        let (app, _) = test_app();
        let token = admin_token(&app).await;
        let trip = start_trip(&app, &token).await;
        let uri = format!("/api/trips/{}/sheet.pdf", trip["id"].as_str().expect("id"));
        let resp = send(&app, "GET", &uri, Some(&token), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "application/pdf");
        let disposition = resp.headers()["content-disposition"].to_str().expect("header");
        assert!(disposition.starts_with("attachment; filename=\"Trip-Sheet-TRIP-"));
    }

    #[tokio::test]
    async fn inactive_truck_cannot_start_trip() {
        let (app, _) = test_app();
        let token = admin_token(&app).await;
        let trip = start_trip(&app, &token).await;
        let truck_uri = format!("/api/trucks/{}", trip["truck_id"].as_str().expect("truck"));
        send(&app, "PATCH", &truck_uri, Some(&token), Some(json!({ "status": "maintenance" }))).await;

        let again = json!({
            "truck_id": trip["truck_id"],
            "driver_id": trip["driver_id"],
            "route_id": trip["route_id"],
            "starting_time": "2026-10-20T06:00",
        });
        let resp = send(&app, "POST", "/api/trips", Some(&token), Some(again)).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
