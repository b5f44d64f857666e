//! Trucks, drivers, routes and document expiry.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::CurrentUser;
use crate::auth::perm;
use crate::error::AppResult;
use crate::master::{
    self, DriverUpdate, ExpiringDocument, NewDriver, NewRoute, NewTruck, RouteUpdate, TruckUpdate,
};
use crate::models::{Driver, DriverStatus, Route, Truck, TruckStatus};
use crate::server::SharedState;

const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 30;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/trucks", get(list_trucks).post(create_truck))
        .route(
            "/api/trucks/{id}",
            get(get_truck).patch(update_truck).delete(delete_truck),
        )
        .route("/api/drivers", get(list_drivers).post(create_driver))
        .route(
            "/api/drivers/{id}",
            get(get_driver).patch(update_driver).delete(delete_driver),
        )
        .route("/api/routes", get(list_routes).post(create_route))
        .route(
            "/api/routes/{id}",
            get(get_route).patch(update_route).delete(delete_route),
        )
        .route("/api/master/expiring", get(expiring))
}

#[derive(Deserialize)]
struct StatusQuery<T> {
    status: Option<T>,
}

#[derive(Deserialize)]
struct ExpiringQuery {
    days: Option<i64>,
}

// ── Trucks ────────────────────────────────────────────────────────────

async fn list_trucks(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(q): Query<StatusQuery<TruckStatus>>,
) -> AppResult<Json<Vec<Truck>>> {
    user.require(perm::VIEW_RECORDS)?;
    let trucks = state
        .db
        .call(move |conn| master::list_trucks(conn, q.status))
        .await?;
    Ok(Json(trucks))
}

async fn create_truck(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(input): Json<NewTruck>,
) -> AppResult<(StatusCode, Json<Truck>)> {
    user.require(perm::MANAGE_MASTER_DATA)?;
    let truck = state
        .db
        .call(move |conn| master::create_truck(conn, input))
        .await?;
    Ok((StatusCode::CREATED, Json(truck)))
}

async fn get_truck(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Truck>> {
    user.require(perm::VIEW_RECORDS)?;
    Ok(Json(state.db.call(move |conn| master::get_truck(conn, &id)).await?))
}

async fn update_truck(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(update): Json<TruckUpdate>,
) -> AppResult<Json<Truck>> {
    user.require(perm::MANAGE_MASTER_DATA)?;
    let truck = state
        .db
        .call(move |conn| master::update_truck(conn, &id, update))
        .await?;
    Ok(Json(truck))
}

async fn delete_truck(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    user.require(perm::MANAGE_MASTER_DATA)?;
    state
        .db
        .call(move |conn| master::delete_truck(conn, &id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Drivers ───────────────────────────────────────────────────────────

async fn list_drivers(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(q): Query<StatusQuery<DriverStatus>>,
) -> AppResult<Json<Vec<Driver>>> {
    user.require(perm::VIEW_RECORDS)?;
    let drivers = state
        .db
        .call(move |conn| master::list_drivers(conn, q.status))
        .await?;
    Ok(Json(drivers))
}

async fn create_driver(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(input): Json<NewDriver>,
) -> AppResult<(StatusCode, Json<Driver>)> {
    user.require(perm::MANAGE_MASTER_DATA)?;
    let driver = state
        .db
        .call(move |conn| master::create_driver(conn, input))
        .await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn get_driver(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Driver>> {
    user.require(perm::VIEW_RECORDS)?;
    Ok(Json(state.db.call(move |conn| master::get_driver(conn, &id)).await?))
}

async fn update_driver(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(update): Json<DriverUpdate>,
) -> AppResult<Json<Driver>> {
    user.require(perm::MANAGE_MASTER_DATA)?;
    let driver = state
        .db
        .call(move |conn| master::update_driver(conn, &id, update))
        .await?;
    Ok(Json(driver))
}

async fn delete_driver(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    user.require(perm::MANAGE_MASTER_DATA)?;
    state
        .db
        .call(move |conn| master::delete_driver(conn, &id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Routes ────────────────────────────────────────────────────────────

async fn list_routes(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Route>>> {
    user.require(perm::VIEW_RECORDS)?;
    Ok(Json(state.db.call(master::list_routes).await?))
}

async fn create_route(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(input): Json<NewRoute>,
) -> AppResult<(StatusCode, Json<Route>)> {
    user.require(perm::MANAGE_MASTER_DATA)?;
    let route = state
        .db
        .call(move |conn| master::create_route(conn, input))
        .await?;
    Ok((StatusCode::CREATED, Json(route)))
}

async fn get_route(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Route>> {
    user.require(perm::VIEW_RECORDS)?;
    Ok(Json(state.db.call(move |conn| master::get_route(conn, &id)).await?))
}

async fn update_route(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(update): Json<RouteUpdate>,
) -> AppResult<Json<Route>> {
    user.require(perm::MANAGE_MASTER_DATA)?;
    let route = state
        .db
        .call(move |conn| master::update_route(conn, &id, update))
        .await?;
    Ok(Json(route))
}

async fn delete_route(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    user.require(perm::MANAGE_MASTER_DATA)?;
    state
        .db
        .call(move |conn| master::delete_route(conn, &id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Document expiry ───────────────────────────────────────────────────

async fn expiring(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(q): Query<ExpiringQuery>,
) -> AppResult<Json<Vec<ExpiringDocument>>> {
    user.require(perm::VIEW_RECORDS)?;
    let days = q.days.unwrap_or(DEFAULT_EXPIRY_WINDOW_DAYS);
    let docs = state
        .db
        .call(move |conn| master::expiring_documents(conn, days))
        .await?;
    Ok(Json(docs))
}
