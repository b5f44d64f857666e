//! Setup, login/logout, the current session and user management.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use zeroize::Zeroizing;

use super::CurrentUser;
use crate::auth::{self, perm, LoginResponse, NewUser, UserUpdate};
use crate::error::AppResult;
use crate::models::User;
use crate::server::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/auth/setup", post(setup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(session))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", patch(update_user).delete(delete_user))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn setup(
    State(state): State<SharedState>,
    Json(input): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state
        .db
        .call(move |conn| auth::setup_first_admin(conn, input))
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let task_state = Arc::clone(&state);
    let password = Zeroizing::new(req.password);
    let resp = state
        .db
        .call(move |conn| auth::login(conn, &task_state.auth, &req.email, &password))
        .await?;
    Ok(Json(resp))
}

async fn logout(State(state): State<SharedState>, user: CurrentUser) -> Json<Value> {
    let logged_out = state.auth.logout(&user.0.token);
    Json(json!({ "success": logged_out }))
}

async fn session(user: CurrentUser) -> Json<auth::Session> {
    Json(user.0)
}

async fn list_users(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<User>>> {
    user.require(perm::MANAGE_USERS)?;
    Ok(Json(state.db.call(auth::list_users).await?))
}

async fn create_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(input): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    user.require(perm::MANAGE_USERS)?;
    let created = state
        .db
        .call(move |conn| auth::create_user(conn, input))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> AppResult<Json<User>> {
    user.require(perm::MANAGE_USERS)?;
    let revoke = update.role.is_some() || update.password.is_some();
    let user_id = id.clone();
    let updated = state
        .db
        .call(move |conn| auth::update_user(conn, &user_id, update))
        .await?;
    if revoke {
        state.auth.revoke_user(&id);
    }
    Ok(Json(updated))
}

async fn delete_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    user.require(perm::MANAGE_USERS)?;
    let acting = user.user_id().to_string();
    let target = id.clone();
    state
        .db
        .call(move |conn| auth::delete_user(conn, &acting, &target))
        .await?;
    state.auth.revoke_user(&id);
    Ok(StatusCode::NO_CONTENT)
}
