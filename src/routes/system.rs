//! Health, about and the diagnostics bundle download.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use super::{attachment, CurrentUser};
use crate::auth::perm;
use crate::diagnostics;
use crate::error::{AppError, AppResult};
use crate::export::ExportedFile;
use crate::server::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/about", get(about))
        .route("/api/diagnostics/health", get(system_health))
        .route("/api/diagnostics/bundle", get(bundle))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn about(_user: CurrentUser) -> Json<Value> {
    Json(diagnostics::about())
}

async fn system_health(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    user.require(perm::SYSTEM_SETTINGS)?;
    let mut health = {
        let db = Arc::clone(&state.db);
        tokio::task::spawn_blocking(move || diagnostics::health(&db))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??
    };
    health["sessions"] = json!(state.auth.session_stats());
    Ok(Json(health))
}

async fn bundle(State(state): State<SharedState>, user: CurrentUser) -> AppResult<Response> {
    user.require(perm::SYSTEM_SETTINGS)?;
    let task_state = Arc::clone(&state);
    let (file_name, bytes) = tokio::task::spawn_blocking(move || -> AppResult<_> {
        let out_dir = task_state.config.data_dir.join("diagnostics");
        let path = diagnostics::export_bundle(&task_state.db, &task_state.config, &out_dir)?;
        let bytes = std::fs::read(&path)?;
        let _ = std::fs::remove_file(&path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "trucklog-diagnostics.zip".into());
        Ok((name, bytes))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    info!(user_id = %user.user_id(), file = %file_name, "diagnostics bundle downloaded");
    Ok(attachment(ExportedFile {
        file_name,
        content_type: "application/zip",
        bytes,
    })
    .into_response())
}
