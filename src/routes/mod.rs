//! HTTP routes.
//!
//! | Prefix                      | Module        |
//! |-----------------------------|---------------|
//! | `/health`, `/api/about`, `/api/diagnostics/*` | [`system`] |
//! | `/api/auth/*`, `/api/users` | [`auth`]      |
//! | `/api/trucks`, `/api/drivers`, `/api/routes`, `/api/master/*` | [`master`] |
//! | `/api/trips`                | [`trips`]     |
//! | `/api/gc-notes`             | [`gc_notes`]  |
//! | `/api/expenses`             | [`expenses`]  |
//! | `/api/dashboard`, `/api/reports/*`, `/api/settings/*` | [`reports`] |
//!
//! Everything under `/api` except setup and login needs an
//! `Authorization: Bearer <token>` header, see [`CurrentUser`].

pub mod auth;
pub mod expenses;
pub mod gc_notes;
pub mod master;
pub mod reports;
pub mod system;
pub mod trips;

use axum::extract::FromRequestParts;
use axum::http::header::{self, HeaderValue};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::auth::Session;
use crate::error::AppError;
use crate::export::ExportedFile;
use crate::server::SharedState;

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .merge(system::router())
        .merge(auth::router())
        .merge(master::router())
        .merge(trips::router())
        .merge(gc_notes::router())
        .merge(expenses::router())
        .merge(reports::router())
}

/// The session behind the request's bearer token.
pub struct CurrentUser(pub Session);

impl CurrentUser {
    pub fn require(&self, permission: &str) -> Result<(), AppError> {
        self.0.require(permission)
    }

    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        Ok(CurrentUser(state.auth.validate(token)?))
    }
}

/// A download: content type plus `Content-Disposition: attachment`.
pub(crate) fn attachment(file: ExportedFile) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", file.file_name.replace('"', ""));
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(file.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response()
}
