//! HTTP server: shared state, router assembly and the serve loop.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::AuthState;
use crate::config::AppConfig;
use crate::db::{self, DbState};
use crate::error::AppResult;
use crate::routes;

/// State shared by every handler.
pub struct AppState {
    pub db: Arc<DbState>,
    pub auth: AuthState,
    pub config: AppConfig,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(db: DbState, config: AppConfig) -> SharedState {
        Arc::new(Self {
            db: Arc::new(db),
            auth: AuthState::from_config(&config),
            config,
        })
    }
}

/// Full router: `/health`, the `/api` surface, request tracing and, when an
/// origin is configured, CORS.
pub fn build_router(state: SharedState) -> Router {
    let cors = state.config.cors_origin.as_deref().and_then(cors_layer);
    let router = routes::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    match cors {
        Some(layer) => router.layer(layer),
        None => router,
    }
}

fn cors_layer(origin: &str) -> Option<CorsLayer> {
    let origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(e) => {
                warn!(origin, "ignoring invalid CORS origin: {e}");
                return None;
            }
        }
    };
    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .expose_headers([header::CONTENT_DISPOSITION]),
    )
}

/// Open the store and serve until Ctrl+C.
pub async fn serve(config: AppConfig) -> AppResult<()> {
    let db = db::init(&config.data_dir)?;
    let bind = config.bind;
    let app = build_router(AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "trucklog listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
