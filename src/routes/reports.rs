//! Dashboard, report downloads and the company profile.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::{attachment, CurrentUser};
use crate::auth::perm;
use crate::dashboard::{self, DashboardStats, Period};
use crate::error::AppResult;
use crate::export::ExportFormat;
use crate::reports::{self, CompanyProfile, ReportKind, ReportOptions};
use crate::server::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/dashboard", get(stats))
        .route("/api/reports/{kind}", get(download))
        .route("/api/settings/company", get(company).put(save_company))
}

#[derive(Deserialize)]
struct ReportQuery {
    format: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

async fn stats(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<DashboardStats>> {
    user.require(perm::VIEW_RECORDS)?;
    let period = Period::current();
    let stats = state
        .db
        .call(move |conn| dashboard::dashboard_stats(conn, &period))
        .await?;
    Ok(Json(stats))
}

async fn download(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(kind): Path<String>,
    Query(q): Query<ReportQuery>,
) -> AppResult<Response> {
    user.require(perm::VIEW_REPORTS)?;
    let kind: ReportKind = kind.parse()?;
    let fmt = match q.format.as_deref() {
        Some(f) => f.parse()?,
        None => ExportFormat::default(),
    };
    let opts = ReportOptions {
        from: q.from,
        to: q.to,
    };
    let file = state
        .db
        .call(move |conn| reports::export_report(conn, kind, fmt, &opts))
        .await?;
    Ok(attachment(file))
}

async fn company(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> AppResult<Json<CompanyProfile>> {
    user.require(perm::VIEW_RECORDS)?;
    Ok(Json(state.db.call(reports::company_profile).await?))
}

async fn save_company(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(profile): Json<CompanyProfile>,
) -> AppResult<Json<CompanyProfile>> {
    user.require(perm::SYSTEM_SETTINGS)?;
    let saved = state
        .db
        .call(move |conn| reports::save_company_profile(conn, profile))
        .await?;
    Ok(Json(saved))
}

#[cfg(test)]
mod tests {
    use crate::routes::trips::tests::start_trip;
    use crate::server::tests::{admin_token, body_json, send, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn dashboard_counts_todays_trip() {
        let (app, _) = test_app();
        let token = admin_token(&app).await;
        start_trip(&app, &token).await;

        let resp = send(&app, "GET", "/api/dashboard", Some(&token), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let stats = body_json(resp).await;
        assert_eq!(stats["trips_today"], 1);
        assert_eq!(stats["running_trips"], 1);
        assert_eq!(stats["expenses_month"], 10250.0);
        assert_eq!(stats["net_profit"], -10250.0);
    }

    #[tokio::test]
    async fn every_report_downloads_in_both_formats() {
        let (app, _) = test_app();
        let token = admin_token(&app).await;
        start_trip(&app, &token).await;

        for kind in crate::reports::ReportKind::ALL {
            for (format, content_type) in [
                ("pdf", "application/pdf"),
                ("excel", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            ] {
                let uri = format!("/api/reports/{kind}?format={format}");
                let resp = send(&app, "GET", &uri, Some(&token), None).await;
                assert_eq!(resp.status(), StatusCode::OK, "{uri}");
                assert_eq!(resp.headers()["content-type"], content_type, "{uri}");
            }
        }
    }

    #[tokio::test]
    async fn report_errors() {
        let (app, _) = test_app();
        let token = admin_token(&app).await;
        let resp = send(&app, "GET", "/api/reports/balance-sheet", Some(&token), None).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let resp = send(&app, "GET", "/api/reports/trips?format=csv", Some(&token), None).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let resp = send(
            &app,
            "GET",
            "/api/reports/revenue?from=2025-01-01&to=2026-10-19",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn company_profile_round_trip() {
        let (app, _) = test_app();
        let token = admin_token(&app).await;
        let resp = send(&app, "GET", "/api/settings/company", Some(&token), None).await;
        assert_eq!(body_json(resp).await["name"], "Your Company Name");

        let profile = json!({
            "name": "Kongu Roadways",
            "address": "12 Mill Road, Tiruppur - 641601",
            "phone": "+91-4212201234",
            "email": "office@kongu-roadways.in",
        });
        let resp = send(&app, "PUT", "/api/settings/company", Some(&token), Some(profile)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = send(&app, "GET", "/api/settings/company", Some(&token), None).await;
        assert_eq!(body_json(resp).await["name"], "Kongu Roadways");
    }
}
