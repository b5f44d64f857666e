//! Standalone expense entries and per-type totals.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;

use super::CurrentUser;
use crate::auth::perm;
use crate::error::AppResult;
use crate::expenses::{self, ExpenseFilter, ExpenseTotal, NewExpense};
use crate::models::Expense;
use crate::server::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/expenses", get(list_expenses).post(create_expense))
        .route("/api/expenses/totals", get(totals))
        .route("/api/expenses/{id}", delete(delete_expense))
}

#[derive(Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
}

async fn list_expenses(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(filter): Query<ExpenseFilter>,
) -> AppResult<Json<Vec<Expense>>> {
    user.require(perm::VIEW_RECORDS)?;
    let rows = state
        .db
        .call(move |conn| expenses::list_expenses(conn, &filter))
        .await?;
    Ok(Json(rows))
}

async fn create_expense(
    State(state): State<SharedState>,
    user: CurrentUser,
    Json(input): Json<NewExpense>,
) -> AppResult<(StatusCode, Json<Expense>)> {
    user.require(perm::CREATE_TRIP)?;
    let by = user.user_id().to_string();
    let expense = state
        .db
        .call(move |conn| expenses::create_expense(conn, input, Some(&by)))
        .await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

async fn delete_expense(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    user.require(perm::DELETE_RECORDS)?;
    state
        .db
        .call(move |conn| expenses::delete_expense(conn, &id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn totals(
    State(state): State<SharedState>,
    user: CurrentUser,
    Query(range): Query<RangeQuery>,
) -> AppResult<Json<Vec<ExpenseTotal>>> {
    user.require(perm::VIEW_REPORTS)?;
    let rows = state
        .db
        .call(move |conn| expenses::expense_totals_by_type(conn, range.from, range.to))
        .await?;
    Ok(Json(rows))
}
