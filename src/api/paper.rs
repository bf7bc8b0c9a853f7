//! Paper-trading REST surface (C12 §6.3).

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::models::ExecutionStatus;
use crate::AppState;

/// `GET /api/paper-trading/accounts`.
pub async fn list_accounts(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "accounts": state.paper_engine.list_accounts() }))
}

/// `GET /api/paper-trading/accounts/{id}`.
pub async fn get_account(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.paper_engine.account_snapshot(&id) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => AppError::NotFound(format!("paper account {id}")).into_response(),
    }
}

/// `GET /api/paper-trading/accounts/{id}/orders`.
pub async fn list_orders(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    Json(json!({ "orders": state.paper_engine.list_orders(&id) }))
}

/// `GET /api/paper-trading/accounts/{id}/fills`.
pub async fn list_fills(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    Json(json!({ "fills": state.paper_engine.list_fills(&id) }))
}

#[derive(Serialize)]
struct PaperMetrics {
    account_id: String,
    current_balance: Decimal,
    buying_power: Decimal,
    day_pnl: Decimal,
    total_pnl: Decimal,
    unrealized_pnl: Decimal,
    open_positions: usize,
    fill_count: usize,
}

/// `GET /api/paper-trading/accounts/{id}/metrics`.
pub async fn metrics(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(account) = state.paper_engine.accounts.read().get(&id).cloned() else {
        return AppError::NotFound(format!("paper account {id}")).into_response();
    };
    let unrealized_pnl: Decimal = account.positions.values().map(|p| p.unrealized_pnl()).sum();
    let open_positions = account.positions.values().filter(|p| p.net_quantity != 0).count();
    Json(PaperMetrics {
        account_id: id.clone(),
        current_balance: account.current_balance(),
        buying_power: account.buying_power,
        day_pnl: account.day_pnl,
        total_pnl: account.total_pnl,
        unrealized_pnl,
        open_positions,
        fill_count: state.paper_engine.list_fills(&id).len(),
    })
    .into_response()
}

#[derive(Deserialize)]
pub struct ResetRequest {
    pub confirm: bool,
}

/// `POST /api/paper-trading/accounts/{id}/reset`.
pub async fn reset_account(State(state): State<AppState>, Path(id): Path<String>, Json(req): Json<ResetRequest>) -> Response {
    if !req.confirm {
        return AppError::Validation(crate::error::ValidationError::MissingRequiredField("confirm".into())).into_response();
    }
    let initial_balance = state
        .paper_engine
        .accounts
        .read()
        .get(&id)
        .map(|a| a.initial_balance)
        .unwrap_or(Decimal::new(50_000, 0));
    if state.paper_engine.reset_account(&id, initial_balance) {
        Json(json!({ "account_id": id, "status": "reset" })).into_response()
    } else {
        AppError::NotFound(format!("paper account {id}")).into_response()
    }
}

/// `POST /api/paper-trading/accounts/{id}/flatten`.
pub async fn flatten_account(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let fills = state.paper_engine.flatten_account(&id).await;
    Json(json!({ "account_id": id, "fills": fills }))
}

/// `POST /api/paper-trading/alerts`: submit a paper alert identical in shape
/// to the webhook alert, bypassing HMAC/rate-limit (already behind dashboard auth).
pub async fn submit_alert(State(state): State<AppState>, body: axum::body::Bytes) -> Response {
    let alert = match crate::models::alert::parse(&body) {
        Ok(alert) => alert,
        Err(e) => return e.into_response(),
    };
    let outcome = state.orchestrator.dispatch(alert).await;
    let status = match outcome.status {
        ExecutionStatus::Filled | ExecutionStatus::Rejected => axum::http::StatusCode::OK,
        ExecutionStatus::Unknown => axum::http::StatusCode::ACCEPTED,
    };
    (status, Json(outcome)).into_response()
}

/// `POST /api/paper-trading/orders/{id}/cancel`: market orders fill
/// synchronously, so by the time a cancel request arrives the order has
/// already settled; there is nothing left to cancel.
pub async fn cancel_order(Path(id): Path<String>) -> Response {
    AppError::Validation(crate::error::ValidationError::OutOfRange(format!(
        "order {id} already settled, nothing to cancel"
    )))
    .into_response()
}
