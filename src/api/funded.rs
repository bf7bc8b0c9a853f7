//! Funded-account risk & violation REST surface (C12 §6.2).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::models::{FundedRules, RiskLevel, Severity, Violation};
use crate::AppState;

fn funded_account_ids(state: &AppState) -> Vec<String> {
    state.orchestrator.router.funded_account_ids.values().cloned().collect()
}

#[derive(Serialize)]
struct FundedAccountView {
    account_id: String,
    display_name: String,
    mode: crate::models::AccountMode,
    current_balance: rust_decimal::Decimal,
    risk_level: RiskLevel,
    can_trade: bool,
    paused: bool,
    rules: Option<FundedRules>,
}

fn view(state: &AppState, account_id: &str) -> Option<FundedAccountView> {
    let account = state.orchestrator.account(account_id)?;
    let rules = state.orchestrator.funded_rules_for(account_id);
    let (risk_level, can_trade) = rules
        .as_ref()
        .map(|r| (r.risk_level(), r.can_trade()))
        .unwrap_or((RiskLevel::Safe, true));
    Some(FundedAccountView {
        account_id: account.id.clone(),
        display_name: account.display_name.clone(),
        mode: account.mode,
        current_balance: account.current_balance(),
        risk_level,
        can_trade,
        paused: state.orchestrator.is_paused(account_id),
        rules,
    })
}

/// `GET /api/v1/funded-accounts/`.
pub async fn list_accounts(State(state): State<AppState>) -> impl IntoResponse {
    let accounts: Vec<FundedAccountView> = funded_account_ids(&state).iter().filter_map(|id| view(&state, id)).collect();
    Json(json!({ "accounts": accounts }))
}

/// `GET /api/v1/funded-accounts/{id}`.
pub async fn get_account(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match view(&state, &id) {
        Some(v) => Json(v).into_response(),
        None => AppError::NotFound(format!("funded account {id}")).into_response(),
    }
}

#[derive(Serialize)]
struct MetricsView {
    account_id: String,
    daily_loss_pct: rust_decimal::Decimal,
    drawdown_pct: rust_decimal::Decimal,
    risk_level: RiskLevel,
    can_trade: bool,
    active_violations: Vec<Violation>,
}

/// `GET /api/v1/funded-accounts/{id}/metrics`.
pub async fn metrics(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(rules) = state.orchestrator.funded_rules_for(&id) else {
        return AppError::NotFound(format!("funded account {id}")).into_response();
    };
    let daily_loss_pct = if rules.max_daily_loss.is_zero() {
        rust_decimal::Decimal::ZERO
    } else {
        (-rules.current_daily_pnl).max(rust_decimal::Decimal::ZERO) / rules.max_daily_loss * rust_decimal::Decimal::from(100)
    };
    let drawdown_pct = if rules.trailing_drawdown.is_zero() {
        rust_decimal::Decimal::ZERO
    } else {
        rules.current_drawdown / rules.trailing_drawdown * rust_decimal::Decimal::from(100)
    };
    let active_violations = state.orchestrator.list_violations(Some(&id), None, Some(false));
    Json(MetricsView {
        account_id: id,
        daily_loss_pct,
        drawdown_pct,
        risk_level: rules.risk_level(),
        can_trade: rules.can_trade(),
        active_violations,
    })
    .into_response()
}

/// `POST /api/v1/funded-accounts/{id}/flatten-positions`.
pub async fn flatten_positions(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let outcomes = state.orchestrator.flatten_positions(&id).await;
    Json(json!({ "account_id": id, "closed": outcomes })).into_response()
}

/// `POST /api/v1/funded-accounts/{id}/pause`.
pub async fn pause(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    state.orchestrator.pause_account(&id);
    Json(json!({ "account_id": id, "status": "paused" })).into_response()
}

/// `POST /api/v1/funded-accounts/{id}/resume`.
pub async fn resume(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.resume_account(&id) {
        Ok(()) => Json(json!({ "account_id": id, "status": "active" })).into_response(),
        Err(reason) => AppError::Routing(reason.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct ViolationQuery {
    pub account_id: Option<String>,
    pub severity: Option<String>,
    pub acknowledged: Option<bool>,
}

fn parse_severity(s: &str) -> Option<Severity> {
    match s {
        "warning" => Some(Severity::Warning),
        "critical" => Some(Severity::Critical),
        "violation" => Some(Severity::Violation),
        _ => None,
    }
}

/// `GET /api/v1/funded-accounts/violations/?account_id=&severity=&acknowledged=`.
pub async fn list_violations(State(state): State<AppState>, Query(q): Query<ViolationQuery>) -> impl IntoResponse {
    let severity = q.severity.as_deref().and_then(parse_severity);
    let violations = state.orchestrator.list_violations(q.account_id.as_deref(), severity, q.acknowledged);
    Json(json!({ "violations": violations }))
}

/// `POST /api/v1/funded-accounts/violations/{id}/acknowledge`.
pub async fn acknowledge_violation(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.orchestrator.acknowledge_violation(&id) {
        Json(json!({ "id": id, "acknowledged": true })).into_response()
    } else {
        AppError::NotFound(format!("violation {id}")).into_response()
    }
}
