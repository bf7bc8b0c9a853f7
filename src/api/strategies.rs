//! Strategy performance REST surface (C12 §6.3).

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::models::{StrategyConfig, StrategyMode};
use crate::AppState;

/// `GET /api/strategies/summaries`.
pub async fn summaries(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "strategies": state.strategy_tracker.summaries() }))
}

/// `GET /api/strategies/{id}` and `/{id}/summary` (same payload; both
/// routes are wired to this handler).
pub async fn get_summary(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.strategy_tracker.summary(&id) {
        Some(summary) => Json(summary).into_response(),
        None => AppError::NotFound(format!("strategy {id}")).into_response(),
    }
}

/// `GET /api/strategies/{id}/sets`.
pub async fn sets(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.strategy_tracker.sets(&id) {
        Some(sets) => Json(json!({ "strategy_id": id, "sets": sets })).into_response(),
        None => AppError::NotFound(format!("strategy {id}")).into_response(),
    }
}

/// `GET /api/strategies/{id}/transitions`.
pub async fn transitions(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if !state.strategy_tracker.exists(&id) {
        return AppError::NotFound(format!("strategy {id}")).into_response();
    }
    Json(json!({ "strategy_id": id, "transitions": state.strategy_tracker.transitions(&id) })).into_response()
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(flatten)]
    pub config: StrategyConfig,
    #[serde(default = "default_initial_mode")]
    pub initial_mode: StrategyMode,
}

fn default_initial_mode() -> StrategyMode {
    StrategyMode::Live
}

/// `POST /api/strategies/register`.
pub async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> impl IntoResponse {
    let strategy_id = req.config.strategy_id.clone();
    state.strategy_tracker.register(req.config, req.initial_mode);
    Json(json!({ "strategy_id": strategy_id, "status": "registered" }))
}

#[derive(Deserialize)]
pub struct SetModeRequest {
    pub mode: StrategyMode,
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "manual".to_string()
}

/// `POST /api/strategies/{id}/mode`.
pub async fn set_mode(State(state): State<AppState>, Path(id): Path<String>, Json(req): Json<SetModeRequest>) -> Response {
    match state.strategy_tracker.set_mode(&id, req.mode, req.reason) {
        Some(transition) => Json(transition).into_response(),
        None => AppError::NotFound(format!("strategy {id}")).into_response(),
    }
}

/// `GET /api/strategies/alerts`: the cross-strategy mode-change alert feed.
pub async fn list_alerts(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "alerts": state.strategy_tracker.alerts() }))
}

/// `DELETE /api/strategies/alerts`: clears the alert feed.
pub async fn clear_alerts(State(state): State<AppState>) -> impl IntoResponse {
    state.strategy_tracker.clear_alerts();
    Json(json!({ "status": "cleared" }))
}
