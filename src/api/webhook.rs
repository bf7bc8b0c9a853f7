//! TradingView webhook intake (C2/C12 §6.1).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

use crate::error::AppError;
use crate::webhook::auth::{AuthOutcome, RateLimitResult};
use crate::AppState;

fn source_key(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}

/// `POST /webhook/tradingview`: checks-in-order per §4.2 — rate limit before
/// the body is even authenticated, then content-type/HMAC/size, then parse,
/// then dispatch.
pub async fn receive_alert(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let source = source_key(&headers, addr);

    if let RateLimitResult::Exceeded { retry_after_secs } = state.webhook_rate_limiter.check(&source) {
        return AppError::RateLimited { retry_after_secs }.into_response();
    }

    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok());
    let signature = headers
        .get("x-signature")
        .or_else(|| headers.get("x-tradingview-signature"))
        .and_then(|v| v.to_str().ok());

    match state.webhook_auth.verify(content_type, &body, signature) {
        AuthOutcome::Accept => {}
        AuthOutcome::RejectBadContentType => {
            return AppError::Validation(crate::error::ValidationError::MalformedEncoding(
                "expected application/json".into(),
            ))
            .into_response();
        }
        AuthOutcome::RejectEmptyBody => {
            return AppError::Validation(crate::error::ValidationError::MissingRequiredField("body".into()))
                .into_response();
        }
        AuthOutcome::RejectBodyTooLarge => {
            return AppError::Validation(crate::error::ValidationError::OutOfRange("body too large".into()))
                .into_response();
        }
        AuthOutcome::RejectMissingSignature | AuthOutcome::RejectBadSignature => {
            warn!(source = %source, "webhook signature rejected");
            return AppError::Authentication("invalid webhook signature".into()).into_response();
        }
    }

    let alert = match crate::models::alert::parse(&body) {
        Ok(alert) => alert,
        Err(e) => return e.into_response(),
    };

    info!(alert_id = %alert.alert_id, symbol = %alert.symbol, account_group = %alert.account_group, "alert accepted");

    let alert_id = alert.alert_id.clone();

    // Processing is asynchronous (§6.1): the accept response below is the
    // only thing the webhook's HTTP caller sees. Everything the pipeline
    // decides from here — fill, rejection, or broker timeout — surfaces as
    // a `DomainEvent::Execution` on the event bus, never as this response.
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.dispatch(alert).await;
    });

    (StatusCode::OK, Json(json!({ "status": "received", "alert_id": alert_id }))).into_response()
}

/// `GET /webhook/test`: unauthenticated health probe for webhook configuration.
pub async fn webhook_health(State(_state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "message": "webhook endpoint reachable" }))
}
