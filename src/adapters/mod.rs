//! Broker adapter interface (C4) and concrete adapters.

pub mod live;
pub mod simulator;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ExecutionErrorKind;
use crate::models::{Alert, Fill, Position};

#[derive(Debug, Clone, Serialize)]
pub struct AdapterCapabilities {
    pub connected: bool,
    pub account_ids: Vec<String>,
    pub default_account_id: Option<String>,
    pub supports_cancellation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: u64,
}

pub struct ExecutionResult {
    pub order_id: String,
    pub fill: Option<Fill>,
    pub rejection_reason: Option<String>,
    pub error_kind: Option<ExecutionErrorKind>,
}

impl ExecutionResult {
    pub fn success(order_id: String, fill: Fill) -> Self {
        Self { order_id, fill: Some(fill), rejection_reason: None, error_kind: None }
    }

    pub fn rejected(order_id: String, reason: impl Into<String>) -> Self {
        Self { order_id, fill: None, rejection_reason: Some(reason.into()), error_kind: Some(ExecutionErrorKind::RiskViolation) }
    }

    pub fn transient(order_id: String, reason: impl Into<String>) -> Self {
        Self { order_id, fill: None, rejection_reason: Some(reason.into()), error_kind: Some(ExecutionErrorKind::BrokerTransient) }
    }
}

/// Uniform execution contract every concrete broker implements (§4.4). Adapters
/// translate the abstract `Alert` to broker wire format and must be safe to
/// call concurrently from multiple orchestrator workers.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    fn broker_key(&self) -> &str;

    async fn initialize(&self) -> anyhow::Result<AdapterCapabilities>;

    /// Blocks until the broker acknowledges working/filled/rejected. Callers
    /// enforce the deadline (default 10s) by wrapping this in `tokio::time::timeout`.
    async fn execute_alert(&self, account_id: &str, alert: &Alert) -> anyhow::Result<ExecutionResult>;

    async fn get_positions(&self, account_id: &str) -> anyhow::Result<Vec<Position>>;

    async fn get_quote(&self, symbol: &str) -> anyhow::Result<Quote>;

    async fn close(&self) -> anyhow::Result<()>;
}
