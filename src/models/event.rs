//! Event bus payloads (C11 §4.11, §6.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountSnapshot;
use super::order::Fill;
use super::strategy::ModeTransition;
use super::violation::Violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Filled,
    Rejected,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub alert_id: String,
    pub account_id: Option<String>,
    pub status: ExecutionStatus,
    pub reason: Option<String>,
    pub fill: Option<Fill>,
}

/// Events published on the in-process bus and, filtered by subscription,
/// forwarded over the push transport (§6.4's `type` discriminants).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderAccepted { alert_id: String, order_id: String, account_id: String },
    Fill(Fill),
    Execution(ExecutionOutcome),
    PositionUpdated { account_id: String, symbol: String },
    AccountUpdated(AccountSnapshot),
    Violation(Violation),
    FlattenRequested { account_id: String },
    StrategyModeChanged(ModeTransition),
    QuoteUpdate { symbol: String, bid: String, ask: String, last: String },
    Heartbeat { timestamp: DateTime<Utc> },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::OrderAccepted { .. } => "order_accepted",
            DomainEvent::Fill(_) => "execution",
            DomainEvent::Execution(_) => "execution",
            DomainEvent::PositionUpdated { .. } => "position_update",
            DomainEvent::AccountUpdated(_) => "account_update",
            DomainEvent::Violation(_) => "violation",
            DomainEvent::FlattenRequested { .. } => "violation",
            DomainEvent::StrategyModeChanged(_) => "strategy_mode_changed",
            DomainEvent::QuoteUpdate { .. } => "quote_update",
            DomainEvent::Heartbeat { .. } => "heartbeat",
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        match self {
            DomainEvent::OrderAccepted { account_id, .. } => Some(account_id),
            DomainEvent::Fill(f) => Some(&f.account_id),
            DomainEvent::Execution(e) => e.account_id.as_deref(),
            DomainEvent::PositionUpdated { account_id, .. } => Some(account_id),
            DomainEvent::AccountUpdated(s) => Some(&s.id),
            DomainEvent::Violation(v) => Some(&v.account_id),
            DomainEvent::FlattenRequested { account_id } => Some(account_id),
            _ => None,
        }
    }
}
