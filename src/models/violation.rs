//! Funded-account rules and the violations they produce (C6 §3).

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleState {
    Active,
    Violated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingWindow {
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundedRules {
    pub max_daily_loss: Decimal,
    pub trailing_drawdown: Decimal,
    pub max_contracts: u32,
    pub max_concurrent_positions: u32,
    pub max_daily_trades: u32,
    pub profit_target: Option<Decimal>,
    pub trading_windows: Vec<TradingWindow>,
    pub restricted_symbols: HashSet<String>,
    pub current_daily_pnl: Decimal,
    pub current_drawdown: Decimal,
    pub max_peak_equity: Decimal,
    pub today_trade_count: u32,
    pub state: RuleState,
    // Supplemental operator-facing metadata (SPEC_FULL §3); not independently
    // enforced here, surfaced read-only via the accounts API.
    pub minimum_trading_days: u32,
    pub news_trading_allowed: bool,
    pub weekend_trading_allowed: bool,
    pub consistency_rule_enabled: bool,
}

impl FundedRules {
    pub fn remaining_loss_buffer(&self) -> Decimal {
        self.max_daily_loss + self.current_daily_pnl
    }

    pub fn remaining_drawdown_buffer(&self) -> Decimal {
        self.trailing_drawdown - self.current_drawdown
    }

    pub fn is_breached(&self) -> bool {
        self.current_drawdown >= self.trailing_drawdown
            || self.current_daily_pnl <= -self.max_daily_loss
    }

    pub fn risk_level(&self) -> RiskLevel {
        let daily_loss_util = if self.max_daily_loss.is_zero() {
            Decimal::ZERO
        } else {
            (-self.current_daily_pnl).max(Decimal::ZERO) / self.max_daily_loss
        };
        let drawdown_util = if self.trailing_drawdown.is_zero() {
            Decimal::ZERO
        } else {
            self.current_drawdown / self.trailing_drawdown
        };
        let worst = daily_loss_util.max(drawdown_util);
        if self.state == RuleState::Violated || worst >= Decimal::ONE {
            RiskLevel::Violation
        } else if worst >= Decimal::new(80, 2) {
            RiskLevel::Danger
        } else if worst >= Decimal::new(60, 2) {
            RiskLevel::Warning
        } else {
            RiskLevel::Safe
        }
    }

    pub fn can_trade(&self) -> bool {
        self.state != RuleState::Violated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Warning,
    Danger,
    Violation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DailyLoss,
    TotalLoss,
    Drawdown,
    PositionSize,
    TradingHours,
    MaxTrades,
    RestrictedSymbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
    Violation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub account_id: String,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub value: Decimal,
    pub limit: Decimal,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}
