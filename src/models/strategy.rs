//! Strategy performance tracker data model (C9 §3).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::alert::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    Live,
    Paper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub symbol: String,
    pub side: Action,
    pub entry: Decimal,
    pub exit: Decimal,
    pub quantity: u32,
    pub pnl: Decimal,
    pub commission: Decimal,
    pub won: bool,
    pub timestamp: DateTime<Utc>,
    pub set_number: u32,
    pub trade_number_in_set: u32,
    pub mode: StrategyMode,
}

/// A closed, immutable window of `set_size` trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSet {
    pub set_number: u32,
    pub mode: StrategyMode,
    pub trades: Vec<TradeResult>,
}

impl TradeSet {
    pub fn wins(&self) -> usize {
        self.trades.iter().filter(|t| t.won).count()
    }

    pub fn win_rate(&self, set_size: u32) -> Decimal {
        if set_size == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins() as u64) / Decimal::from(set_size) * Decimal::from(100)
    }

    pub fn total_pnl(&self) -> Decimal {
        self.trades.iter().map(|t| t.pnl).sum()
    }

    pub fn commissions(&self) -> Decimal {
        self.trades.iter().map(|t| t.commission).sum()
    }

    pub fn net_pnl(&self) -> Decimal {
        self.total_pnl() - self.commissions()
    }

    /// `gross_profit / |gross_loss|`, saturating at a sentinel when there is no loss.
    pub fn profit_factor(&self) -> Decimal {
        let gross_profit: Decimal = self.trades.iter().map(|t| t.pnl).filter(|p| *p > Decimal::ZERO).sum();
        let gross_loss: Decimal = self.trades.iter().map(|t| t.pnl).filter(|p| *p < Decimal::ZERO).sum();
        if gross_loss.is_zero() {
            if gross_profit.is_zero() {
                Decimal::ZERO
            } else {
                Decimal::new(9999, 0)
            }
        } else {
            gross_profit / gross_loss.abs()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeTransition {
    pub strategy_id: String,
    pub from: StrategyMode,
    pub to: StrategyMode,
    pub reason: String,
    pub trigger_win_rates: Vec<Decimal>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub strategy_id: String,
    pub name: String,
    pub min_win_rate: Decimal,
    pub set_size: u32,
    pub rotation_k: u32,
}
