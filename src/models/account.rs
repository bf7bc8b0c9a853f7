//! Account model (C3 §3): live or paper, owns its positions and rule state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountMode {
    Live,
    PaperSandbox,
    PaperSim,
    PaperHybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    pub broker_key: String,
    pub mode: AccountMode,
    pub initial_balance: Decimal,
    pub total_pnl: Decimal,
    pub realized_fees: Decimal,
    pub buying_power: Decimal,
    pub day_pnl: Decimal,
    pub positions: HashMap<String, Position>,
    pub connection_state: ConnectionState,
}

impl Account {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        broker_key: impl Into<String>,
        mode: AccountMode,
        initial_balance: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            broker_key: broker_key.into(),
            mode,
            initial_balance,
            total_pnl: Decimal::ZERO,
            realized_fees: Decimal::ZERO,
            buying_power: initial_balance,
            day_pnl: Decimal::ZERO,
            positions: HashMap::new(),
            connection_state: ConnectionState::Connected,
        }
    }

    /// `current_balance = initial_balance + total_pnl - realized_fees`.
    pub fn current_balance(&self) -> Decimal {
        self.initial_balance + self.total_pnl - self.realized_fees
    }

    pub fn apply_fee(&mut self, fee: Decimal) {
        self.realized_fees += fee;
    }

    pub fn apply_realized_pnl(&mut self, pnl: Decimal) {
        self.total_pnl += pnl;
        self.day_pnl += pnl;
    }

    pub fn reserve_buying_power(&mut self, amount: Decimal) {
        self.buying_power -= amount;
        if self.buying_power < Decimal::ZERO {
            self.buying_power = Decimal::ZERO;
        }
    }

    pub fn release_buying_power(&mut self, amount: Decimal) {
        self.buying_power += amount;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSnapshot {
    pub id: String,
    pub display_name: String,
    pub mode: AccountMode,
    pub current_balance: Decimal,
    pub buying_power: Decimal,
    pub day_pnl: Decimal,
    pub total_pnl: Decimal,
    pub connection_state: ConnectionState,
    pub as_of: DateTime<Utc>,
}

impl From<&Account> for AccountSnapshot {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id.clone(),
            display_name: a.display_name.clone(),
            mode: a.mode,
            current_balance: a.current_balance(),
            buying_power: a.buying_power,
            day_pnl: a.day_pnl,
            total_pnl: a.total_pnl,
            connection_state: a.connection_state,
            as_of: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn current_balance_invariant() {
        let mut a = Account::new("acc1", "Test", "simulator", AccountMode::PaperSim, dec!(50000));
        a.apply_realized_pnl(dec!(120));
        a.apply_fee(dec!(3.52));
        assert_eq!(a.current_balance(), dec!(50116.48));
    }

    #[test]
    fn buying_power_never_negative() {
        let mut a = Account::new("acc1", "Test", "simulator", AccountMode::PaperSim, dec!(100));
        a.reserve_buying_power(dec!(500));
        assert_eq!(a.buying_power, Decimal::ZERO);
    }
}
