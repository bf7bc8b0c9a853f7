//! Order & Fill models (C3 §3).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::alert::{Action, OrderType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Working,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Action,
    pub order_type: OrderType,
    pub quantity: u32,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub status: OrderStatus,
    pub filled_quantity: u32,
    pub avg_fill_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Action,
        order_type: OrderType,
        quantity: u32,
        price: Option<Decimal>,
        stop_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            price,
            stop_price,
            status: OrderStatus::Working,
            filled_quantity: 0,
            avg_fill_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_fill(&mut self, quantity: u32, price: Decimal, now: DateTime<Utc>) {
        let prior_notional = self
            .avg_fill_price
            .unwrap_or(Decimal::ZERO)
            * Decimal::from(self.filled_quantity);
        self.filled_quantity += quantity;
        self.avg_fill_price = Some(
            (prior_notional + price * Decimal::from(quantity)) / Decimal::from(self.filled_quantity),
        );
        self.status = if self.filled_quantity >= self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = now;
    }

    pub fn reject(&mut self, now: DateTime<Utc>) {
        self.status = OrderStatus::Rejected;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub id: String,
    pub order_id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Action,
    pub quantity: u32,
    pub price: Decimal,
    pub commission: Decimal,
    pub fees: Decimal,
    pub slippage: Decimal,
    pub timestamp: DateTime<Utc>,
    pub broker_key: String,
    /// Realized trade P&L booked by this fill (from `Position::apply_fill`),
    /// zero for a fill that only opens or adds to a position. Adapters with
    /// no position book of their own (e.g. `LiveAdapter`) report zero here.
    pub realized_pnl: Decimal,
    /// Set by the orchestrator when this fill was routed to a paper-shadow
    /// account in place of a strategy's intended live account (§4.7).
    pub intended_live_account_id: Option<String>,
}

impl Fill {
    /// Signed P&L contribution of this fill's trading costs (commission + fees).
    pub fn total_cost(&self) -> Decimal {
        self.commission + self.fees
    }

    /// Net signed P&L for post-trade accounting: realized trading P&L minus
    /// the costs of this fill.
    pub fn net_pnl(&self) -> Decimal {
        self.realized_pnl - self.total_cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn partial_then_full_fill_tracks_avg_price() {
        let mut o = Order::new(
            "o1", "acc1", "ES", Action::Buy, OrderType::Market, 3, None, None, now(),
        );
        o.record_fill(1, dec!(5000), now());
        assert_eq!(o.status, OrderStatus::PartiallyFilled);
        o.record_fill(2, dec!(5010), now());
        assert_eq!(o.status, OrderStatus::Filled);
        assert_eq!(o.filled_quantity, 3);
        let avg = o.avg_fill_price.unwrap();
        assert!((avg - dec!(5006.6667)).abs() < dec!(0.001));
    }
}
