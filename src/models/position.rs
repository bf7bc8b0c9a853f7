//! Position bookkeeping shared by live and paper accounts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::alert::AssetKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub asset_kind: AssetKind,
    /// Signed: positive is long, negative is short.
    pub net_quantity: i64,
    pub avg_price: Decimal,
    pub market_price: Decimal,
    pub multiplier: Decimal,
    pub realized_pnl: Decimal,
    pub opened_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Position {
    pub fn new(
        symbol: String,
        asset_kind: AssetKind,
        multiplier: Decimal,
        net_quantity: i64,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            asset_kind,
            net_quantity,
            avg_price: price,
            market_price: price,
            multiplier,
            realized_pnl: Decimal::ZERO,
            opened_at: now,
            last_updated: now,
        }
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        (self.market_price - self.avg_price) * Decimal::from(self.net_quantity) * self.multiplier
    }

    pub fn update_market_price(&mut self, price: Decimal, now: DateTime<Utc>) {
        self.market_price = price;
        self.last_updated = now;
    }

    /// Apply a fill of `signed_quantity` (positive = buy, negative = sell) at `fill_price`.
    ///
    /// Returns the realized P&L booked by this fill. When the position crosses
    /// zero, the crossing remainder opens a fresh position at `fill_price`
    /// rather than simply zeroing the quantity.
    pub fn apply_fill(&mut self, signed_quantity: i64, fill_price: Decimal, now: DateTime<Utc>) -> Decimal {
        let prev_qty = self.net_quantity;
        let same_direction = prev_qty == 0 || (prev_qty > 0) == (signed_quantity > 0);

        if same_direction {
            let new_qty = prev_qty + signed_quantity;
            if new_qty != 0 {
                let prev_notional = Decimal::from(prev_qty) * self.avg_price;
                let add_notional = Decimal::from(signed_quantity) * fill_price;
                self.avg_price = (prev_notional + add_notional) / Decimal::from(new_qty);
            } else {
                self.avg_price = fill_price;
            }
            self.net_quantity = new_qty;
            self.last_updated = now;
            return Decimal::ZERO;
        }

        // Opposing fill: closes some or all of the existing position, possibly reversing.
        let closing_qty = signed_quantity.abs().min(prev_qty.abs());
        let realized = Decimal::from(closing_qty)
            * (fill_price - self.avg_price)
            * self.multiplier
            * Decimal::from(prev_qty.signum());
        self.realized_pnl += realized;

        let new_qty = prev_qty + signed_quantity;
        self.net_quantity = new_qty;
        if new_qty == 0 {
            self.avg_price = Decimal::ZERO;
        } else if new_qty.signum() != prev_qty.signum() {
            // Reversed through zero: the remainder opens a new position.
            self.avg_price = fill_price;
            self.opened_at = now;
        }
        self.last_updated = now;
        realized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn accumulates_same_direction() {
        let mut p = Position::new("ES".into(), AssetKind::Future, dec!(50), 1, dec!(5000), now());
        p.apply_fill(1, dec!(5010), now());
        assert_eq!(p.net_quantity, 2);
        assert_eq!(p.avg_price, dec!(5005));
    }

    #[test]
    fn reversal_opens_new_position_at_fill_price() {
        let mut p = Position::new("ES".into(), AssetKind::Future, dec!(50), 2, dec!(5000), now());
        let realized = p.apply_fill(-5, dec!(5010), now());
        assert_eq!(p.net_quantity, -3);
        assert_eq!(p.avg_price, dec!(5010));
        assert!(realized > Decimal::ZERO);
    }

    #[test]
    fn full_close_zeroes_avg_price() {
        let mut p = Position::new("ES".into(), AssetKind::Future, dec!(50), 1, dec!(5000), now());
        p.apply_fill(-1, dec!(5020), now());
        assert_eq!(p.net_quantity, 0);
        assert_eq!(p.avg_price, Decimal::ZERO);
    }
}
