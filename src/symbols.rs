//! Symbol reference table (§6.7): asset-kind classification plus tick size
//! and contract multiplier lookup by symbol root.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::AssetKind;

struct FutureSpec {
    root: &'static str,
    multiplier: Decimal,
    tick: Decimal,
}

const FUTURES: &[FutureSpec] = &[
    FutureSpec { root: "ES", multiplier: dec!(50), tick: dec!(0.25) },
    FutureSpec { root: "NQ", multiplier: dec!(20), tick: dec!(0.25) },
    FutureSpec { root: "YM", multiplier: dec!(5), tick: dec!(1.00) },
    FutureSpec { root: "RTY", multiplier: dec!(50), tick: dec!(0.10) },
    FutureSpec { root: "GC", multiplier: dec!(100), tick: dec!(0.10) },
    FutureSpec { root: "SI", multiplier: dec!(5000), tick: dec!(0.005) },
    FutureSpec { root: "CL", multiplier: dec!(1000), tick: dec!(0.01) },
    FutureSpec { root: "NG", multiplier: dec!(10000), tick: dec!(0.001) },
];

/// Micro futures roots, carried at 1/10th the multiplier of their full-size
/// counterpart with the same tick (SPEC_FULL §6.7 supplement).
const MICRO_ALIASES: &[(&str, &str)] = &[
    ("MES", "ES"),
    ("MNQ", "NQ"),
    ("MYM", "YM"),
    ("M2K", "RTY"),
    ("MGC", "GC"),
];

const CRYPTO_SYMBOLS: &[&str] = &["BTC", "ETH", "SOL", "BTCUSD", "ETHUSD", "BTC-USD", "ETH-USD"];

fn future_spec(root: &str) -> Option<(Decimal, Decimal)> {
    if let Some(spec) = FUTURES.iter().find(|s| s.root == root) {
        return Some((spec.multiplier, spec.tick));
    }
    if let Some((_, base_root)) = MICRO_ALIASES.iter().find(|(micro, _)| *micro == root) {
        let base = FUTURES.iter().find(|s| s.root == *base_root)?;
        return Some((base.multiplier / dec!(10), base.tick));
    }
    None
}

/// Strip a common futures contract-month/year suffix (e.g. `ESZ4` -> `ES`)
/// so the lookup matches on root regardless of expiry code.
fn futures_root(symbol: &str) -> Option<&str> {
    const MONTH_CODES: &str = "FGHJKMNQUVXZ";
    if symbol.len() >= 3 {
        let (root, suffix) = symbol.split_at(symbol.len() - 2);
        let mut chars = suffix.chars();
        if let (Some(month), Some(year)) = (chars.next(), chars.next()) {
            if MONTH_CODES.contains(month) && year.is_ascii_digit() && !root.is_empty() {
                return Some(root);
            }
        }
    }
    None
}

pub fn classify(symbol: &str) -> AssetKind {
    let root = futures_root(symbol).unwrap_or(symbol);
    if future_spec(root).is_some() {
        return AssetKind::Future;
    }
    if symbol.contains('/') || symbol.ends_with('C') || symbol.ends_with('P') {
        return AssetKind::Option;
    }
    if CRYPTO_SYMBOLS.contains(&symbol) {
        return AssetKind::Crypto;
    }
    AssetKind::Stock
}

/// Returns `(multiplier, tick)` for the given symbol, defaulting to the
/// equity default (multiplier 1, tick 0.01) for anything not in the futures table.
pub fn spec_for(symbol: &str) -> (Decimal, Decimal) {
    let root = futures_root(symbol).unwrap_or(symbol);
    future_spec(root).unwrap_or((Decimal::ONE, dec!(0.01)))
}

/// Round `value` to the nearest multiple of `tick`, half-up.
pub fn round_to_tick(value: Decimal, tick: Decimal) -> Decimal {
    if tick.is_zero() {
        return value;
    }
    let ticks = value / tick;
    let rounded_ticks = ticks.round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    rounded_ticks * tick
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_futures_root() {
        assert_eq!(classify("ES"), AssetKind::Future);
        assert_eq!(classify("ESZ4"), AssetKind::Future);
    }

    #[test]
    fn classifies_micro_futures() {
        assert_eq!(classify("MNQ"), AssetKind::Future);
        let (mult, tick) = spec_for("MNQ");
        assert_eq!(mult, dec!(2));
        assert_eq!(tick, dec!(0.25));
    }

    #[test]
    fn defaults_to_stock() {
        assert_eq!(classify("AAPL"), AssetKind::Stock);
        let (mult, tick) = spec_for("AAPL");
        assert_eq!(mult, Decimal::ONE);
        assert_eq!(tick, dec!(0.01));
    }

    #[test]
    fn rounds_half_up_to_tick() {
        assert_eq!(round_to_tick(dec!(5000.13), dec!(0.25)), dec!(5000.25));
        assert_eq!(round_to_tick(dec!(5000.12), dec!(0.25)), dec!(5000.00));
    }
}
