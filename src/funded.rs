//! Funded-rule engine (C6 §4.6): pre-trade evaluation and post-trade accounting.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::models::{Account, Action, Alert, FundedRules, RuleState, Severity, Violation, ViolationKind};

#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub allow: bool,
    pub reason: Option<&'static str>,
    pub warnings: Vec<Violation>,
}

/// `Evaluate(alert, rules) -> {allow, reason?}`, checks in the §4.6 order.
pub fn evaluate(account_id: &str, alert: &Alert, rules: &FundedRules, projected_position_after_fill: i64, now: DateTime<Utc>) -> EvaluationOutcome {
    let deny = |reason: &'static str| EvaluationOutcome { allow: false, reason: Some(reason), warnings: Vec::new() };

    if alert.action == Action::Close {
        return EvaluationOutcome { allow: true, reason: None, warnings: Vec::new() };
    }
    if rules.state == RuleState::Violated {
        return deny("account_violated");
    }
    if alert.quantity > rules.max_contracts {
        return deny("position_size");
    }
    if rules.restricted_symbols.contains(&alert.symbol) {
        return deny("restricted_symbol");
    }
    if !within_trading_window(rules, now) {
        return deny("trading_hours");
    }
    if rules.today_trade_count >= rules.max_daily_trades {
        return deny("max_trades");
    }
    if projected_position_after_fill.unsigned_abs() as u32 > rules.max_concurrent_positions {
        return deny("position_size");
    }

    let mut warnings = Vec::new();
    if rules.remaining_loss_buffer() <= dec!(0.2) * rules.max_daily_loss {
        warnings.push(make_violation(account_id, ViolationKind::DailyLoss, Severity::Warning, -rules.current_daily_pnl, rules.max_daily_loss, now));
    }
    if rules.remaining_drawdown_buffer() <= dec!(0.2) * rules.trailing_drawdown {
        warnings.push(make_violation(account_id, ViolationKind::Drawdown, Severity::Warning, rules.current_drawdown, rules.trailing_drawdown, now));
    }

    EvaluationOutcome { allow: true, reason: None, warnings }
}

fn within_trading_window(rules: &FundedRules, now: DateTime<Utc>) -> bool {
    if rules.trading_windows.is_empty() {
        return true;
    }
    let weekday = now.weekday();
    rules.trading_windows.iter().any(|w| {
        if w.weekday != weekday {
            return false;
        }
        let t = now.time();
        t >= w.start && t <= w.end
    })
}

fn make_violation(account_id: &str, kind: ViolationKind, severity: Severity, value: Decimal, limit: Decimal, now: DateTime<Utc>) -> Violation {
    Violation {
        id: format!("vio_{}", Uuid::new_v4()),
        account_id: account_id.to_string(),
        kind,
        severity,
        value,
        limit,
        timestamp: now,
        acknowledged: false,
    }
}

/// Post-trade accounting outcome: any violations that fired, and whether the
/// account transitioned into `violated` (triggering a `FlattenRequested`).
pub struct PostTradeOutcome {
    pub violations: Vec<Violation>,
    pub newly_violated: bool,
}

/// Applies a fill's signed P&L to the account's funded rules (§4.6
/// post-trade accounting). `fill_pnl` includes commission/fees already
/// netted by the caller.
pub fn apply_fill(account_id: &str, rules: &mut FundedRules, account: &Account, fill_pnl: Decimal, now: DateTime<Utc>) -> PostTradeOutcome {
    rules.current_daily_pnl += fill_pnl;
    rules.today_trade_count += 1;

    let current_equity = account.current_balance();
    rules.max_peak_equity = rules.max_peak_equity.max(current_equity);
    rules.current_drawdown = rules.max_peak_equity - current_equity;

    let was_violated = rules.state == RuleState::Violated;
    let mut violations = Vec::new();

    // Per SPEC_FULL §9 resolution: all applicable breach conditions emit a
    // Violation from the same fill, not just the first to fire.
    if rules.current_daily_pnl <= -rules.max_daily_loss {
        violations.push(make_violation(account_id, ViolationKind::DailyLoss, Severity::Violation, -rules.current_daily_pnl, rules.max_daily_loss, now));
    }
    if rules.current_drawdown >= rules.trailing_drawdown {
        violations.push(make_violation(account_id, ViolationKind::Drawdown, Severity::Violation, rules.current_drawdown, rules.trailing_drawdown, now));
    }

    let newly_violated = !violations.is_empty() && !was_violated;
    if !violations.is_empty() {
        rules.state = RuleState::Violated;
    }

    PostTradeOutcome { violations, newly_violated }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountMode, OrderType, TradingWindow};
    use std::collections::HashSet;

    fn rules() -> FundedRules {
        FundedRules {
            max_daily_loss: dec!(2000),
            trailing_drawdown: dec!(3000),
            max_contracts: 3,
            max_concurrent_positions: 3,
            max_daily_trades: 15,
            profit_target: None,
            trading_windows: Vec::new(),
            restricted_symbols: HashSet::new(),
            current_daily_pnl: Decimal::ZERO,
            current_drawdown: Decimal::ZERO,
            max_peak_equity: dec!(50000),
            today_trade_count: 0,
            state: RuleState::Active,
            minimum_trading_days: 5,
            news_trading_allowed: false,
            weekend_trading_allowed: false,
            consistency_rule_enabled: true,
        }
    }

    fn alert(symbol: &str, quantity: u32) -> Alert {
        Alert {
            alert_id: "a1".into(),
            symbol: symbol.into(),
            action: Action::Buy,
            quantity,
            order_type: OrderType::Market,
            price: None,
            stop_price: None,
            strategy_id: None,
            account_group: "topstep".into(),
            alert_name: None,
            comment: None,
            timestamp: Utc::now(),
            extra: Default::default(),
        }
    }

    #[test]
    fn denies_oversize_position() {
        let r = rules();
        let outcome = evaluate("acc1", &alert("MNQ", 10), &r, 10, Utc::now());
        assert!(!outcome.allow);
        assert_eq!(outcome.reason, Some("position_size"));
    }

    #[test]
    fn denies_when_already_violated() {
        let mut r = rules();
        r.state = RuleState::Violated;
        let outcome = evaluate("acc1", &alert("MNQ", 1), &r, 1, Utc::now());
        assert_eq!(outcome.reason, Some("account_violated"));
    }

    #[test]
    fn close_always_allowed_even_when_violated() {
        let mut r = rules();
        r.state = RuleState::Violated;
        let mut a = alert("MNQ", 1);
        a.action = Action::Close;
        let outcome = evaluate("acc1", &a, &r, 0, Utc::now());
        assert!(outcome.allow);
    }

    #[test]
    fn post_trade_breach_transitions_to_violated() {
        let mut r = rules();
        let account = Account::new("acc1", "Test", "topstep", AccountMode::Live, dec!(50000));
        let outcome = apply_fill("acc1", &mut r, &account, dec!(-2500), Utc::now());
        assert!(outcome.newly_violated);
        assert_eq!(r.state, RuleState::Violated);
        assert_eq!(outcome.violations.len(), 1);
    }
}
