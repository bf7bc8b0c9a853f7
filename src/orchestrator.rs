//! Alert-dispatch orchestrator (C8 §5): route -> funded-rule gate -> per-account
//! lease -> adapter call with deadline -> bookkeeping/fan-out, in that order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::adapters::BrokerAdapter;
use crate::error::ExecutionErrorKind;
use crate::events::EventBus;
use crate::funded::{self, EvaluationOutcome};
use crate::journal::{fill_to_record, JournalClient};
use crate::models::{Account, Alert, DomainEvent, ExecutionOutcome, ExecutionStatus, FundedRules, RiskLevel, Severity, Violation};
use crate::router::{RouteDecision, Router, RoutingError};
use crate::strategy_tracker::StrategyTracker;

/// Per-account FIFO serialization lease (§5): a `tokio::sync::Mutex` already
/// queues waiters in arrival order, giving the required fairness without a
/// hand-rolled queue.
pub struct AccountLeases {
    leases: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AccountLeases {
    pub fn new() -> Self {
        Self { leases: Mutex::new(HashMap::new()) }
    }

    fn lease_for(&self, account_id: &str) -> Arc<AsyncMutex<()>> {
        self.leases
            .lock()
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

impl Default for AccountLeases {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Orchestrator {
    pub router: Router,
    pub leases: AccountLeases,
    pub funded_rules: Mutex<HashMap<String, FundedRules>>,
    pub accounts: Mutex<HashMap<String, Account>>,
    pub violations: Mutex<HashMap<String, Violation>>,
    pub paused_accounts: Mutex<HashSet<String>>,
    pub strategy_tracker: Arc<StrategyTracker>,
    pub journal: Option<Arc<JournalClient>>,
    pub events: Arc<EventBus>,
    pub deadline: Duration,
}

impl Orchestrator {
    /// Dispatches a validated alert end-to-end, implementing the §5 pipeline.
    /// Runs fully asynchronously with respect to the webhook's accept
    /// response (§6.1/§7): every terminal outcome, including a routing
    /// failure, is published as a `DomainEvent::Execution` rather than
    /// returned as an HTTP error — the accept boundary has already passed by
    /// the time this runs.
    pub async fn dispatch(&self, alert: Alert) -> ExecutionOutcome {
        let decision = match self.router.route(&alert) {
            Ok(decision) => decision,
            Err(e) => {
                let outcome = ExecutionOutcome {
                    alert_id: alert.alert_id.clone(),
                    account_id: None,
                    status: ExecutionStatus::Rejected,
                    reason: Some(e.to_string()),
                    fill: None,
                };
                self.events.publish(DomainEvent::Execution(outcome.clone()));
                return outcome;
            }
        };
        self.events.publish(DomainEvent::OrderAccepted {
            alert_id: alert.alert_id.clone(),
            order_id: String::new(),
            account_id: decision.account_id.clone(),
        });

        if decision.is_funded {
            if let Some(outcome) = self.gate_funded(&decision, &alert) {
                self.events.publish(DomainEvent::Execution(outcome.clone()));
                return outcome;
            }
        }

        let lease = self.leases.lease_for(&decision.account_id);
        let _permit = lease.lock().await;

        let outcome = self.execute_with_deadline(&decision, &alert).await;

        if let Some(fill) = &outcome.fill {
            self.apply_post_trade(&decision, &alert, fill).await;
        }

        self.events.publish(DomainEvent::Execution(outcome.clone()));
        outcome
    }

    fn gate_funded(&self, decision: &RouteDecision, alert: &Alert) -> Option<ExecutionOutcome> {
        let mut rules_table = self.funded_rules.lock();
        let rules = rules_table.entry(decision.account_id.clone()).or_insert_with(default_funded_rules);
        let accounts = self.accounts.lock();
        let projected = accounts
            .get(&decision.account_id)
            .and_then(|a| a.positions.get(&alert.symbol))
            .map(|p| p.net_quantity)
            .unwrap_or(0);
        drop(accounts);

        let eval: EvaluationOutcome = funded::evaluate(&decision.account_id, alert, rules, projected, Utc::now());
        for warning in &eval.warnings {
            self.violations.lock().insert(warning.id.clone(), warning.clone());
            self.events.publish(DomainEvent::Violation(warning.clone()));
        }
        if eval.allow {
            return None;
        }
        warn!(account_id = %decision.account_id, reason = ?eval.reason, "funded rule denied alert");
        Some(ExecutionOutcome {
            alert_id: alert.alert_id.clone(),
            account_id: Some(decision.account_id.clone()),
            status: ExecutionStatus::Rejected,
            reason: eval.reason.map(str::to_string),
            fill: None,
        })
    }

    async fn execute_with_deadline(&self, decision: &RouteDecision, alert: &Alert) -> ExecutionOutcome {
        let Some(adapter) = self.router.adapters.get(&decision.broker_key) else {
            return ExecutionOutcome {
                alert_id: alert.alert_id.clone(),
                account_id: Some(decision.account_id.clone()),
                status: ExecutionStatus::Rejected,
                reason: Some(format!("no adapter configured for broker {}", decision.broker_key)),
                fill: None,
            };
        };

        let call = adapter.execute_alert(&decision.account_id, alert);
        match tokio::time::timeout(self.deadline, call).await {
            Ok(Ok(result)) => {
                if let Some(mut fill) = result.fill {
                    fill.intended_live_account_id = decision.intended_live_account_id.clone();
                    self.events.publish(DomainEvent::Fill(fill.clone()));
                    ExecutionOutcome {
                        alert_id: alert.alert_id.clone(),
                        account_id: Some(decision.account_id.clone()),
                        status: ExecutionStatus::Filled,
                        reason: None,
                        fill: Some(fill),
                    }
                } else {
                    let status = match result.error_kind {
                        Some(ExecutionErrorKind::BrokerTransient) => ExecutionStatus::Unknown,
                        _ => ExecutionStatus::Rejected,
                    };
                    ExecutionOutcome {
                        alert_id: alert.alert_id.clone(),
                        account_id: Some(decision.account_id.clone()),
                        status,
                        reason: result.rejection_reason,
                        fill: None,
                    }
                }
            }
            Ok(Err(e)) => {
                error!(broker = %decision.broker_key, error = %e, "adapter call failed");
                ExecutionOutcome {
                    alert_id: alert.alert_id.clone(),
                    account_id: Some(decision.account_id.clone()),
                    status: ExecutionStatus::Unknown,
                    reason: Some(e.to_string()),
                    fill: None,
                }
            }
            Err(_) => {
                // Deadline expired: the lease is released (the guard drops with
                // the caller) and the outcome surfaces as `unknown`, per §5.
                warn!(broker = %decision.broker_key, account_id = %decision.account_id, "adapter call exceeded deadline");
                ExecutionOutcome {
                    alert_id: alert.alert_id.clone(),
                    account_id: Some(decision.account_id.clone()),
                    status: ExecutionStatus::Unknown,
                    reason: Some("deadline exceeded".to_string()),
                    fill: None,
                }
            }
        }
    }

    async fn apply_post_trade(&self, decision: &RouteDecision, alert: &Alert, fill: &crate::models::Fill) {
        let is_paper = decision.broker_key == "simulator"
            || decision.broker_key.ends_with("_sandbox")
            || decision.broker_key.ends_with("_demo")
            || decision.broker_key.ends_with("_paper");

        if decision.is_funded {
            let mut rules_table = self.funded_rules.lock();
            if let Some(rules) = rules_table.get_mut(&decision.account_id) {
                let accounts = self.accounts.lock();
                if let Some(account) = accounts.get(&decision.account_id) {
                    let outcome = funded::apply_fill(&decision.account_id, rules, account, fill.net_pnl(), Utc::now());
                    for violation in outcome.violations {
                        self.violations.lock().insert(violation.id.clone(), violation.clone());
                        self.events.publish(DomainEvent::Violation(violation));
                    }
                    if outcome.newly_violated {
                        self.events.publish(DomainEvent::FlattenRequested { account_id: decision.account_id.clone() });
                    }
                }
            }
        }

        if let Some(strategy_id) = &alert.strategy_id {
            self.strategy_tracker.record(
                strategy_id,
                crate::models::TradeResult {
                    symbol: fill.symbol.clone(),
                    side: fill.side,
                    entry: fill.price,
                    exit: fill.price,
                    quantity: fill.quantity,
                    pnl: fill.net_pnl(),
                    commission: fill.commission,
                    won: fill.net_pnl() > rust_decimal::Decimal::ZERO,
                    timestamp: fill.timestamp,
                    set_number: 0,
                    trade_number_in_set: 0,
                    mode: crate::models::StrategyMode::Live,
                },
            );
        }

        if let Some(journal) = &self.journal {
            let record = fill_to_record(fill, &decision.account_id, is_paper, alert.strategy_id.as_deref());
            journal.enqueue(record);
        }

        self.events.publish(DomainEvent::PositionUpdated { account_id: decision.account_id.clone(), symbol: fill.symbol.clone() });
    }

    pub fn list_accounts(&self) -> Vec<Account> {
        self.accounts.lock().values().cloned().collect()
    }

    pub fn account(&self, account_id: &str) -> Option<Account> {
        self.accounts.lock().get(account_id).cloned()
    }

    pub fn funded_rules_for(&self, account_id: &str) -> Option<FundedRules> {
        self.funded_rules.lock().get(account_id).cloned()
    }

    /// §6.2 filtered violation query.
    pub fn list_violations(&self, account_id: Option<&str>, severity: Option<Severity>, acknowledged: Option<bool>) -> Vec<Violation> {
        self.violations
            .lock()
            .values()
            .filter(|v| account_id.map_or(true, |a| v.account_id == a))
            .filter(|v| severity.map_or(true, |s| v.severity == s))
            .filter(|v| acknowledged.map_or(true, |ack| v.acknowledged == ack))
            .cloned()
            .collect()
    }

    pub fn acknowledge_violation(&self, violation_id: &str) -> bool {
        if let Some(v) = self.violations.lock().get_mut(violation_id) {
            v.acknowledged = true;
            true
        } else {
            false
        }
    }

    pub fn pause_account(&self, account_id: &str) {
        self.paused_accounts.lock().insert(account_id.to_string());
    }

    /// Resume is rejected if the account's current risk level is `violation` (§6.2).
    pub fn resume_account(&self, account_id: &str) -> Result<(), &'static str> {
        if let Some(rules) = self.funded_rules.lock().get(account_id) {
            if rules.risk_level() == RiskLevel::Violation {
                return Err("account_violated");
            }
        }
        self.paused_accounts.lock().remove(account_id);
        Ok(())
    }

    pub fn is_paused(&self, account_id: &str) -> bool {
        self.paused_accounts.lock().contains(account_id)
    }

    /// Dispatches a synthetic `close` alert for every open position on the
    /// account, bypassing the funded-rule gate (§4.6 `close` is always
    /// allowed even when violated).
    pub async fn flatten_positions(&self, account_id: &str) -> Vec<ExecutionOutcome> {
        let open_positions: Vec<(String, i64)> = {
            let accounts = self.accounts.lock();
            let Some(account) = accounts.get(account_id) else {
                return Vec::new();
            };
            account
                .positions
                .values()
                .filter(|p| p.net_quantity != 0)
                .map(|p| (p.symbol.clone(), p.net_quantity))
                .collect()
        };

        let broker_key = self.accounts.lock().get(account_id).map(|a| a.broker_key.clone());
        let Some(broker_key) = broker_key else {
            return Vec::new();
        };

        let mut outcomes = Vec::new();
        for (symbol, net_quantity) in open_positions {
            // Flattening must trade against the position's sign: selling a
            // long, buying back a short. `Action::Close` always maps to a
            // sell-direction delta downstream, which would deepen a short.
            let action = if net_quantity > 0 { crate::models::Action::Sell } else { crate::models::Action::Buy };
            let alert = Alert {
                alert_id: format!("flatten_{}", uuid::Uuid::new_v4()),
                symbol,
                action,
                quantity: net_quantity.unsigned_abs() as u32,
                order_type: crate::models::OrderType::Market,
                price: None,
                stop_price: None,
                strategy_id: None,
                account_group: account_id.to_string(),
                alert_name: None,
                comment: Some("flatten".to_string()),
                timestamp: Utc::now(),
                extra: Default::default(),
            };
            let decision = RouteDecision { account_id: account_id.to_string(), broker_key: broker_key.clone(), is_funded: false, intended_live_account_id: None };
            let outcome = self.execute_with_deadline(&decision, &alert).await;
            if let Some(fill) = &outcome.fill {
                self.apply_post_trade(&decision, &alert, fill).await;
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn default_funded_rules() -> FundedRules {
    FundedRules {
        max_daily_loss: rust_decimal::Decimal::new(2000, 0),
        trailing_drawdown: rust_decimal::Decimal::new(3000, 0),
        max_contracts: 3,
        max_concurrent_positions: 3,
        max_daily_trades: 15,
        profit_target: None,
        trading_windows: Vec::new(),
        restricted_symbols: Default::default(),
        current_daily_pnl: rust_decimal::Decimal::ZERO,
        current_drawdown: rust_decimal::Decimal::ZERO,
        max_peak_equity: rust_decimal::Decimal::new(50_000, 0),
        today_trade_count: 0,
        state: crate::models::RuleState::Active,
        minimum_trading_days: 5,
        news_trading_allowed: false,
        weekend_trading_allowed: false,
        consistency_rule_enabled: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::simulator::PaperTradingEngine;
    use crate::models::{Action, AccountMode, OrderType};
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;
    use tokio::sync::broadcast;

    fn alert() -> Alert {
        Alert {
            alert_id: "a1".into(),
            symbol: "ES".into(),
            action: Action::Buy,
            quantity: 1,
            order_type: OrderType::Market,
            price: None,
            stop_price: None,
            strategy_id: None,
            account_group: "paper_simulator".into(),
            alert_name: None,
            comment: None,
            timestamp: Utc::now(),
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn dispatch_routes_to_simulator_and_fills() {
        let events = Arc::new(EventBus::new());
        let sim = Arc::new(PaperTradingEngine::new(events.sender(), true));
        sim.ensure_account("paper_simulator-simulator", AccountMode::PaperSim, dec!(50000));

        let mut adapters: StdHashMap<String, Arc<dyn BrokerAdapter>> = StdHashMap::new();
        adapters.insert("simulator".to_string(), sim.clone());

        let (tx, _rx) = broadcast::channel(16);
        let strategy_tracker = Arc::new(StrategyTracker::new(tx));

        let router = Router {
            funded_groups: Vec::new(),
            live_groups: StdHashMap::new(),
            funded_account_ids: StdHashMap::new(),
            funded_broker_key: "topstep".to_string(),
            adapters,
            strategy_tracker: strategy_tracker.clone(),
        };

        let orchestrator = Orchestrator {
            router,
            leases: AccountLeases::new(),
            funded_rules: Mutex::new(StdHashMap::new()),
            accounts: Mutex::new(StdHashMap::new()),
            violations: Mutex::new(StdHashMap::new()),
            paused_accounts: Mutex::new(std::collections::HashSet::new()),
            strategy_tracker,
            journal: None,
            events,
            deadline: Duration::from_secs(5),
        };

        let outcome = orchestrator.dispatch(alert()).await;
        assert_eq!(outcome.status, ExecutionStatus::Filled);
        assert!(outcome.fill.is_some());
    }
}
