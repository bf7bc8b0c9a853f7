//! End-to-end dispatch: webhook alert parsing through router, funded-rule
//! gate, and the paper simulator producing a fill.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal_macros::dec;

use tradegate_backend::adapters::simulator::PaperTradingEngine;
use tradegate_backend::adapters::BrokerAdapter;
use tradegate_backend::events::EventBus;
use tradegate_backend::models::alert::parse;
use tradegate_backend::models::{AccountMode, ExecutionStatus, FundedRules, RiskLevel};
use tradegate_backend::orchestrator::{AccountLeases, Orchestrator};
use tradegate_backend::router::Router;
use tradegate_backend::strategy_tracker::StrategyTracker;

fn make_orchestrator() -> (Arc<Orchestrator>, Arc<PaperTradingEngine>) {
    let events = Arc::new(EventBus::new());
    let strategy_tracker = Arc::new(StrategyTracker::new(events.sender()));
    let paper_engine = Arc::new(PaperTradingEngine::new(events.sender(), true));
    paper_engine.ensure_account("paper_simulator-simulator", AccountMode::PaperSim, dec!(50000));

    let mut adapters: HashMap<String, Arc<dyn BrokerAdapter>> = HashMap::new();
    adapters.insert("simulator".to_string(), paper_engine.clone() as Arc<dyn BrokerAdapter>);

    let router = Router {
        funded_groups: vec!["funded".to_string()],
        live_groups: HashMap::new(),
        funded_account_ids: HashMap::from([("funded".to_string(), "funded-account-1".to_string())]),
        funded_broker_key: "simulator".to_string(),
        adapters,
        strategy_tracker: strategy_tracker.clone(),
    };

    let orchestrator = Arc::new(Orchestrator {
        router,
        leases: AccountLeases::new(),
        funded_rules: Mutex::new(HashMap::new()),
        accounts: Mutex::new(HashMap::new()),
        violations: Mutex::new(HashMap::new()),
        paused_accounts: Mutex::new(HashSet::new()),
        strategy_tracker,
        journal: None,
        events,
        deadline: Duration::from_secs(5),
    });
    (orchestrator, paper_engine)
}

#[tokio::test]
async fn webhook_alert_fills_through_paper_simulator() {
    let (orchestrator, _paper_engine) = make_orchestrator();

    let alert = parse(br#"{"symbol":"es","action":"buy","quantity":1,"account_group":"paper_simulator"}"#).unwrap();
    let outcome = orchestrator.dispatch(alert).await;

    assert_eq!(outcome.status, ExecutionStatus::Filled);
    assert!(outcome.fill.is_some());
}

#[tokio::test]
async fn funded_account_blocked_once_daily_loss_limit_breached() {
    let (orchestrator, _paper_engine) = make_orchestrator();

    orchestrator.funded_rules.lock().insert(
        "funded-account-1".to_string(),
        FundedRules {
            max_daily_loss: dec!(1000),
            trailing_drawdown: dec!(2000),
            max_contracts: 3,
            max_concurrent_positions: 3,
            max_daily_trades: 15,
            profit_target: None,
            trading_windows: Vec::new(),
            restricted_symbols: Default::default(),
            current_daily_pnl: dec!(-1000),
            current_drawdown: dec!(0),
            max_peak_equity: dec!(50000),
            today_trade_count: 0,
            state: tradegate_backend::models::RuleState::Active,
            minimum_trading_days: 5,
            news_trading_allowed: false,
            weekend_trading_allowed: false,
            consistency_rule_enabled: true,
        },
    );

    let alert = parse(br#"{"symbol":"es","action":"buy","quantity":1,"account_group":"funded"}"#).unwrap();
    let outcome = orchestrator.dispatch(alert).await;

    assert_eq!(outcome.status, ExecutionStatus::Rejected);
    let rules = orchestrator.funded_rules_for("funded-account-1").unwrap();
    assert_eq!(rules.risk_level(), RiskLevel::Violation);
}

#[tokio::test]
async fn rejects_malformed_alert_before_dispatch() {
    let err = parse(br#"{"symbol":"ES","action":"buy","quantity":0}"#).unwrap_err();
    assert!(format!("{err}").contains("validation"));
}
