//! Paper-trading simulator (C5 §4.5): synthetic quotes, slippage, commission,
//! and position bookkeeping, producing fills shaped identically to live fills.

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

use crate::adapters::{AdapterCapabilities, BrokerAdapter, ExecutionResult, Quote};
use crate::error::ExecutionErrorKind;
use crate::models::{
    Account, AccountMode, AccountSnapshot, Action, Alert, DomainEvent, Fill, Order, OrderType, Position,
};
use crate::symbols;

const SNAPSHOT_STALENESS_SECS: i64 = 5;
const DEFAULT_FUTURES_POSITION_CAP: i64 = 10;

#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Regular,
    Extended,
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct MarketConditions {
    pub session: Session,
    pub liquidity_factor: Decimal,
    pub volatility_multiplier: Decimal,
}

impl MarketConditions {
    /// Derived purely from hour-of-day in the configured exchange timezone;
    /// the simulator is given an already-localized `DateTime` by its caller.
    pub fn from_hour(hour: u32) -> Self {
        let (session, liquidity_factor) = match hour {
            9..=15 => (Session::Regular, dec!(1.0)),
            4..=8 | 16..=19 => (Session::Extended, dec!(0.3)),
            _ => (Session::Closed, dec!(0.1)),
        };
        let volatility_multiplier = match hour {
            9 | 15 => dec!(1.5),
            11 | 12 | 13 => dec!(0.7),
            _ => dec!(1.0),
        };
        Self { session, liquidity_factor, volatility_multiplier }
    }
}

fn spread_bps(kind: crate::models::AssetKind) -> Decimal {
    use crate::models::AssetKind::*;
    match kind {
        Future => dec!(0.0001),
        Stock => dec!(0.0005),
        Option => dec!(0.01),
        Crypto => dec!(0.0005),
        Forex => dec!(0.00005),
    }
}

fn base_slip(kind: crate::models::AssetKind) -> Decimal {
    use crate::models::AssetKind::*;
    match kind {
        Stock => dec!(0.0001),
        Future => dec!(0.0005),
        Option => dec!(0.002),
        Crypto => dec!(0.001),
        Forex => dec!(0.00005),
    }
}

fn order_type_mult(order_type: OrderType) -> Decimal {
    match order_type {
        OrderType::Market => dec!(1.0),
        OrderType::Limit => dec!(0.2),
        OrderType::Stop => dec!(1.5),
        OrderType::StopLimit => dec!(1.2),
    }
}

fn decimal_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

fn uniform(rng: &mut impl Rng, lo: f64, hi: f64) -> f64 {
    rng.gen_range(lo..=hi)
}

/// Single-writer, many-reader market data cache (§5): the simulator's
/// background task is the sole writer; readers tolerate a stale snapshot
/// since each read takes a full clone under the lock rather than racing
/// field-by-field.
pub struct MarketDataCache {
    snapshots: RwLock<HashMap<String, MarketSnapshot>>,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self { snapshots: RwLock::new(HashMap::new()) }
    }

    fn seed_price(symbol: &str) -> Decimal {
        // Deterministic per-symbol seed so repeated runs are comparable;
        // real market data is out of scope (§1 non-goals).
        match symbol {
            "ES" => dec!(5000),
            "NQ" => dec!(17500),
            "YM" => dec!(38000),
            "RTY" => dec!(2000),
            "GC" => dec!(2000),
            "SI" => dec!(24),
            "CL" => dec!(75),
            "NG" => dec!(2.5),
            _ => dec!(100),
        }
    }

    pub fn get_or_synthesize(&self, symbol: &str, conditions: MarketConditions) -> MarketSnapshot {
        let now = Utc::now();
        if let Some(existing) = self.snapshots.read().get(symbol) {
            if (now - existing.timestamp).num_seconds() < SNAPSHOT_STALENESS_SECS {
                return existing.clone();
            }
        }
        let kind = symbols::classify(symbol);
        let (_, tick) = symbols::spec_for(symbol);
        let seed = Self::seed_price(symbol);
        let mut rng = rand::thread_rng();
        let v = 0.02 * decimal_to_f64(conditions.volatility_multiplier);
        let ret = uniform(&mut rng, -v, v);
        let last = seed + seed * Decimal::try_from(ret).unwrap_or(Decimal::ZERO);
        let spread = last * spread_bps(kind);
        let bid = symbols::round_to_tick(last - spread / dec!(2), tick);
        let ask = symbols::round_to_tick(last + spread / dec!(2), tick);
        let last = symbols::round_to_tick(last, tick);
        let snapshot = MarketSnapshot { bid, ask, last, volume: rng.gen_range(100..10_000), timestamp: now };
        self.snapshots.write().insert(symbol.to_string(), snapshot.clone());
        snapshot
    }

    /// Background-task perturbation, 1s cadence (§4.5).
    pub fn perturb_all(&self, conditions: MarketConditions) {
        let mut rng = rand::thread_rng();
        let mut snapshots = self.snapshots.write();
        for (symbol, snapshot) in snapshots.iter_mut() {
            let (_, tick) = symbols::spec_for(symbol);
            let v = 0.001 * decimal_to_f64(conditions.volatility_multiplier);
            let ret = uniform(&mut rng, -v, v);
            let delta = Decimal::try_from(ret).unwrap_or(Decimal::ZERO);
            snapshot.last = symbols::round_to_tick(snapshot.last + snapshot.last * delta, tick);
            snapshot.bid = symbols::round_to_tick(snapshot.bid + snapshot.bid * delta, tick);
            snapshot.ask = symbols::round_to_tick(snapshot.ask + snapshot.ask * delta, tick);
            snapshot.timestamp = Utc::now();
        }
    }
}

fn commission_for(kind: crate::models::AssetKind, quantity: u32, notional: Decimal) -> Decimal {
    use crate::models::AssetKind::*;
    let qty = Decimal::from(quantity);
    match kind {
        Future => (dec!(2.25) + dec!(1.25) + dec!(0.02)) * qty,
        Option => (dec!(0.65) + dec!(0.15) + dec!(0.02)) * qty,
        Stock => dec!(0.01) * qty,
        Crypto => notional * dec!(0.001),
        Forex => Decimal::ZERO,
    }
}

pub struct PaperTradingEngine {
    pub accounts: RwLock<HashMap<String, Account>>,
    orders: RwLock<HashMap<String, Vec<Order>>>,
    fills: RwLock<HashMap<String, Vec<Fill>>>,
    market_data: Arc<MarketDataCache>,
    events: broadcast::Sender<DomainEvent>,
    test_mode: bool,
    futures_position_cap: i64,
}

impl PaperTradingEngine {
    pub fn new(events: broadcast::Sender<DomainEvent>, test_mode: bool) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
            fills: RwLock::new(HashMap::new()),
            market_data: Arc::new(MarketDataCache::new()),
            events,
            test_mode,
            futures_position_cap: DEFAULT_FUTURES_POSITION_CAP,
        }
    }

    pub fn market_data(&self) -> Arc<MarketDataCache> {
        self.market_data.clone()
    }

    pub fn ensure_account(&self, account_id: &str, mode: AccountMode, initial_balance: Decimal) {
        self.accounts
            .write()
            .entry(account_id.to_string())
            .or_insert_with(|| Account::new(account_id, account_id, "simulator", mode, initial_balance));
    }

    pub fn list_accounts(&self) -> Vec<AccountSnapshot> {
        self.accounts.read().values().map(AccountSnapshot::from).collect()
    }

    pub fn account_snapshot(&self, account_id: &str) -> Option<AccountSnapshot> {
        self.accounts.read().get(account_id).map(AccountSnapshot::from)
    }

    pub fn list_orders(&self, account_id: &str) -> Vec<Order> {
        self.orders.read().get(account_id).cloned().unwrap_or_default()
    }

    pub fn list_fills(&self, account_id: &str) -> Vec<Fill> {
        self.fills.read().get(account_id).cloned().unwrap_or_default()
    }

    /// Resets an account back to a flat, fully-funded state (§6.3). Returns
    /// `false` if the account doesn't exist.
    pub fn reset_account(&self, account_id: &str, initial_balance: Decimal) -> bool {
        let mut accounts = self.accounts.write();
        let Some(account) = accounts.get_mut(account_id) else {
            return false;
        };
        let mode = account.mode;
        *account = Account::new(account_id, account_id, "simulator", mode, initial_balance);
        self.orders.write().remove(account_id);
        self.fills.write().remove(account_id);
        true
    }

    /// Submits a synthetic closing alert for every open position (§6.3 flatten).
    pub async fn flatten_account(&self, account_id: &str) -> Vec<Fill> {
        let symbols_with_qty: Vec<(String, i64)> = {
            let accounts = self.accounts.read();
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

        let mut fills = Vec::new();
        for (symbol, net_quantity) in symbols_with_qty {
            let action = if net_quantity > 0 { Action::Sell } else { Action::Buy };
            let alert = Alert {
                alert_id: format!("flatten_{}", uuid::Uuid::new_v4()),
                symbol,
                action,
                quantity: net_quantity.unsigned_abs() as u32,
                order_type: OrderType::Market,
                price: None,
                stop_price: None,
                strategy_id: None,
                account_group: "paper_simulator".to_string(),
                alert_name: None,
                comment: Some("flatten".to_string()),
                timestamp: Utc::now(),
                extra: Default::default(),
            };
            let result = self.execute(account_id, &alert).await;
            if let Some(fill) = result.fill {
                fills.push(fill);
            }
        }
        fills
    }

    fn conditions_now(&self) -> MarketConditions {
        MarketConditions::from_hour(Utc::now().hour())
    }

    /// The §4.5 fill-price algorithm.
    fn fill_price(&self, alert: &Alert, snapshot: &MarketSnapshot, conditions: MarketConditions, tick: Decimal) -> Decimal {
        let kind = symbols::classify(&alert.symbol);
        let base = match (alert.action, alert.order_type) {
            (Action::Buy, OrderType::Market) => snapshot.ask,
            (Action::Sell, OrderType::Market) => snapshot.bid,
            (_, OrderType::Limit) => alert.price.unwrap_or(snapshot.last),
            _ => snapshot.last,
        };

        let mut rng = rand::thread_rng();
        let slip_fraction = decimal_to_f64(base_slip(kind))
            * (2.0 - decimal_to_f64(conditions.liquidity_factor))
            * decimal_to_f64(conditions.volatility_multiplier)
            * decimal_to_f64(order_type_mult(alert.order_type))
            * (1.0 + (alert.quantity as f64 / 1000.0).min(0.01))
            * uniform(&mut rng, 0.5, 1.5);
        let slip_amount = base * Decimal::try_from(slip_fraction).unwrap_or(Decimal::ZERO);

        let adjusted = match alert.action {
            Action::Buy => base + slip_amount,
            _ => base - slip_amount,
        };
        symbols::round_to_tick(adjusted, tick)
    }

    fn validate(&self, account: &Account, alert: &Alert, snapshot: &MarketSnapshot, conditions: MarketConditions, tick: Decimal, multiplier: Decimal) -> Result<(), String> {
        if conditions.session == Session::Closed && !self.test_mode {
            return Err("market_closed".to_string());
        }
        if alert.action == Action::Buy {
            let notional = snapshot.ask * Decimal::from(alert.quantity) * multiplier;
            if notional > account.buying_power {
                return Err("insufficient_buying_power".to_string());
            }
        }
        let kind = symbols::classify(&alert.symbol);
        if kind == crate::models::AssetKind::Future {
            let current = account.positions.get(&alert.symbol).map(|p| p.net_quantity).unwrap_or(0);
            let delta = match alert.action {
                Action::Buy => alert.quantity as i64,
                Action::Sell => -(alert.quantity as i64),
                Action::Close => 0,
            };
            if (current + delta).abs() > self.futures_position_cap {
                return Err("position_cap_exceeded".to_string());
            }
        }
        for price in [alert.price, alert.stop_price].into_iter().flatten() {
            if (price / tick).fract() != Decimal::ZERO {
                return Err("price_not_tick_aligned".to_string());
            }
        }
        Ok(())
    }

    pub async fn execute(&self, account_id: &str, alert: &Alert) -> ExecutionResult {
        let order_id = format!("ord_{}", uuid::Uuid::new_v4());
        let conditions = self.conditions_now();
        let (multiplier, tick) = symbols::spec_for(&alert.symbol);
        let snapshot = self.market_data.get_or_synthesize(&alert.symbol, conditions);

        {
            let accounts = self.accounts.read();
            let Some(account) = accounts.get(account_id) else {
                return ExecutionResult { order_id, fill: None, rejection_reason: Some("unknown_account".into()), error_kind: Some(ExecutionErrorKind::Internal) };
            };
            if let Err(reason) = self.validate(account, alert, &snapshot, conditions, tick, multiplier) {
                return ExecutionResult::rejected(order_id, reason);
            }
        }

        // Synthetic latency (§4.5): 50-200ms before the fill is produced.
        let delay_ms = rand::thread_rng().gen_range(50..=200);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        let price = self.fill_price(alert, &snapshot, conditions, tick);
        let kind = symbols::classify(&alert.symbol);
        let notional = price * Decimal::from(alert.quantity) * multiplier;
        let commission = commission_for(kind, alert.quantity, notional);
        let slippage = match alert.action {
            Action::Buy => price - snapshot.ask,
            _ => snapshot.bid - price,
        };

        let signed_qty = match alert.action {
            Action::Buy => alert.quantity as i64,
            Action::Sell | Action::Close => -(alert.quantity as i64),
        };

        let mut accounts = self.accounts.write();
        let Some(account) = accounts.get_mut(account_id) else {
            return ExecutionResult { order_id, fill: None, rejection_reason: Some("unknown_account".into()), error_kind: Some(ExecutionErrorKind::Internal) };
        };

        let position = account
            .positions
            .entry(alert.symbol.clone())
            .or_insert_with(|| Position::new(alert.symbol.clone(), kind, multiplier, 0, price, Utc::now()));
        let realized = position.apply_fill(signed_qty, price, Utc::now());

        if alert.action == Action::Buy {
            account.reserve_buying_power(notional);
        } else {
            account.release_buying_power(price * Decimal::from(alert.quantity) * multiplier);
        }
        account.apply_fee(commission);
        account.apply_realized_pnl(realized);

        let fill = Fill {
            id: format!("fill_{}", uuid::Uuid::new_v4()),
            order_id: order_id.clone(),
            account_id: account_id.to_string(),
            symbol: alert.symbol.clone(),
            side: alert.action,
            quantity: alert.quantity,
            price,
            commission,
            fees: Decimal::ZERO,
            slippage: slippage.abs(),
            timestamp: Utc::now(),
            broker_key: "simulator".to_string(),
            realized_pnl: realized,
            intended_live_account_id: None,
        };

        debug!(account_id, symbol = %alert.symbol, %price, "paper fill produced");

        let mut order = Order::new(
            order_id.clone(),
            account_id.to_string(),
            alert.symbol.clone(),
            alert.action,
            alert.order_type,
            alert.quantity,
            alert.price,
            alert.stop_price,
            fill.timestamp,
        );
        order.record_fill(fill.quantity, fill.price, fill.timestamp);
        self.orders.write().entry(account_id.to_string()).or_default().push(order);
        self.fills.write().entry(account_id.to_string()).or_default().push(fill.clone());

        let _ = self.events.send(DomainEvent::Fill(fill.clone()));
        ExecutionResult::success(order_id, fill)
    }

    /// Background task entry point: perturb the cache at a 1s cadence.
    pub async fn run_background_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let conditions = self.conditions_now();
            self.market_data.perturb_all(conditions);
        }
    }
}

#[async_trait]
impl BrokerAdapter for PaperTradingEngine {
    fn broker_key(&self) -> &str {
        "simulator"
    }

    async fn initialize(&self) -> anyhow::Result<AdapterCapabilities> {
        Ok(AdapterCapabilities {
            connected: true,
            account_ids: self.accounts.read().keys().cloned().collect(),
            default_account_id: None,
            supports_cancellation: false,
        })
    }

    async fn execute_alert(&self, account_id: &str, alert: &Alert) -> anyhow::Result<ExecutionResult> {
        Ok(self.execute(account_id, alert).await)
    }

    async fn get_positions(&self, account_id: &str) -> anyhow::Result<Vec<Position>> {
        Ok(self
            .accounts
            .read()
            .get(account_id)
            .map(|a| a.positions.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_quote(&self, symbol: &str) -> anyhow::Result<Quote> {
        let conditions = self.conditions_now();
        let snapshot = self.market_data.get_or_synthesize(symbol, conditions);
        Ok(Quote { symbol: symbol.to_string(), bid: snapshot.bid, ask: snapshot.ask, last: snapshot.last, volume: snapshot.volume })
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PaperTradingEngine {
        let (tx, _rx) = broadcast::channel(16);
        PaperTradingEngine::new(tx, true)
    }

    fn alert(symbol: &str, action: Action, quantity: u32) -> Alert {
        Alert {
            alert_id: "alert_1".into(),
            symbol: symbol.into(),
            action,
            quantity,
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
    async fn buy_futures_produces_commission_and_position() {
        let engine = engine();
        engine.ensure_account("acc1", AccountMode::PaperSim, dec!(50000));
        let result = engine.execute("acc1", &alert("ES", Action::Buy, 1)).await;
        let fill = result.fill.expect("expected a fill");
        assert_eq!(fill.commission, dec!(3.52));
        let accounts = engine.accounts.read();
        let position = accounts.get("acc1").unwrap().positions.get("ES").unwrap();
        assert_eq!(position.net_quantity, 1);
    }

    #[test]
    fn market_conditions_by_hour() {
        let c = MarketConditions::from_hour(9);
        assert_eq!(c.session, Session::Regular);
        assert_eq!(c.volatility_multiplier, dec!(1.5));
        let closed = MarketConditions::from_hour(2);
        assert_eq!(closed.session, Session::Closed);
    }
}
