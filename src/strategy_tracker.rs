//! Strategy performance tracker (C9 §4.9): set aggregation and auto-rotation.

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::models::{DomainEvent, ModeTransition, StrategyConfig, StrategyMode, TradeResult, TradeSet};

struct StrategyState {
    config: StrategyConfig,
    mode: StrategyMode,
    closed_sets: Vec<TradeSet>,
    current_set: Vec<TradeResult>,
    current_set_mode: StrategyMode,
    next_set_number: u32,
    transitions: Vec<ModeTransition>,
}

impl StrategyState {
    fn new(config: StrategyConfig, initial_mode: StrategyMode) -> Self {
        Self {
            config,
            mode: initial_mode,
            closed_sets: Vec::new(),
            current_set: Vec::new(),
            current_set_mode: initial_mode,
            next_set_number: 1,
            transitions: Vec::new(),
        }
    }
}

#[derive(serde::Serialize)]
pub struct StrategySummary {
    pub strategy_id: String,
    pub mode: StrategyMode,
    pub closed_sets: usize,
    pub last_win_rates: Vec<Decimal>,
}

const MAX_ALERTS: usize = 200;

/// `Register`/`Record`/`Summary`/`SetMode` (§4.9 contract). Trades are
/// processed in the order `record` is called (§5 ordering guarantee).
pub struct StrategyTracker {
    states: RwLock<HashMap<String, StrategyState>>,
    /// Ring buffer of mode-change alerts across all strategies (§6.3's
    /// `/api/strategies/alerts` feed), distinct from a single strategy's
    /// full `transitions` history.
    alerts: RwLock<Vec<ModeTransition>>,
    events: broadcast::Sender<DomainEvent>,
}

impl StrategyTracker {
    pub fn new(events: broadcast::Sender<DomainEvent>) -> Self {
        Self { states: RwLock::new(HashMap::new()), alerts: RwLock::new(Vec::new()), events }
    }

    fn push_alert(&self, transition: ModeTransition) {
        let mut alerts = self.alerts.write();
        alerts.push(transition);
        if alerts.len() > MAX_ALERTS {
            let excess = alerts.len() - MAX_ALERTS;
            alerts.drain(0..excess);
        }
    }

    pub fn alerts(&self) -> Vec<ModeTransition> {
        self.alerts.read().clone()
    }

    pub fn clear_alerts(&self) {
        self.alerts.write().clear();
    }

    pub fn exists(&self, strategy_id: &str) -> bool {
        self.states.read().contains_key(strategy_id)
    }

    pub fn summaries(&self) -> Vec<StrategySummary> {
        let states = self.states.read();
        states.keys().filter_map(|id| self.summary_locked(&states, id)).collect()
    }

    pub fn sets(&self, strategy_id: &str) -> Option<Vec<TradeSet>> {
        self.states.read().get(strategy_id).map(|s| s.closed_sets.clone())
    }

    pub fn register(&self, config: StrategyConfig, initial_mode: StrategyMode) {
        let id = config.strategy_id.clone();
        self.states.write().entry(id).or_insert_with(|| StrategyState::new(config, initial_mode));
    }

    pub fn is_paper_mode(&self, strategy_id: &str) -> bool {
        self.states
            .read()
            .get(strategy_id)
            .map(|s| s.mode == StrategyMode::Paper)
            .unwrap_or(false)
    }

    /// Records a trade into its strategy's current set. The set's `mode` is
    /// fixed at the strategy's mode when the set's first trade arrived (§4.9
    /// invariant); a mode change mid-set only applies to the next set.
    pub fn record(&self, strategy_id: &str, mut trade: TradeResult) -> Option<ModeTransition> {
        let mut states = self.states.write();
        let state = states.get_mut(strategy_id)?;

        if state.current_set.is_empty() {
            state.current_set_mode = state.mode;
        }
        trade.mode = state.current_set_mode;
        trade.set_number = state.next_set_number;
        trade.trade_number_in_set = state.current_set.len() as u32 + 1;
        state.current_set.push(trade);

        if state.current_set.len() as u32 >= state.config.set_size {
            let closed = TradeSet {
                set_number: state.next_set_number,
                mode: state.current_set_mode,
                trades: std::mem::take(&mut state.current_set),
            };
            state.closed_sets.push(closed);
            state.next_set_number += 1;

            let transition = evaluate_rotation(state);
            if let Some(t) = &transition {
                state.mode = t.to;
                state.transitions.push(t.clone());
            }
            drop(states);
            if let Some(t) = &transition {
                self.push_alert(t.clone());
                let _ = self.events.send(DomainEvent::StrategyModeChanged(t.clone()));
            }
            return transition;
        }
        None
    }

    /// Manual mode change: always honored, always recorded with reason `manual`.
    pub fn set_mode(&self, strategy_id: &str, mode: StrategyMode, reason: impl Into<String>) -> Option<ModeTransition> {
        let mut states = self.states.write();
        let state = states.get_mut(strategy_id)?;
        let from = state.mode;
        let transition = ModeTransition {
            strategy_id: strategy_id.to_string(),
            from,
            to: mode,
            reason: reason.into(),
            trigger_win_rates: Vec::new(),
            timestamp: Utc::now(),
        };
        state.mode = mode;
        state.transitions.push(transition.clone());
        drop(states);
        self.push_alert(transition.clone());
        let _ = self.events.send(DomainEvent::StrategyModeChanged(transition.clone()));
        Some(transition)
    }

    pub fn summary(&self, strategy_id: &str) -> Option<StrategySummary> {
        let states = self.states.read();
        self.summary_locked(&states, strategy_id)
    }

    fn summary_locked(&self, states: &HashMap<String, StrategyState>, strategy_id: &str) -> Option<StrategySummary> {
        let state = states.get(strategy_id)?;
        let last_win_rates = state
            .closed_sets
            .iter()
            .rev()
            .take(state.config.rotation_k as usize)
            .map(|s| s.win_rate(state.config.set_size))
            .collect();
        Some(StrategySummary {
            strategy_id: strategy_id.to_string(),
            mode: state.mode,
            closed_sets: state.closed_sets.len(),
            last_win_rates,
        })
    }

    pub fn transitions(&self, strategy_id: &str) -> Vec<ModeTransition> {
        self.states.read().get(strategy_id).map(|s| s.transitions.clone()).unwrap_or_default()
    }
}

fn evaluate_rotation(state: &StrategyState) -> Option<ModeTransition> {
    let k = state.config.rotation_k as usize;
    if state.closed_sets.len() < k {
        return None;
    }
    let recent: Vec<&TradeSet> = state.closed_sets.iter().rev().take(k).collect();
    let win_rates: Vec<Decimal> = recent.iter().map(|s| s.win_rate(state.config.set_size)).collect();

    match state.mode {
        StrategyMode::Live if win_rates.iter().all(|wr| *wr < state.config.min_win_rate) => {
            let mut ordered = win_rates.clone();
            ordered.reverse();
            Some(ModeTransition {
                strategy_id: state.config.strategy_id.clone(),
                from: StrategyMode::Live,
                to: StrategyMode::Paper,
                reason: format!("last {k} sets below min win rate: {ordered:?}"),
                trigger_win_rates: ordered,
                timestamp: Utc::now(),
            })
        }
        StrategyMode::Paper if win_rates.iter().all(|wr| *wr >= state.config.min_win_rate) => {
            let mut ordered = win_rates.clone();
            ordered.reverse();
            Some(ModeTransition {
                strategy_id: state.config.strategy_id.clone(),
                from: StrategyMode::Paper,
                to: StrategyMode::Live,
                reason: format!("last {k} paper sets at/above min win rate: {ordered:?}"),
                trigger_win_rates: ordered,
                timestamp: Utc::now(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use rust_decimal_macros::dec;

    fn tracker() -> StrategyTracker {
        let (tx, _rx) = broadcast::channel(16);
        StrategyTracker::new(tx)
    }

    fn trade(won: bool) -> TradeResult {
        TradeResult {
            symbol: "ES".into(),
            side: Action::Buy,
            entry: dec!(5000),
            exit: dec!(5010),
            quantity: 1,
            pnl: if won { dec!(100) } else { dec!(-100) },
            commission: dec!(3.52),
            won,
            timestamp: Utc::now(),
            set_number: 0,
            trade_number_in_set: 0,
            mode: StrategyMode::Live,
        }
    }

    #[test]
    fn rotates_live_to_paper_after_k_bad_sets() {
        let t = tracker();
        t.register(
            StrategyConfig { strategy_id: "S".into(), name: "S".into(), min_win_rate: dec!(55), set_size: 20, rotation_k: 2 },
            StrategyMode::Live,
        );
        // Set 1: 9/20 wins = 45%. Set 2: 10/20 wins = 50%.
        let mut transition = None;
        for set_idx in 0..2 {
            let wins = if set_idx == 0 { 9 } else { 10 };
            for i in 0..20 {
                transition = t.record("S", trade(i < wins));
            }
        }
        let transition = transition.expect("expected rotation after 40th trade");
        assert_eq!(transition.from, StrategyMode::Live);
        assert_eq!(transition.to, StrategyMode::Paper);
        assert!(t.is_paper_mode("S"));
    }

    #[test]
    fn manual_override_always_honored() {
        let t = tracker();
        t.register(
            StrategyConfig { strategy_id: "S".into(), name: "S".into(), min_win_rate: dec!(55), set_size: 20, rotation_k: 2 },
            StrategyMode::Live,
        );
        let transition = t.set_mode("S", StrategyMode::Paper, "manual").unwrap();
        assert_eq!(transition.reason, "manual");
        assert!(t.is_paper_mode("S"));
    }
}
