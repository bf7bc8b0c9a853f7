//! Router (C7 §4.7): account_group -> (account, adapter, is_funded).

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::BrokerAdapter;
use crate::models::{Alert, AssetKind};
use crate::strategy_tracker::StrategyTracker;
use crate::symbols;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperBrokerPreference {
    Tastytrade,
    Tradovate,
    Alpaca,
    Simulator,
    Auto,
}

/// Parses a `paper_<preference>` account group suffix, per §4.7 /
/// `original_source`'s `PaperTradingAlert.get_paper_broker()`: unrecognized
/// suffixes and a bare `paper` (no underscore) both fall back to `auto`.
fn parse_paper_preference(account_group: &str) -> PaperBrokerPreference {
    match account_group.strip_prefix("paper_") {
        Some("tastytrade") | Some("tasty") => PaperBrokerPreference::Tastytrade,
        Some("tradovate") | Some("tradovate_demo") => PaperBrokerPreference::Tradovate,
        Some("alpaca") => PaperBrokerPreference::Alpaca,
        Some("simulator") | Some("sim") => PaperBrokerPreference::Simulator,
        Some("auto") => PaperBrokerPreference::Auto,
        Some(_unrecognized) => PaperBrokerPreference::Simulator,
        None => PaperBrokerPreference::Auto,
    }
}

fn resolve_auto(asset_kind: AssetKind) -> &'static str {
    match asset_kind {
        AssetKind::Future => "tradovate_demo",
        AssetKind::Option | AssetKind::Stock => "tastytrade_sandbox",
        _ => "simulator",
    }
}

pub struct RouteDecision {
    pub account_id: String,
    pub broker_key: String,
    pub is_funded: bool,
    /// The live account this alert would have routed to absent a strategy's
    /// paper-mode override, for fill bookkeeping (§4.7).
    pub intended_live_account_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("no broker configured for account group {0}")]
    NoBrokerConfigured(String),
}

pub struct Router {
    /// Account groups that engage funded-rule gating.
    pub funded_groups: Vec<String>,
    /// account_group -> (account_id, broker_key) for live, non-funded groups.
    pub live_groups: HashMap<String, (String, String)>,
    /// funded account_group -> account_id (adapter is always the funded futures adapter).
    pub funded_account_ids: HashMap<String, String>,
    pub funded_broker_key: String,
    pub adapters: HashMap<String, Arc<dyn BrokerAdapter>>,
    pub strategy_tracker: Arc<StrategyTracker>,
}

impl Router {
    pub fn route(&self, alert: &Alert) -> Result<RouteDecision, RoutingError> {
        // A live-mode strategy_id override to paper always wins, per §4.7.
        if let Some(strategy_id) = &alert.strategy_id {
            if self.strategy_tracker.is_paper_mode(strategy_id) {
                return Ok(RouteDecision {
                    account_id: format!("{}-paper-shadow", strategy_id),
                    broker_key: "simulator".to_string(),
                    is_funded: false,
                    intended_live_account_id: self.resolve_live_account(alert),
                });
            }
        }

        if alert.account_group.starts_with("paper") {
            let pref = parse_paper_preference(&alert.account_group);
            let broker_key = match pref {
                PaperBrokerPreference::Tastytrade => "tastytrade_sandbox",
                PaperBrokerPreference::Tradovate => "tradovate_demo",
                PaperBrokerPreference::Alpaca => "alpaca_paper",
                PaperBrokerPreference::Simulator => "simulator",
                PaperBrokerPreference::Auto => resolve_auto(symbols::classify(&alert.symbol)),
            };
            let broker_key = if self.adapters.contains_key(broker_key) {
                broker_key
            } else {
                "simulator"
            };
            return Ok(RouteDecision {
                account_id: format!("{}-{}", alert.account_group, broker_key),
                broker_key: broker_key.to_string(),
                is_funded: false,
                intended_live_account_id: None,
            });
        }

        if self.funded_groups.contains(&alert.account_group) {
            let account_id = self
                .funded_account_ids
                .get(&alert.account_group)
                .cloned()
                .unwrap_or_else(|| alert.account_group.clone());
            return Ok(RouteDecision { account_id, broker_key: self.funded_broker_key.clone(), is_funded: true, intended_live_account_id: None });
        }

        if let Some((account_id, broker_key)) = self.live_groups.get(&alert.account_group) {
            return Ok(RouteDecision { account_id: account_id.clone(), broker_key: broker_key.clone(), is_funded: false, intended_live_account_id: None });
        }

        Err(RoutingError::NoBrokerConfigured(alert.account_group.clone()))
    }

    /// Resolves the funded/live account this alert's `account_group` would
    /// target, ignoring any strategy paper-mode override. `None` when the
    /// group has no non-paper route (e.g. it only ever resolves to a paper
    /// broker preference).
    fn resolve_live_account(&self, alert: &Alert) -> Option<String> {
        if self.funded_groups.contains(&alert.account_group) {
            return Some(
                self.funded_account_ids
                    .get(&alert.account_group)
                    .cloned()
                    .unwrap_or_else(|| alert.account_group.clone()),
            );
        }
        self.live_groups.get(&alert.account_group).map(|(account_id, _)| account_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_paper_preferences() {
        assert_eq!(parse_paper_preference("paper_tastytrade"), PaperBrokerPreference::Tastytrade);
        assert_eq!(parse_paper_preference("paper_tradovate"), PaperBrokerPreference::Tradovate);
        assert_eq!(parse_paper_preference("paper_alpaca"), PaperBrokerPreference::Alpaca);
        assert_eq!(parse_paper_preference("paper_simulator"), PaperBrokerPreference::Simulator);
        assert_eq!(parse_paper_preference("paper_auto"), PaperBrokerPreference::Auto);
    }

    #[test]
    fn unrecognized_suffix_falls_back_to_simulator() {
        assert_eq!(parse_paper_preference("paper_whatever"), PaperBrokerPreference::Simulator);
    }

    #[test]
    fn bare_paper_falls_back_to_auto() {
        assert_eq!(parse_paper_preference("paper"), PaperBrokerPreference::Auto);
    }

    #[test]
    fn auto_resolution_by_asset_kind() {
        assert_eq!(resolve_auto(AssetKind::Future), "tradovate_demo");
        assert_eq!(resolve_auto(AssetKind::Stock), "tastytrade_sandbox");
        assert_eq!(resolve_auto(AssetKind::Crypto), "simulator");
    }
}
