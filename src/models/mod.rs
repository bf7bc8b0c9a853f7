//! Core data model (spec §3): alerts, accounts, positions, orders, fills,
//! funded-account rules/violations, strategy performance, journal entries,
//! and the domain events published between components.

pub mod account;
pub mod alert;
pub mod event;
pub mod journal;
pub mod order;
pub mod position;
pub mod strategy;
pub mod violation;

pub use account::{Account, AccountMode, AccountSnapshot, ConnectionState};
pub use alert::{Action, Alert, AssetKind, OrderType};
pub use event::{DomainEvent, ExecutionOutcome, ExecutionStatus};
pub use journal::{JournalAssetType, JournalTradeRecord, JournalUploadPayload, PendingTrade};
pub use order::{Fill, Order, OrderStatus};
pub use position::Position;
pub use strategy::{ModeTransition, StrategyConfig, StrategyMode, TradeResult, TradeSet};
pub use violation::{FundedRules, RiskLevel, RuleState, Severity, TradingWindow, Violation, ViolationKind};
