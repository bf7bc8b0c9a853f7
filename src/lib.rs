//! TradeGate Backend Library
//!
//! Exposes the modules that don't depend on `AppState` (which lives in
//! `main.rs`) so integration tests can exercise the dispatch pipeline
//! directly.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod credential_vault;
pub mod error;
pub mod events;
pub mod funded;
pub mod journal;
pub mod middleware;
pub mod models;
pub mod orchestrator;
pub mod router;
pub mod strategy_tracker;
pub mod symbols;
pub mod webhook;
