//! TradeGate: multi-broker trading gateway.
//! Ingests TradingView webhook alerts, routes them to live, funded, or paper
//! brokers under a risk-rule gate, and exposes a REST/WebSocket dashboard API.

mod adapters;
mod api;
mod auth;
mod config;
mod credential_vault;
mod error;
mod events;
mod funded;
mod journal;
mod middleware;
mod models;
mod orchestrator;
mod router;
mod strategy_tracker;
mod symbols;
mod webhook;

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use dotenv::dotenv;
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::adapters::live::LiveAdapter;
use crate::adapters::simulator::PaperTradingEngine;
use crate::adapters::BrokerAdapter;
use crate::auth::{api as auth_api, auth_middleware, AuthState, JwtHandler, UserStore};
use crate::config::Config;
use crate::credential_vault::CredentialVault;
use crate::events::EventBus;
use crate::journal::JournalClient;
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitLayer};
use crate::models::AccountMode;
use crate::orchestrator::{AccountLeases, Orchestrator};
use crate::router::Router;
use crate::strategy_tracker::StrategyTracker;
use crate::webhook::WebhookAuthenticator;
use crate::webhook::auth::WebhookRateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub webhook_auth: Arc<WebhookAuthenticator>,
    pub webhook_rate_limiter: Arc<WebhookRateLimiter>,
    pub orchestrator: Arc<Orchestrator>,
    pub paper_engine: Arc<PaperTradingEngine>,
    pub strategy_tracker: Arc<StrategyTracker>,
    pub events: Arc<EventBus>,
    pub vault: Arc<CredentialVault>,
    pub journal: Option<Arc<JournalClient>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    info!("tradegate starting up");

    let config = Arc::new(Config::from_env());

    let vault = Arc::new(CredentialVault::init(&config.vault_file_path));

    let events = Arc::new(EventBus::new());

    let webhook_auth = Arc::new(WebhookAuthenticator::new(config.webhook_secret.clone()));
    let webhook_rate_limiter = Arc::new(WebhookRateLimiter::new(
        config.webhook_rate_limit_max,
        Duration::from_secs(config.webhook_rate_limit_window_secs),
    ));

    let strategy_tracker = Arc::new(StrategyTracker::new(events.sender()));
    let paper_engine = Arc::new(PaperTradingEngine::new(events.sender(), config.paper_test_mode));
    paper_engine.ensure_account("paper_simulator-simulator", AccountMode::PaperSim, Decimal::new(50_000, 0));

    tokio::spawn(paper_engine.clone().run_background_loop());

    let mut adapters: std::collections::HashMap<String, Arc<dyn BrokerAdapter>> = std::collections::HashMap::new();
    adapters.insert("simulator".to_string(), paper_engine.clone() as Arc<dyn BrokerAdapter>);
    for cred in &config.broker_credentials {
        let adapter = Arc::new(LiveAdapter::new(cred.broker_key.clone(), None, cred.env_fallback.clone(), vault.clone()));
        adapters.insert(cred.broker_key.clone(), adapter as Arc<dyn BrokerAdapter>);
    }

    let router = Router {
        funded_groups: vec!["funded".to_string()],
        live_groups: std::collections::HashMap::new(),
        funded_account_ids: std::collections::HashMap::from([("funded".to_string(), "funded-account-1".to_string())]),
        funded_broker_key: "topstep".to_string(),
        adapters,
        strategy_tracker: strategy_tracker.clone(),
    };

    let (journal_client, journal_handle) = if config.journal_enabled {
        let (client, handle) = JournalClient::new(config.clone());
        (Some(Arc::new(client)), Some(handle))
    } else {
        (None, None)
    };

    let orchestrator = Arc::new(Orchestrator {
        router,
        leases: AccountLeases::new(),
        funded_rules: parking_lot::Mutex::new(std::collections::HashMap::new()),
        accounts: parking_lot::Mutex::new(std::collections::HashMap::new()),
        violations: parking_lot::Mutex::new(std::collections::HashMap::new()),
        paused_accounts: parking_lot::Mutex::new(std::collections::HashSet::new()),
        strategy_tracker: strategy_tracker.clone(),
        journal: journal_client.clone(),
        events: events.clone(),
        deadline: Duration::from_secs(config.orchestrator_deadline_secs),
    });

    // Dashboard auth: local SQLite user store, JWT sessions.
    let auth_db_path = resolve_data_path(env::var("AUTH_DB_PATH").ok(), "tradegate_auth.db");
    let jwt_secret = env::var("JWT_SECRET")
        .unwrap_or_else(|_| "dev-secret-change-in-production-minimum-32-characters".to_string());
    let user_store = Arc::new(UserStore::new(&auth_db_path)?);
    let jwt_handler = Arc::new(JwtHandler::new(jwt_secret));
    let auth_state = AuthState::new(user_store, jwt_handler.clone());
    info!("dashboard auth initialized at {}", auth_db_path);

    let state = AppState {
        config: config.clone(),
        webhook_auth,
        webhook_rate_limiter,
        orchestrator,
        paper_engine,
        strategy_tracker,
        events,
        vault,
        journal: journal_client.clone(),
    };

    let rest_rate_limiter = RateLimitLayer::new(RateLimitConfig::default());

    let auth_router = AxumRouter::new()
        .route("/api/auth/login", post(auth_api::login))
        .with_state(auth_state);

    let webhook_routes = AxumRouter::new()
        .route("/webhook/tradingview", post(api::webhook::receive_alert))
        .route("/webhook/test", get(api::webhook::webhook_health))
        .with_state(state.clone());

    let protected_routes = AxumRouter::new()
        .route("/api/v1/funded-accounts/", get(api::funded::list_accounts))
        .route("/api/v1/funded-accounts/:id", get(api::funded::get_account))
        .route("/api/v1/funded-accounts/:id/metrics", get(api::funded::metrics))
        .route("/api/v1/funded-accounts/:id/flatten-positions", post(api::funded::flatten_positions))
        .route("/api/v1/funded-accounts/:id/pause", post(api::funded::pause))
        .route("/api/v1/funded-accounts/:id/resume", post(api::funded::resume))
        .route("/api/v1/funded-accounts/violations/", get(api::funded::list_violations))
        .route("/api/v1/funded-accounts/violations/:id/acknowledge", post(api::funded::acknowledge_violation))
        .route("/api/paper-trading/accounts", get(api::paper::list_accounts))
        .route("/api/paper-trading/accounts/:id", get(api::paper::get_account))
        .route("/api/paper-trading/accounts/:id/orders", get(api::paper::list_orders))
        .route("/api/paper-trading/accounts/:id/fills", get(api::paper::list_fills))
        .route("/api/paper-trading/accounts/:id/metrics", get(api::paper::metrics))
        .route("/api/paper-trading/accounts/:id/reset", post(api::paper::reset_account))
        .route("/api/paper-trading/accounts/:id/flatten", post(api::paper::flatten_account))
        .route("/api/paper-trading/alerts", post(api::paper::submit_alert))
        .route("/api/paper-trading/orders/:id/cancel", post(api::paper::cancel_order))
        .route("/api/strategies/summaries", get(api::strategies::summaries))
        .route("/api/strategies/alerts", get(api::strategies::list_alerts).delete(api::strategies::clear_alerts))
        .route("/api/strategies/register", post(api::strategies::register))
        .route("/api/strategies/:id", get(api::strategies::get_summary))
        .route("/api/strategies/:id/summary", get(api::strategies::get_summary))
        .route("/api/strategies/:id/sets", get(api::strategies::sets))
        .route("/api/strategies/:id/transitions", get(api::strategies::transitions))
        .route("/api/strategies/:id/mode", post(api::strategies::set_mode))
        .route("/ws", get(api::ws::ws_handler))
        .route_layer(axum_mw::from_fn_with_state(jwt_handler.clone(), auth_middleware))
        .route_layer(axum_mw::from_fn_with_state(rest_rate_limiter, rate_limit_middleware))
        .with_state(state.clone());

    let public_routes = AxumRouter::new()
        .route("/health", get(health_check))
        .with_state(state.clone());

    let app = AxumRouter::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(auth_router)
        .merge(webhook_routes)
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(crate::middleware::logging::request_logging_simple));

    let addr = config.bind_addr.clone();
    let listener = TcpListener::bind(&addr).await?;
    info!("tradegate listening on {}", addr);

    let shutdown_journal = state.journal.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let (Some(journal), Some(handle)) = (shutdown_journal, journal_handle) {
        journal.shutdown(handle, Duration::from_secs(10)).await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    warn!("shutdown signal received, draining in-flight work");
}

async fn health_check() -> &'static str {
    "ok"
}

fn resolve_data_path(env_value: Option<String>, default_filename: &str) -> String {
    let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) else {
        return default_filename.to_string();
    };
    let p = Path::new(&raw);
    if p.is_absolute() {
        return raw;
    }
    Path::new(env!("CARGO_MANIFEST_DIR")).join(p).to_string_lossy().to_string()
}

fn load_env() {
    let _ = dotenv();
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    for candidate in [manifest_dir.join(".env"), manifest_dir.join("../.env")] {
        if candidate.exists() {
            let _ = dotenv::from_path(&candidate);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradegate_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
