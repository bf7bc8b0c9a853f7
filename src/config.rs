//! Process configuration (ambient A1), loaded once at startup.

use std::env;

/// Per-broker credential resolution: vault namespace/key, with an optional
/// environment-variable fallback name (§4.3's precedence: vault → env → default).
#[derive(Debug, Clone)]
pub struct BrokerCredentialConfig {
    pub broker_key: String,
    pub env_fallback: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,

    pub webhook_secret: Option<String>,
    pub webhook_rate_limit_max: u32,
    pub webhook_rate_limit_window_secs: u64,

    pub orchestrator_deadline_secs: u64,

    pub journal_base_url: Option<String>,
    pub journal_app_id: String,
    pub journal_master_key: String,
    pub journal_enabled: bool,
    pub journal_timeout_secs: u64,
    pub journal_retries: u32,
    pub journal_broker_name: String,
    pub journal_upload_mfe: bool,
    pub journal_batch_size: usize,
    pub journal_flush_interval_secs: u64,

    pub strategy_set_size: u32,
    pub strategy_rotation_k: u32,
    pub strategy_min_win_rate: f64,
    pub strategy_persist: bool,

    pub paper_test_mode: bool,
    pub exchange_timezone: String,

    pub vault_file_path: String,

    pub broker_credentials: Vec<BrokerCredentialConfig>,
}

fn env_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            bind_addr: env_var("TRADEGATE_BIND_ADDR", "0.0.0.0:8080"),

            webhook_secret: env::var("TRADINGVIEW_WEBHOOK_SECRET").ok(),
            webhook_rate_limit_max: env_parse("WEBHOOK_RATE_LIMIT_MAX", 50),
            webhook_rate_limit_window_secs: env_parse("WEBHOOK_RATE_LIMIT_WINDOW_SECS", 60),

            orchestrator_deadline_secs: env_parse("ORCHESTRATOR_DEADLINE_SECS", 10),

            journal_base_url: env::var("JOURNAL_BASE_URL").ok(),
            journal_app_id: env_var("JOURNAL_APP_ID", ""),
            journal_master_key: env_var("JOURNAL_MASTER_KEY", ""),
            journal_enabled: env_bool("JOURNAL_ENABLED", false),
            journal_timeout_secs: env_parse("JOURNAL_TIMEOUT", 10),
            journal_retries: env_parse("JOURNAL_RETRIES", 3),
            journal_broker_name: env_var("JOURNAL_BROKER_NAME", "tradegate"),
            journal_upload_mfe: env_bool("JOURNAL_UPLOAD_MFE", false),
            journal_batch_size: env_parse("JOURNAL_BATCH_SIZE", 10),
            journal_flush_interval_secs: env_parse("JOURNAL_FLUSH_INTERVAL_SECS", 30),

            strategy_set_size: env_parse("STRATEGY_SET_SIZE", 20),
            strategy_rotation_k: env_parse("STRATEGY_ROTATION_K", 2),
            strategy_min_win_rate: env_parse("STRATEGY_MIN_WIN_RATE", 55.0),
            strategy_persist: env_bool("STRATEGY_PERSIST", false),

            paper_test_mode: env_bool("PAPER_TEST_MODE", false),
            exchange_timezone: env_var("EXCHANGE_TIMEZONE", "America/New_York"),

            vault_file_path: env_var("VAULT_FILE_PATH", "./tradegate_vault.enc"),

            broker_credentials: vec![
                BrokerCredentialConfig { broker_key: "tastytrade_sandbox".into(), env_fallback: Some("TASTYTRADE_SANDBOX_TOKEN".into()) },
                BrokerCredentialConfig { broker_key: "tradovate_demo".into(), env_fallback: Some("TRADOVATE_DEMO_TOKEN".into()) },
                BrokerCredentialConfig { broker_key: "alpaca_paper".into(), env_fallback: Some("ALPACA_PAPER_TOKEN".into()) },
                BrokerCredentialConfig { broker_key: "topstep".into(), env_fallback: Some("TOPSTEP_API_TOKEN".into()) },
                BrokerCredentialConfig { broker_key: "apex".into(), env_fallback: Some("APEX_API_TOKEN".into()) },
                BrokerCredentialConfig { broker_key: "tradeday".into(), env_fallback: Some("TRADEDAY_API_TOKEN".into()) },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_when_unset() {
        env::remove_var("STRATEGY_SET_SIZE");
        let cfg = Config::from_env();
        assert_eq!(cfg.strategy_set_size, 20);
        assert_eq!(cfg.strategy_rotation_k, 2);
        assert_eq!(cfg.webhook_rate_limit_max, 50);
    }
}
