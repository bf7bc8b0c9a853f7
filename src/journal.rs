//! Journal-upload client (C10 §4.10, §6.5): batches fills to an external
//! trade-journal service with bounded queueing, backoff retry, and
//! per-process trade_id dedup.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{Action, Fill, JournalAssetType, JournalTradeRecord, JournalUploadPayload, PendingTrade};

const MAX_QUEUE_DEPTH: usize = 10_000;
const MAX_ATTEMPTS: u32 = 3;

fn asset_type_for(symbol: &str) -> JournalAssetType {
    match crate::symbols::classify(symbol) {
        crate::models::AssetKind::Future => JournalAssetType::Future,
        crate::models::AssetKind::Option => JournalAssetType::Option,
        crate::models::AssetKind::Crypto => JournalAssetType::Crypto,
        crate::models::AssetKind::Forex => JournalAssetType::Forex,
        crate::models::AssetKind::Stock => JournalAssetType::Stock,
    }
}

/// Maps a fill to the §6.5 journal row. `net_proceeds` is positive on a
/// closing sell and negative on an opening buy, net of commission and the
/// absolute slippage paid.
pub fn fill_to_record(fill: &Fill, account_label: &str, is_paper: bool, strategy: Option<&str>) -> JournalTradeRecord {
    let date = fill.timestamp.format("%m/%d/%Y").to_string();
    let time = fill.timestamp.format("%H:%M:%S").to_string();
    let gross: Decimal = fill.price * Decimal::from(fill.quantity);
    let signed_gross = match fill.side {
        Action::Buy => -gross,
        Action::Sell | Action::Close => gross,
    };
    let fees = fill.commission + fill.fees;
    let net_proceeds = signed_gross - fees - fill.slippage.abs();

    JournalTradeRecord {
        account: account_label.to_string(),
        trade_date: date.clone(),
        settlement_date: date,
        currency: "USD".to_string(),
        asset_type: asset_type_for(&fill.symbol).as_str().to_string(),
        side: match fill.side {
            Action::Buy => "Buy".to_string(),
            Action::Sell => "Sell".to_string(),
            Action::Close => "Close".to_string(),
        },
        symbol: fill.symbol.clone(),
        qty: fill.quantity,
        price: fill.price,
        exec_time: time,
        gross_proceeds: signed_gross,
        commissions_and_fees: fees,
        net_proceeds,
        expiration_date: None,
        strike: None,
        strategy: strategy.map(str::to_string),
        notes: None,
        tags: None,
        paper_trade: if is_paper { "Yes".to_string() } else { "No".to_string() },
        trade_id: fill.id.clone(),
    }
}

enum QueueItem {
    Trade(PendingTrade),
    Shutdown,
}

/// Bounded FIFO upload queue with batching, backoff retry, and dedup.
/// `enqueue` is non-blocking; the background task performs all network IO.
pub struct JournalClient {
    tx: mpsc::Sender<QueueItem>,
    seen: Arc<Mutex<HashSet<String>>>,
    enabled: bool,
}

impl JournalClient {
    pub fn new(config: Arc<Config>) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(MAX_QUEUE_DEPTH);
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let worker_seen = seen.clone();
        let handle = tokio::spawn(run_worker(config.clone(), rx, worker_seen));
        (Self { tx, seen, enabled: config.journal_enabled }, handle)
    }

    /// §4.10: enqueues a trade for upload, deduping on `trade_id` for the
    /// lifetime of the process. Returns `false` if dropped (duplicate, or
    /// disabled).
    pub fn enqueue(&self, record: JournalTradeRecord) -> bool {
        if !self.enabled {
            return false;
        }
        {
            let mut seen = self.seen.lock();
            if !seen.insert(record.trade_id.clone()) {
                return false;
            }
        }
        let pending = PendingTrade { trade_id: record.trade_id.clone(), record, enqueued_at: Utc::now() };
        match self.tx.try_send(QueueItem::Trade(pending)) {
            Ok(()) => true,
            Err(_) => {
                warn!("journal queue full, dropping trade");
                false
            }
        }
    }

    /// Drains the queue with a deadline, for graceful shutdown (§5).
    pub async fn shutdown(&self, handle: tokio::task::JoinHandle<()>, deadline: Duration) {
        let _ = self.tx.send(QueueItem::Shutdown).await;
        if timeout(deadline, handle).await.is_err() {
            warn!("journal client did not drain within shutdown deadline");
        }
    }
}

async fn run_worker(config: Arc<Config>, mut rx: mpsc::Receiver<QueueItem>, _seen: Arc<Mutex<HashSet<String>>>) {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.journal_timeout_secs))
        .build()
        .expect("reqwest client");

    let mut batch: Vec<PendingTrade> = Vec::with_capacity(config.journal_batch_size);
    let flush_interval = Duration::from_secs(config.journal_flush_interval_secs);
    let mut ticker = tokio::time::interval(flush_interval);
    let mut shutting_down = false;

    loop {
        tokio::select! {
            item = rx.recv() => {
                match item {
                    Some(QueueItem::Trade(trade)) => {
                        batch.push(trade);
                        if batch.len() >= config.journal_batch_size {
                            flush(&http, &config, &mut batch).await;
                        }
                    }
                    Some(QueueItem::Shutdown) | None => {
                        shutting_down = true;
                    }
                }
            }
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(&http, &config, &mut batch).await;
                }
            }
        }

        if shutting_down {
            if !batch.is_empty() {
                flush(&http, &config, &mut batch).await;
            }
            break;
        }
    }
}

async fn flush(http: &reqwest::Client, config: &Config, batch: &mut Vec<PendingTrade>) {
    let Some(base_url) = &config.journal_base_url else {
        batch.clear();
        return;
    };
    let records: Vec<JournalTradeRecord> = batch.iter().map(|p| p.record.clone()).collect();
    let payload = JournalUploadPayload {
        data: records,
        selected_broker: config.journal_broker_name.clone(),
        upload_mfe_prices: config.journal_upload_mfe,
        app_id: config.journal_app_id.clone(),
        master_key: config.journal_master_key.clone(),
    };

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let result = http.post(format!("{base_url}/api/trades/upload")).json(&payload).send().await;
        match result {
            Ok(response) if response.status().is_success() => {
                info!(trades = batch.len(), "journal batch uploaded");
                batch.clear();
                return;
            }
            Ok(response) => {
                warn!(status = %response.status(), attempt, "journal upload rejected");
            }
            Err(e) => {
                warn!(error = %e, attempt, "journal upload failed");
            }
        }

        if attempt >= MAX_ATTEMPTS {
            error!(trades = batch.len(), attempt, "journal upload exhausted retries, dropping batch");
            batch.clear();
            return;
        }
        let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
        tokio::time::sleep(backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn fill() -> Fill {
        Fill {
            id: "fill_1".into(),
            order_id: "ord_1".into(),
            account_id: "acc1".into(),
            symbol: "ES".into(),
            side: Action::Sell,
            quantity: 1,
            price: dec!(5010),
            commission: dec!(2.25),
            fees: dec!(0),
            slippage: dec!(0.5),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 15, 14, 30, 0).unwrap(),
            broker_key: "simulator".into(),
        }
    }

    #[test]
    fn maps_sell_fill_to_positive_net_proceeds() {
        let record = fill_to_record(&fill(), "acc1", true, Some("momentum"));
        assert_eq!(record.trade_date, "01/15/2026");
        assert_eq!(record.exec_time, "14:30:00");
        assert_eq!(record.gross_proceeds, dec!(5010));
        assert_eq!(record.net_proceeds, dec!(5010) - dec!(2.25) - dec!(0.5));
        assert_eq!(record.paper_trade, "Yes");
    }

    #[test]
    fn maps_buy_fill_to_negative_gross_proceeds() {
        let mut f = fill();
        f.side = Action::Buy;
        let record = fill_to_record(&f, "acc1", false, None);
        assert_eq!(record.gross_proceeds, dec!(-5010));
        assert_eq!(record.paper_trade, "No");
    }
}
