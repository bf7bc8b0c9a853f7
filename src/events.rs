//! In-process event bus and push-transport subscription filtering (C11 §4.11, §6.4).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::models::DomainEvent;

const DEFAULT_BUFFER: usize = 1024;
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Topic-keyed, non-blocking pub/sub. `tokio::sync::broadcast` already gives
/// every subscriber its own bounded lagging buffer; a lagged receiver sees
/// `RecvError::Lagged(n)` which `Subscription::recv` turns into a dropped-count.
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
    dropped_total: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BUFFER);
        Self { tx, dropped_total: Arc::new(AtomicU64::new(0)) }
    }

    pub fn sender(&self) -> broadcast::Sender<DomainEvent> {
        self.tx.clone()
    }

    pub fn publish(&self, event: DomainEvent) {
        // A send with no subscribers is not an error; it simply means nobody's listening.
        let _ = self.tx.send(event);
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        Subscription { rx: self.tx.subscribe(), filter, dropped_total: self.dropped_total.clone() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-subscriber filter, set by the client's `subscribe` WS message (§6.4).
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub symbols: Option<Vec<String>>,
    pub account_ids: Option<Vec<String>>,
    pub event_kinds: Option<Vec<String>>,
}

impl SubscriptionFilter {
    fn matches(&self, event: &DomainEvent) -> bool {
        if let Some(kinds) = &self.event_kinds {
            if !kinds.iter().any(|k| k == event.kind()) {
                return false;
            }
        }
        if let Some(account_ids) = &self.account_ids {
            match event.account_id() {
                Some(id) if account_ids.iter().any(|a| a == id) => {}
                Some(_) => return false,
                None => {}
            }
        }
        if let Some(symbols) = &self.symbols {
            if let DomainEvent::QuoteUpdate { symbol, .. } = event {
                if !symbols.iter().any(|s| s == symbol) {
                    return false;
                }
            }
        }
        true
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<DomainEvent>,
    filter: SubscriptionFilter,
    dropped_total: Arc<AtomicU64>,
}

impl Subscription {
    /// Returns the next event matching this subscription's filter, skipping
    /// non-matching events; surfaces lag by incrementing the shared dropped
    /// counter and continuing rather than terminating the subscription.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped_total.fetch_add(n, Ordering::Relaxed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn set_filter(&mut self, filter: SubscriptionFilter) {
        self.filter = filter;
    }
}

pub fn heartbeat() -> DomainEvent {
    DomainEvent::Heartbeat { timestamp: Utc::now() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(SubscriptionFilter::default());
        bus.publish(DomainEvent::OrderAccepted {
            alert_id: "a1".into(),
            order_id: "o1".into(),
            account_id: "acc1".into(),
        });
        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind(), "order_accepted");
    }

    #[tokio::test]
    async fn filter_excludes_other_accounts() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(SubscriptionFilter { account_ids: Some(vec!["acc1".into()]), ..Default::default() });
        bus.publish(DomainEvent::OrderAccepted { alert_id: "a1".into(), order_id: "o1".into(), account_id: "acc2".into() });
        bus.publish(DomainEvent::OrderAccepted { alert_id: "a2".into(), order_id: "o2".into(), account_id: "acc1".into() });
        let event = sub.recv().await.unwrap();
        assert_eq!(event.account_id(), Some("acc1"));
    }

    #[tokio::test]
    async fn filter_by_event_kind() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(SubscriptionFilter { event_kinds: Some(vec!["heartbeat".into()]), ..Default::default() });
        bus.publish(DomainEvent::OrderAccepted { alert_id: "a1".into(), order_id: "o1".into(), account_id: "acc1".into() });
        bus.publish(heartbeat());
        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind(), "heartbeat");
    }
}
