use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Broadcaster counters.
#[derive(Default)]
pub struct RealtimeMetrics {
    pub messages_received: AtomicU64,
    pub messages_relayed: AtomicU64,
    pub invalid_messages: AtomicU64,
    pub deliveries: AtomicU64,
    pub backpressure_drops: AtomicU64,
    pub lagging_disconnects: AtomicU64,
    pub connections_total: AtomicU64,
    pub resubscribes: AtomicU64,
}

impl RealtimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relayed(&self, deliveries: u64, drops: u64, disconnects: u64) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(deliveries, Ordering::Relaxed);
        self.backpressure_drops.fetch_add(drops, Ordering::Relaxed);
        self.lagging_disconnects.fetch_add(disconnects, Ordering::Relaxed);
    }

    pub fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resubscribe(&self) {
        self.resubscribes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn export(&self) -> BTreeMap<&'static str, u64> {
        let mut m = BTreeMap::new();
        m.insert("messages_received", self.messages_received.load(Ordering::Relaxed));
        m.insert("messages_relayed", self.messages_relayed.load(Ordering::Relaxed));
        m.insert("invalid_messages", self.invalid_messages.load(Ordering::Relaxed));
        m.insert("deliveries", self.deliveries.load(Ordering::Relaxed));
        m.insert("backpressure_drops", self.backpressure_drops.load(Ordering::Relaxed));
        m.insert("lagging_disconnects", self.lagging_disconnects.load(Ordering::Relaxed));
        m.insert("connections_total", self.connections_total.load(Ordering::Relaxed));
        m.insert("resubscribes", self.resubscribes.load(Ordering::Relaxed));
        m
    }
}
