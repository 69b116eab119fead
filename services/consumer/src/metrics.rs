//! Consumer counters.
//!
//! Shared between the consumer task (writer) and the health endpoint
//! (reader). Flush latency keeps a sliding window of samples.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct ConsumerMetrics {
    // Queue side
    pub items_popped: AtomicU64,
    pub poison_items: AtomicU64,
    pub ack_failures: AtomicU64,

    // Store side
    pub events_inserted: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub flushes: AtomicU64,
    pub flush_failures: AtomicU64,
    pub flush_latency_ms: Mutex<LatencyWindow>,

    /// Events currently held in the batch.
    pub buffer_size: AtomicU64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self {
            items_popped: AtomicU64::new(0),
            poison_items: AtomicU64::new(0),
            ack_failures: AtomicU64::new(0),
            events_inserted: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
            flush_latency_ms: Mutex::new(LatencyWindow::new(256)),
            buffer_size: AtomicU64::new(0),
        }
    }

    pub fn record_popped(&self) {
        self.items_popped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poison(&self) {
        self.poison_items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack_failure(&self) {
        self.ack_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flush whose batch is now durable.
    pub fn record_flush(&self, inserted: u64, duplicates: u64, latency_ms: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.events_inserted.fetch_add(inserted, Ordering::Relaxed);
        self.duplicates_skipped.fetch_add(duplicates, Ordering::Relaxed);
        if let Ok(mut window) = self.flush_latency_ms.lock() {
            window.record(latency_ms);
        }
    }

    pub fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_buffer_size(&self, size: usize) {
        self.buffer_size.store(size as u64, Ordering::Relaxed);
    }

    pub fn buffer_size(&self) -> u64 {
        self.buffer_size.load(Ordering::Relaxed)
    }

    /// All counters by name.
    pub fn export(&self) -> BTreeMap<&'static str, u64> {
        let mut m = BTreeMap::new();
        m.insert("items_popped", self.items_popped.load(Ordering::Relaxed));
        m.insert("poison_items", self.poison_items.load(Ordering::Relaxed));
        m.insert("ack_failures", self.ack_failures.load(Ordering::Relaxed));
        m.insert("events_inserted", self.events_inserted.load(Ordering::Relaxed));
        m.insert("duplicates_skipped", self.duplicates_skipped.load(Ordering::Relaxed));
        m.insert("flushes", self.flushes.load(Ordering::Relaxed));
        m.insert("flush_failures", self.flush_failures.load(Ordering::Relaxed));
        m.insert("buffer_size", self.buffer_size());
        if let Ok(window) = self.flush_latency_ms.lock() {
            if let Some(p99) = window.percentile(99) {
                m.insert("flush_latency_p99_ms", p99);
            }
        }
        m
    }
}

impl Default for ConsumerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Sliding window of latency samples.
pub struct LatencyWindow {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyWindow {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Percentile (0-100) over the current window.
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_counters() {
        let metrics = ConsumerMetrics::new();
        metrics.record_flush(498, 2, 12);
        metrics.record_flush(500, 0, 8);
        metrics.record_flush_failure();

        let exported = metrics.export();
        assert_eq!(exported["flushes"], 2);
        assert_eq!(exported["events_inserted"], 998);
        assert_eq!(exported["duplicates_skipped"], 2);
        assert_eq!(exported["flush_failures"], 1);
        assert_eq!(exported["flush_latency_p99_ms"], 12);
    }

    #[test]
    fn test_latency_window_evicts_oldest() {
        let mut window = LatencyWindow::new(3);
        for v in [100, 1, 2, 3] {
            window.record(v);
        }
        assert_eq!(window.percentile(100), Some(3));
        assert_eq!(window.percentile(0), Some(1));
    }
}
