//! Registry of connected live clients.
//!
//! Registration hands the socket task the receiving end of a bounded queue;
//! [`ClientHub::broadcast`] offers a frame to every registered queue without
//! waiting. Clients that must be disconnected are removed from the hub,
//! which closes their queue and ends their socket task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::backpressure::{ClientQueue, DropPolicy, Frame, Offer};
use crate::metrics::RealtimeMetrics;

/// Unique client identifier.
pub type ClientId = u64;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: u64,
    pub dropped: u64,
    pub disconnected: u64,
}

pub struct ClientHub {
    clients: DashMap<ClientId, ClientQueue>,
    next_id: AtomicU64,
    queue_capacity: usize,
    drop_policy: DropPolicy,
    metrics: Arc<RealtimeMetrics>,
}

impl ClientHub {
    pub fn new(queue_capacity: usize, drop_policy: DropPolicy, metrics: Arc<RealtimeMetrics>) -> Self {
        Self {
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_capacity,
            drop_policy,
            metrics,
        }
    }

    /// Add a client. It receives only frames broadcast after this call.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<Frame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (queue, rx) = ClientQueue::channel(self.queue_capacity, self.drop_policy);
        self.clients.insert(id, queue);
        self.metrics.record_connection();
        info!(client_id = id, total_clients = self.client_count(), "Client connected");
        (id, rx)
    }

    /// Remove a client. Safe to call for a client already removed.
    pub fn unregister(&self, id: ClientId) {
        if let Some((_, queue)) = self.clients.remove(&id) {
            info!(
                client_id = id,
                dropped = queue.dropped(),
                total_clients = self.client_count(),
                "Client disconnected"
            );
        }
    }

    pub fn broadcast(&self, frame: Frame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut lagging = Vec::new();

        for entry in self.clients.iter() {
            match entry.value().offer(Arc::clone(&frame)) {
                Offer::Queued => report.delivered += 1,
                Offer::Dropped => report.dropped += 1,
                Offer::Disconnect => lagging.push(*entry.key()),
            }
        }

        // Removing inside the iteration would deadlock on the shard lock.
        for id in lagging {
            if self.clients.remove(&id).is_some() {
                report.disconnected += 1;
                warn!(
                    client_id = id,
                    total_clients = self.client_count(),
                    "Backpressure: disconnecting lagging client"
                );
            }
        }

        self.metrics
            .record_relayed(report.delivered, report.dropped, report.disconnected);
        report
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_registered(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(capacity: usize, policy: DropPolicy) -> ClientHub {
        ClientHub::new(capacity, policy, Arc::new(RealtimeMetrics::new()))
    }

    #[test]
    fn test_registration_ids_unique() {
        let hub = hub(8, DropPolicy::DropNewest);
        let (a, _ra) = hub.register();
        let (b, _rb) = hub.register();
        assert_ne!(a, b);
        assert_eq!(hub.client_count(), 2);

        hub.unregister(a);
        hub.unregister(a);
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn test_each_client_gets_one_copy() {
        let hub = hub(8, DropPolicy::DropNewest);
        let (_, mut ra) = hub.register();
        let (_, mut rb) = hub.register();

        let report = hub.broadcast(Arc::from("E"));
        assert_eq!(report.delivered, 2);

        assert_eq!(&*ra.try_recv().unwrap(), "E");
        assert_eq!(&*rb.try_recv().unwrap(), "E");
        assert!(ra.try_recv().is_err());
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn test_slow_client_does_not_affect_others() {
        let hub = hub(1, DropPolicy::DropNewest);
        let (_, _slow) = hub.register();
        let (_, mut fast) = hub.register();

        hub.broadcast(Arc::from("1"));
        assert_eq!(&*fast.try_recv().unwrap(), "1");

        let report = hub.broadcast(Arc::from("2"));
        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 1, disconnected: 0 });
        assert_eq!(&*fast.try_recv().unwrap(), "2");
    }

    #[test]
    fn test_lagging_client_disconnected_under_disconnect_policy() {
        let hub = hub(1, DropPolicy::Disconnect);
        let (slow, mut slow_rx) = hub.register();

        hub.broadcast(Arc::from("1"));
        let report = hub.broadcast(Arc::from("2"));
        assert_eq!(report.disconnected, 1);
        assert!(!hub.is_registered(slow));

        // Already queued frame is still readable, then the queue ends
        assert_eq!(&*slow_rx.try_recv().unwrap(), "1");
        assert!(matches!(
            slow_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_broadcast_without_clients_is_noop() {
        let hub = hub(4, DropPolicy::DropNewest);
        assert_eq!(hub.broadcast(Arc::from("x")), BroadcastReport::default());
    }
}
