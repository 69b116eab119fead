//! Per-client outbound queues.
//!
//! Every live client gets a bounded queue between the relay and its socket
//! writer. Offering a message never waits: when a client's queue is full the
//! drop policy decides whether that client loses this message or the
//! connection. Other clients are unaffected either way.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Framed message shared by every client it is sent to.
pub type Frame = Arc<str>;

/// What to do when a client's outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropPolicy {
    /// Disconnect the lagging client.
    Disconnect,
    /// Skip this message for the lagging client only.
    DropNewest,
}

impl FromStr for DropPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "disconnect" => Ok(DropPolicy::Disconnect),
            "drop-newest" | "drop" => Ok(DropPolicy::DropNewest),
            other => Err(format!("unknown drop policy: {other}")),
        }
    }
}

/// Result of offering one message to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Queue full, message skipped for this client.
    Dropped,
    /// Queue full under [`DropPolicy::Disconnect`], or the client is gone.
    Disconnect,
}

/// Sending half of a client's outbound queue.
#[derive(Debug)]
pub struct ClientQueue {
    tx: mpsc::Sender<Frame>,
    policy: DropPolicy,
    dropped: AtomicU64,
}

impl ClientQueue {
    /// Create the queue; the receiver goes to the socket writer.
    pub fn channel(capacity: usize, policy: DropPolicy) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                policy,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn offer(&self, frame: Frame) -> Offer {
        match self.tx.try_send(frame) {
            Ok(()) => Offer::Queued,
            Err(TrySendError::Closed(_)) => Offer::Disconnect,
            Err(TrySendError::Full(_)) => match self.policy {
                DropPolicy::Disconnect => Offer::Disconnect,
                DropPolicy::DropNewest => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    Offer::Dropped
                }
            },
        }
    }

    /// Messages skipped for this client so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Messages waiting to be written.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Frame {
        Arc::from(s)
    }

    #[test]
    fn test_drop_newest_keeps_queued_messages() {
        let (queue, mut rx) = ClientQueue::channel(2, DropPolicy::DropNewest);

        assert_eq!(queue.offer(frame("a")), Offer::Queued);
        assert_eq!(queue.offer(frame("b")), Offer::Queued);
        assert_eq!(queue.offer(frame("c")), Offer::Dropped);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.len(), 2);

        assert_eq!(&*rx.try_recv().unwrap(), "a");
        assert_eq!(&*rx.try_recv().unwrap(), "b");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_policy_on_overflow() {
        let (queue, _rx) = ClientQueue::channel(1, DropPolicy::Disconnect);
        assert_eq!(queue.offer(frame("a")), Offer::Queued);
        assert_eq!(queue.offer(frame("b")), Offer::Disconnect);
    }

    #[test]
    fn test_closed_receiver_means_disconnect() {
        let (queue, rx) = ClientQueue::channel(4, DropPolicy::DropNewest);
        drop(rx);
        assert_eq!(queue.offer(frame("a")), Offer::Disconnect);
    }

    #[test]
    fn test_parse_drop_policy() {
        assert_eq!("disconnect".parse::<DropPolicy>(), Ok(DropPolicy::Disconnect));
        assert_eq!("DROP_NEWEST".parse::<DropPolicy>(), Ok(DropPolicy::DropNewest));
        assert!("drop-oldest".parse::<DropPolicy>().is_err());
    }
}
