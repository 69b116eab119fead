//! Consumer-owned event batch.
//!
//! Events are kept together with the leases of the queue items they came
//! from. The batch is bounded by its capacity, is only cleared after a
//! successful flush, and hands back the leases to ack at that point.

use broker::Lease;
use types::event::Event;

/// Rejected push; the event and lease are handed back untouched.
#[derive(Debug)]
pub struct BatchFull {
    pub event: Event,
    pub lease: Lease,
}

#[derive(Debug)]
pub struct Batch {
    events: Vec<Event>,
    leases: Vec<Lease>,
    capacity: usize,
}

impl Batch {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Vec::with_capacity(capacity),
            leases: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: Event, lease: Lease) -> Result<(), BatchFull> {
        if self.is_full() {
            return Err(BatchFull { event, lease });
        }
        self.events.push(event);
        self.leases.push(lease);
        Ok(())
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Drop the events and return their leases for acking.
    pub fn clear(&mut self) -> Vec<Lease> {
        self.events.clear();
        std::mem::take(&mut self.leases)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::{MemoryQueue, WorkQueue};
    use proptest::prelude::*;
    use std::time::Duration;

    fn event(i: usize) -> Event {
        Event::parse_line(&format!(
            r#"{{"id":"{i}","type":"WatchEvent","actor":{{"login":"a"}},"repo":{{"name":"r/r"}},"created_at":"2024-01-01T15:00:00Z"}}"#
        ))
        .unwrap()
    }

    async fn leases(n: usize) -> Vec<Lease> {
        let queue = MemoryQueue::unbounded();
        let mut out = Vec::new();
        for i in 0..n {
            queue.push(&i.to_string()).await.unwrap();
            out.push(queue.pop(Duration::ZERO).await.unwrap().unwrap().lease);
        }
        out
    }

    #[tokio::test]
    async fn test_push_rejects_when_full() {
        let mut batch = Batch::new(2);
        let mut leases = leases(3).await.into_iter();

        batch.push(event(0), leases.next().unwrap()).unwrap();
        batch.push(event(1), leases.next().unwrap()).unwrap();
        let rejected = batch.push(event(2), leases.next().unwrap()).unwrap_err();

        assert_eq!(rejected.event.id.as_str(), "2");
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_returns_leases_in_order() {
        let mut batch = Batch::new(5);
        let all = leases(3).await;
        for (i, lease) in all.iter().enumerate() {
            batch.push(event(i), lease.clone()).unwrap();
        }

        assert_eq!(batch.clear(), all);
        assert!(batch.is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push,
        FlushOk,
        FlushFailed,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => Just(Op::Push),
            1 => Just(Op::FlushOk),
            1 => Just(Op::FlushFailed),
        ]
    }

    proptest! {
        #[test]
        fn prop_batch_never_exceeds_capacity(
            capacity in 1usize..20,
            ops in prop::collection::vec(op(), 0..200),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let pool = rt.block_on(leases(ops.len()));
            let mut pool = pool.into_iter();
            let mut batch = Batch::new(capacity);

            for (i, op) in ops.iter().enumerate() {
                match op {
                    Op::Push => {
                        let lease = pool.next().unwrap();
                        let was_full = batch.is_full();
                        let pushed = batch.push(event(i), lease).is_ok();
                        prop_assert_eq!(pushed, !was_full);
                    }
                    Op::FlushOk => {
                        let before = batch.len();
                        prop_assert_eq!(batch.clear().len(), before);
                        prop_assert!(batch.is_empty());
                    }
                    // A failed flush leaves the batch as it was.
                    Op::FlushFailed => {}
                }
                prop_assert!(batch.len() <= capacity);
            }
        }
    }
}
