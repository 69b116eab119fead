//! Batch consumer state machine.
//!
//! ```text
//!   ┌──────────────┐ batch full / interval due / shutdown ┌──────────┐
//!   │ Accumulating ├──────────────────────────────────────►│ Flushing │
//!   └──────▲───────┘                                       └────┬─────┘
//!          │ stored (or duplicates only): ack + clear           │
//!          ├────────────────────────────────────────────────────┤
//!          │                     other failure: keep batch      │
//!          │                ┌──────────┐                        │
//!          └────────────────┤ Backoff  │◄───────────────────────┘
//!             retry flush   └──────────┘
//! ```
//!
//! Nothing is popped while a failed batch is waiting for its retry, so the
//! batch never grows past `batch_size` and is retried exactly as it was.
//! Leases are acked only after the batch is durable; a crash before that
//! leaves the items to be redelivered.

use std::sync::Arc;
use std::time::Duration;

use broker::{Delivery, WorkQueue};
use common::{sleep_or_cancelled, RetryBudget};
use store::{EventStore, InsertOutcome};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use types::event::Event;

use crate::batch::Batch;
use crate::config::ConsumerConfig;
use crate::error::ConsumerError;
use crate::metrics::ConsumerMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Accumulating,
    Flushing,
    /// A flush failed; the batch is held until `retry_at`.
    Backoff,
    Stopped,
}

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushResult {
    /// Nothing to write.
    Empty,
    /// Batch stored and acked.
    Stored { inserted: usize, duplicates: usize },
    /// Batch kept for a retry after `retry_in`.
    Retained { retry_in: Duration },
}

pub struct BatchConsumer {
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn EventStore>,
    config: ConsumerConfig,
    metrics: Arc<ConsumerMetrics>,
    batch: Batch,
    state: ConsumerState,
    flush_budget: RetryBudget,
    pop_budget: RetryBudget,
    last_flush: Instant,
    retry_at: Option<Instant>,
}

impl BatchConsumer {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn EventStore>,
        config: ConsumerConfig,
        metrics: Arc<ConsumerMetrics>,
    ) -> Self {
        info!(
            batch_size = config.batch_size,
            flush_interval_ms = config.flush_interval.map(|d| d.as_millis() as u64),
            "BatchConsumer initialized"
        );
        Self {
            batch: Batch::new(config.batch_size),
            flush_budget: RetryBudget::new(config.flush_retry),
            pop_budget: RetryBudget::new(config.pop_retry),
            queue,
            store,
            config,
            metrics,
            state: ConsumerState::Accumulating,
            last_flush: Instant::now(),
            retry_at: None,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// Run until `cancel` fires, then flush once and stop.
    ///
    /// Returns an error only when a retry budget is exhausted; the batch
    /// then stays un-acked.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<(), ConsumerError> {
        info!("Consumer service running");

        while !cancel.is_cancelled() {
            if let Some(retry_at) = self.retry_at {
                let wait = retry_at.saturating_duration_since(Instant::now());
                if sleep_or_cancelled(wait, cancel).await {
                    break;
                }
                self.flush().await?;
                continue;
            }

            if self.flush_due() {
                self.flush().await?;
                continue;
            }

            let timeout = self.pop_timeout();
            let popped = tokio::select! {
                _ = cancel.cancelled() => break,
                popped = self.queue.pop(timeout) => popped,
            };

            match popped {
                Ok(Some(delivery)) => {
                    self.pop_budget.record_success();
                    self.accept(delivery).await;
                }
                Ok(None) => self.pop_budget.record_success(),
                Err(e) => {
                    let delay = self.pop_budget.record_failure().map_err(|exhausted| {
                        ConsumerError::RetryBudgetExhausted {
                            operation: "queue pop",
                            attempts: exhausted.attempts,
                        }
                    })?;
                    error!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Consumer error"
                    );
                    if sleep_or_cancelled(delay, cancel).await {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Decode one queue item into the batch. Undecodable items are acked
    /// and dropped so they are not redelivered forever.
    async fn accept(&mut self, delivery: Delivery) {
        self.metrics.record_popped();

        let event = match Event::parse_line(&delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                self.metrics.record_poison();
                warn!(error = %e, lease = delivery.lease.id(), "Dropping undecodable queue item");
                if let Err(e) = self.queue.ack(&delivery.lease).await {
                    self.metrics.record_ack_failure();
                    warn!(error = %e, "Ack of undecodable item failed");
                }
                return;
            }
        };

        if let Err(full) = self.batch.push(event, delivery.lease) {
            // The loop never pops into a full batch.
            error!(
                event_id = %full.event.id,
                capacity = self.batch.capacity(),
                "Batch full, item left for redelivery"
            );
            return;
        }
        self.metrics.set_buffer_size(self.batch.len());
    }

    fn flush_due(&self) -> bool {
        if self.batch.is_full() {
            return true;
        }
        match self.config.flush_interval {
            Some(interval) => !self.batch.is_empty() && self.last_flush.elapsed() >= interval,
            None => false,
        }
    }

    /// Pop wait, shortened so a pending interval flush is not delayed.
    fn pop_timeout(&self) -> Duration {
        match self.config.flush_interval {
            Some(interval) if !self.batch.is_empty() => {
                let left = interval.saturating_sub(self.last_flush.elapsed());
                self.config.pop_timeout.min(left.max(Duration::from_millis(1)))
            }
            _ => self.config.pop_timeout,
        }
    }

    /// Write the batch to the store.
    ///
    /// Success and duplicate-only outcomes ack every lease and clear the
    /// batch. Any other failure keeps the batch untouched and schedules a
    /// retry; exhausting the retry budget is fatal.
    pub async fn flush(&mut self) -> Result<FlushResult, ConsumerError> {
        self.retry_at = None;
        if self.batch.is_empty() {
            self.last_flush = Instant::now();
            return Ok(FlushResult::Empty);
        }

        self.state = ConsumerState::Flushing;
        let started = Instant::now();
        let count = self.batch.len();

        let failure = match self.store.insert_many(self.batch.events()).await {
            Ok(report) => match report.outcome() {
                InsertOutcome::AllInserted | InsertOutcome::DuplicatesSkipped => {
                    if report.duplicates > 0 {
                        warn!(
                            count,
                            duplicates = report.duplicates,
                            "Some duplicate events skipped"
                        );
                    }
                    info!(count = report.inserted, "Inserted events");

                    self.ack_batch().await;
                    self.flush_budget.record_success();
                    self.metrics.record_flush(
                        report.inserted as u64,
                        report.duplicates as u64,
                        started.elapsed().as_millis() as u64,
                    );
                    self.last_flush = Instant::now();
                    self.state = ConsumerState::Accumulating;
                    return Ok(FlushResult::Stored {
                        inserted: report.inserted,
                        duplicates: report.duplicates,
                    });
                }
                InsertOutcome::Failed => {
                    let first = report
                        .failures
                        .first()
                        .map(|f| format!("{}: {}", f.id, f.reason))
                        .unwrap_or_default();
                    format!("{} of {} documents failed ({})", report.failures.len(), count, first)
                }
            },
            Err(e) => e.to_string(),
        };

        self.metrics.record_flush_failure();
        let retry_in = match self.flush_budget.record_failure() {
            Ok(delay) => delay,
            Err(exhausted) => {
                self.state = ConsumerState::Stopped;
                error!(
                    error = %failure,
                    attempts = exhausted.attempts,
                    batch = count,
                    "Insert failed, retry budget exhausted"
                );
                return Err(ConsumerError::RetryBudgetExhausted {
                    operation: "batch insert",
                    attempts: exhausted.attempts,
                });
            }
        };

        error!(
            error = %failure,
            batch = count,
            attempt = self.flush_budget.consecutive_failures(),
            retry_in_ms = retry_in.as_millis() as u64,
            "Insert failed, batch kept for retry"
        );
        self.retry_at = Some(Instant::now() + retry_in);
        self.state = ConsumerState::Backoff;
        Ok(FlushResult::Retained { retry_in })
    }

    async fn ack_batch(&mut self) {
        for lease in self.batch.clear() {
            if let Err(e) = self.queue.ack(&lease).await {
                self.metrics.record_ack_failure();
                warn!(error = %e, lease = lease.id(), "Ack failed, item may be redelivered");
            }
        }
        self.metrics.set_buffer_size(0);
    }

    /// One final flush attempt. A failure leaves the leases un-acked.
    async fn shutdown(&mut self) {
        info!(buffered = self.batch.len(), "Consumer shutting down...");
        match self.flush().await {
            Ok(FlushResult::Retained { .. }) | Err(_) => {
                warn!(
                    buffered = self.batch.len(),
                    "Final flush failed, un-acked items will be redelivered"
                );
            }
            Ok(_) => {}
        }
        self.state = ConsumerState::Stopped;
        debug!(metrics = ?self.metrics.export(), "Final consumer counters");
        info!("Consumer shutdown complete");
    }
}
