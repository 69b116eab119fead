//! Ingest producer.
//!
//! For every parsed feed line the producer first pushes the event onto the
//! durable queue and only then publishes it on the fan-out channel. Parse
//! failures are counted and skipped. A failing feed stream ends the run; the
//! counters gathered so far are still reported.

use std::fmt;
use std::sync::Arc;

use broker::{BrokerError, Publisher, WorkQueue};
use common::{sleep_or_cancelled, RetryBudget};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use types::event::Event;

use crate::config::IngestConfig;
use crate::decoder::{DecodedLine, LineDecoder};
use crate::error::IngestError;

/// Counters for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Non-blank lines read from the feed.
    pub lines: u64,
    /// Events pushed onto the durable queue.
    pub queued: u64,
    /// Lines that did not parse as an event.
    pub parse_errors: u64,
    /// Events that were queued but could not be published for live viewers.
    pub publish_errors: u64,
    /// Pushes that had to wait for queue space.
    pub full_waits: u64,
}

impl IngestReport {
    /// Share of lines that made it onto the queue, in percent.
    pub fn success_rate(&self) -> f64 {
        let seen = self.queued + self.parse_errors;
        if seen == 0 {
            return 0.0;
        }
        self.queued as f64 / seen as f64 * 100.0
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} errors={} successRate={:.2}%",
            self.queued,
            self.parse_errors,
            self.success_rate()
        )
    }
}

/// Why a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The feed was read to the end.
    Completed(IngestReport),
    /// Shutdown was requested before the feed ended.
    Cancelled(IngestReport),
}

impl RunOutcome {
    pub fn report(&self) -> &IngestReport {
        match self {
            RunOutcome::Completed(r) | RunOutcome::Cancelled(r) => r,
        }
    }
}

/// A failed run with the counters reached before the failure.
#[derive(Debug)]
pub struct RunFailure {
    pub error: IngestError,
    pub report: IngestReport,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.report)
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub struct Producer {
    queue: Arc<dyn WorkQueue>,
    publisher: Arc<dyn Publisher>,
    config: IngestConfig,
}

impl Producer {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        publisher: Arc<dyn Publisher>,
        config: IngestConfig,
    ) -> Self {
        Self {
            queue,
            publisher,
            config,
        }
    }

    /// Consume a compressed feed body until it ends, fails or `cancel` fires.
    pub async fn run<S, B>(
        &self,
        body: S,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunFailure>
    where
        S: Stream<Item = Result<B, IngestError>>,
        B: AsRef<[u8]>,
    {
        let mut report = IngestReport::default();
        let mut decoder = LineDecoder::new();
        let mut push_budget = RetryBudget::new(self.config.push_retry);
        futures::pin_mut!(body);

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(report = %report, "Ingestion cancelled");
                    return Ok(RunOutcome::Cancelled(report));
                }
                next = body.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(error)) => return Err(self.abort(error, report)),
                None => break,
            };

            let lines = match decoder.push(chunk.as_ref()) {
                Ok(lines) => lines,
                Err(e) => return Err(self.abort(IngestError::Decode(e), report)),
            };
            for line in lines {
                if let Err(error) = self
                    .handle_line(line, &mut report, &mut push_budget, cancel)
                    .await
                {
                    return Err(self.abort(error, report));
                }
                if cancel.is_cancelled() {
                    info!(report = %report, "Ingestion cancelled");
                    return Ok(RunOutcome::Cancelled(report));
                }
            }
        }

        let tail = match decoder.finish() {
            Ok(lines) => lines,
            Err(e) => return Err(self.abort(IngestError::Decode(e), report)),
        };
        for line in tail {
            if let Err(error) = self
                .handle_line(line, &mut report, &mut push_budget, cancel)
                .await
            {
                return Err(self.abort(error, report));
            }
        }

        info!(
            total = report.queued,
            errors = report.parse_errors,
            success_rate = %format!("{:.2}%", report.success_rate()),
            publish_errors = report.publish_errors,
            "Ingestion complete"
        );
        Ok(RunOutcome::Completed(report))
    }

    async fn handle_line(
        &self,
        line: DecodedLine,
        report: &mut IngestReport,
        push_budget: &mut RetryBudget,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        let line = match line {
            Ok(line) if line.trim().is_empty() => return Ok(()),
            Ok(line) => {
                report.lines += 1;
                line
            }
            Err(e) => {
                report.lines += 1;
                report.parse_errors += 1;
                debug!(error = %e, line = report.lines, "Skipping line that is not UTF-8");
                return Ok(());
            }
        };

        let encoded = match Event::parse_line(&line).and_then(|e| Ok(e.to_json()?)) {
            Ok(encoded) => encoded,
            Err(e) => {
                report.parse_errors += 1;
                debug!(error = %e, line = report.lines, "Skipping unparseable line");
                return Ok(());
            }
        };

        if !self.push(&encoded, report, push_budget, cancel).await? {
            return Ok(());
        }
        report.queued += 1;

        if let Err(e) = self.publisher.publish(&encoded).await {
            report.publish_errors += 1;
            warn!(error = %e, "Live publish failed");
        }

        if report.queued % self.config.progress_interval.max(1) == 0 {
            info!(queued = report.queued, "Ingestion progress");
        }
        Ok(())
    }

    /// Push with the full-queue and transient-failure policies applied.
    ///
    /// Returns `false` when cancelled while waiting.
    async fn push(
        &self,
        encoded: &str,
        report: &mut IngestReport,
        push_budget: &mut RetryBudget,
        cancel: &CancellationToken,
    ) -> Result<bool, IngestError> {
        let mut full_attempt: u32 = 0;

        loop {
            let wait = match self.queue.push(encoded).await {
                Ok(()) => {
                    push_budget.record_success();
                    return Ok(true);
                }
                Err(BrokerError::Full { capacity }) => {
                    if full_attempt == 0 {
                        report.full_waits += 1;
                        debug!(capacity, "Queue full, waiting for space");
                    }
                    let delay = self
                        .config
                        .full_queue_backoff
                        .delay_for_attempt(full_attempt.min(16));
                    full_attempt += 1;
                    delay
                }
                Err(source) => match push_budget.record_failure() {
                    Ok(delay) => {
                        warn!(
                            error = %source,
                            attempt = push_budget.consecutive_failures(),
                            retry_in_ms = delay.as_millis() as u64,
                            "Queue push failed, retrying"
                        );
                        delay
                    }
                    Err(budget) => return Err(IngestError::Queue { source, budget }),
                },
            };

            if sleep_or_cancelled(wait, cancel).await {
                return Ok(false);
            }
        }
    }

    fn abort(&self, error: IngestError, report: IngestReport) -> RunFailure {
        error!(
            error = %error,
            total = report.queued,
            errors = report.parse_errors,
            "Ingestion failed"
        );
        RunFailure { error, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_two_decimals() {
        let report = IngestReport {
            lines: 3,
            queued: 2,
            parse_errors: 1,
            ..Default::default()
        };
        assert_eq!(report.to_string(), "total=2 errors=1 successRate=66.67%");
    }

    #[test]
    fn test_success_rate_empty_run() {
        assert_eq!(IngestReport::default().success_rate(), 0.0);
    }
}
