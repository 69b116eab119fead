//! Fan-out → client relay.
//!
//! Every message from the fan-out channel is checked to be JSON, wrapped in
//! the `github_event` envelope without re-encoding, and offered to every
//! connected client. A message that is not JSON is logged and dropped.

use std::sync::Arc;

use broker::{MessageStream, Subscriber};
use common::{sleep_or_cancelled, RetryBudget, RetryConfig};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backpressure::Frame;
use crate::error::RealtimeError;
use crate::hub::ClientHub;
use crate::metrics::RealtimeMetrics;

/// Event name carried by every frame pushed to clients.
pub const EVENT_NAME: &str = "github_event";

/// Wrap a fan-out message for clients: `{"event":"github_event","data":<message>}`.
///
/// Returns `None` when the message is not valid JSON.
pub fn frame_message(message: &str) -> Option<Frame> {
    let data = message.trim();
    if serde_json::from_str::<serde::de::IgnoredAny>(data).is_err() {
        return None;
    }
    Some(Arc::from(format!(
        r#"{{"event":"{EVENT_NAME}","data":{data}}}"#
    )))
}

/// Relay until cancelled.
///
/// A lost subscription (subscribe error or the stream ending) is retried with
/// backoff. The budget is reset once a message arrives on the new
/// subscription; running out of it is an error.
pub async fn run_relay(
    subscriber: Arc<dyn Subscriber>,
    hub: Arc<ClientHub>,
    metrics: Arc<RealtimeMetrics>,
    retry: RetryConfig,
    cancel: CancellationToken,
) -> Result<(), RealtimeError> {
    let mut budget = RetryBudget::new(retry);

    loop {
        let lost = match subscriber.subscribe().await {
            Ok(messages) => {
                info!("Subscribed to live events");
                match relay_stream(messages, &hub, &metrics, &mut budget, &cancel).await {
                    StreamEnd::Cancelled => {
                        info!("Relay stopped");
                        return Ok(());
                    }
                    StreamEnd::Closed => None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Fan-out subscribe failed");
                Some(e)
            }
        };

        let delay = match (budget.record_failure(), lost) {
            (Ok(delay), _) => delay,
            (Err(exhausted), Some(e)) => {
                error!(error = %e, attempts = exhausted.attempts, "Giving up on fan-out subscription");
                return Err(RealtimeError::Subscribe(e));
            }
            (Err(exhausted), None) => {
                error!(attempts = exhausted.attempts, "Giving up on fan-out subscription");
                return Err(RealtimeError::StreamEnded {
                    attempts: exhausted.attempts,
                });
            }
        };
        metrics.record_resubscribe();
        warn!(
            attempt = budget.consecutive_failures(),
            retry_in_ms = delay.as_millis() as u64,
            "Fan-out subscription lost, resubscribing"
        );
        if sleep_or_cancelled(delay, &cancel).await {
            info!("Relay stopped");
            return Ok(());
        }
    }
}

enum StreamEnd {
    Cancelled,
    Closed,
}

async fn relay_stream(
    mut messages: MessageStream,
    hub: &ClientHub,
    metrics: &RealtimeMetrics,
    budget: &mut RetryBudget,
    cancel: &CancellationToken,
) -> StreamEnd {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return StreamEnd::Cancelled,
            message = messages.next() => message,
        };

        let Some(message) = message else {
            if cancel.is_cancelled() {
                return StreamEnd::Cancelled;
            }
            return StreamEnd::Closed;
        };
        budget.record_success();
        metrics.record_received();

        let Some(frame) = frame_message(&message) else {
            metrics.record_invalid();
            warn!(len = message.len(), "Dropping live message that is not JSON");
            continue;
        };

        let report = hub.broadcast(frame);
        debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            disconnected = report.disconnected,
            "Relayed live event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_wraps_message_verbatim() {
        let frame = frame_message(r#"{"id":"1","type":"PushEvent"}"#).unwrap();
        assert_eq!(
            &*frame,
            r#"{"event":"github_event","data":{"id":"1","type":"PushEvent"}}"#
        );
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["data"]["type"], "PushEvent");
    }

    #[test]
    fn test_frame_rejects_non_json() {
        assert!(frame_message("not json").is_none());
        assert!(frame_message("").is_none());
        assert!(frame_message(r#"{"unterminated": "#).is_none());
    }
}
