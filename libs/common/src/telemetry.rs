//! Tracing subscriber setup shared by all binaries.

use std::str::FromStr;

use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, one line per event.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Install the global subscriber and return the service's root span.
///
/// The filter comes from `RUST_LOG` and falls back to `info`. Binaries run
/// their whole body inside the returned span, so every line carries the
/// service name.
pub fn init_tracing(service: &'static str, format: LogFormat) -> Span {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_span_list(false)))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    let root = service_span(service);
    root.in_scope(|| tracing::info!(?format, "tracing initialized"));
    root
}

/// Root span tagging every event with the service name.
pub fn service_span(service: &'static str) -> Span {
    tracing::info_span!("service", service)
}
