//! Event definitions for the ingestion pipeline
//!
//! An [`Event`] is built from one NDJSON feed line. Its `type` tag maps onto
//! [`EventKind`], with an `Unknown` variant so new upstream tags flow through
//! untouched. The payload is a tagged union: push events expose their commit
//! count, every other kind keeps its payload as opaque JSON.
//!
//! Serialization goes through [`WireEvent`], the feed's own JSON shape, so an
//! event re-encoded for the queue or the fan-out channel looks like the line
//! it came from (plus its `id`, when one had to be derived).

use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::{EventError, ParseError};
use crate::ids::EventId;

/// Event type tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Push,
    Create,
    Delete,
    Fork,
    Watch,
    Issues,
    IssueComment,
    PullRequest,
    PullRequestReview,
    PullRequestReviewComment,
    PullRequestReviewThread,
    CommitComment,
    Release,
    Public,
    Member,
    Gollum,
    Sponsorship,
    /// Tag not in the known set; the raw tag is kept verbatim.
    Unknown(String),
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "PushEvent" => EventKind::Push,
            "CreateEvent" => EventKind::Create,
            "DeleteEvent" => EventKind::Delete,
            "ForkEvent" => EventKind::Fork,
            "WatchEvent" => EventKind::Watch,
            "IssuesEvent" => EventKind::Issues,
            "IssueCommentEvent" => EventKind::IssueComment,
            "PullRequestEvent" => EventKind::PullRequest,
            "PullRequestReviewEvent" => EventKind::PullRequestReview,
            "PullRequestReviewCommentEvent" => EventKind::PullRequestReviewComment,
            "PullRequestReviewThreadEvent" => EventKind::PullRequestReviewThread,
            "CommitCommentEvent" => EventKind::CommitComment,
            "ReleaseEvent" => EventKind::Release,
            "PublicEvent" => EventKind::Public,
            "MemberEvent" => EventKind::Member,
            "GollumEvent" => EventKind::Gollum,
            "SponsorshipEvent" => EventKind::Sponsorship,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            EventKind::Push => "PushEvent",
            EventKind::Create => "CreateEvent",
            EventKind::Delete => "DeleteEvent",
            EventKind::Fork => "ForkEvent",
            EventKind::Watch => "WatchEvent",
            EventKind::Issues => "IssuesEvent",
            EventKind::IssueComment => "IssueCommentEvent",
            EventKind::PullRequest => "PullRequestEvent",
            EventKind::PullRequestReview => "PullRequestReviewEvent",
            EventKind::PullRequestReviewComment => "PullRequestReviewCommentEvent",
            EventKind::PullRequestReviewThread => "PullRequestReviewThreadEvent",
            EventKind::CommitComment => "CommitCommentEvent",
            EventKind::Release => "ReleaseEvent",
            EventKind::Public => "PublicEvent",
            EventKind::Member => "MemberEvent",
            EventKind::Gollum => "GollumEvent",
            EventKind::Sponsorship => "SponsorshipEvent",
            EventKind::Unknown(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Unknown(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(EventKind::from_tag(&tag))
    }
}

/// The user that triggered the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
    /// Remaining upstream fields (`id`, `url`, ...), carried through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The repository the event happened in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Push payload. Only `size` is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPayload {
    /// Number of commits in the push; 0 when the feed omits it.
    pub size: u64,
    pub raw: Value,
}

/// Event payload, tagged by event kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Push(PushPayload),
    /// Any payload this pipeline does not interpret.
    Opaque(Value),
}

impl Payload {
    fn classify(kind: &EventKind, raw: Value) -> Self {
        match kind {
            EventKind::Push => {
                let size = raw.get("size").and_then(Value::as_u64).unwrap_or(0);
                Payload::Push(PushPayload { size, raw })
            }
            _ => Payload::Opaque(raw),
        }
    }

    pub fn raw(&self) -> &Value {
        match self {
            Payload::Push(push) => &push.raw,
            Payload::Opaque(raw) => raw,
        }
    }

    fn into_raw(self) -> Value {
        match self {
            Payload::Push(push) => push.raw,
            Payload::Opaque(raw) => raw,
        }
    }
}

/// Feed line shape. Used as the serde bridge for [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(
        default,
        deserialize_with = "deserialize_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub actor: Actor,
    pub repo: Repo,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// The archive ships ids as strings; older dumps used numbers.
fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Immutable record produced from one feed line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent", into = "WireEvent")]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    pub actor: Actor,
    pub repo: Repo,
    pub created_at: DateTime<Utc>,
    pub payload: Payload,
    pub extra: Map<String, Value>,
}

impl TryFrom<WireEvent> for Event {
    type Error = EventError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        if wire.actor.login.trim().is_empty() {
            return Err(EventError::MissingField("actor.login"));
        }
        if wire.repo.name.trim().is_empty() {
            return Err(EventError::MissingField("repo.name"));
        }

        let id = match &wire.id {
            Some(id) => EventId::new(id.clone()),
            None => {
                // `id` is skipped when None, so this is the digest of the rest.
                let canonical = serde_json::to_vec(&wire)
                    .map_err(|e| EventError::Encoding(e.to_string()))?;
                EventId::from_content(&canonical)
            }
        };

        let payload = Payload::classify(&wire.kind, wire.payload);

        Ok(Self {
            id,
            kind: wire.kind,
            actor: wire.actor,
            repo: wire.repo,
            created_at: wire.created_at,
            payload,
            extra: wire.extra,
        })
    }
}

impl From<Event> for WireEvent {
    fn from(event: Event) -> Self {
        Self {
            id: Some(event.id.as_str().to_string()),
            kind: event.kind,
            actor: event.actor,
            repo: event.repo,
            created_at: event.created_at,
            payload: event.payload.into_raw(),
            extra: event.extra,
        }
    }
}

impl Event {
    /// Parse one NDJSON line.
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(serde_json::from_str(line)?)
    }

    /// Serialize to the JSON carried on the queue and the fan-out channel.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Commits contributed by this event (non-zero only for pushes).
    pub fn commit_count(&self) -> u64 {
        match &self.payload {
            Payload::Push(push) => push.size,
            Payload::Opaque(_) => 0,
        }
    }

    /// Minute-of-hour bucket (0..=59) of `created_at`.
    pub fn minute_bucket(&self) -> u32 {
        self.created_at.minute()
    }

    pub fn is_push(&self) -> bool {
        self.kind == EventKind::Push
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUSH_LINE: &str = r#"{"id":"34567890123","type":"PushEvent","actor":{"id":1,"login":"octocat","avatar_url":"https://avatars.githubusercontent.com/u/1?"},"repo":{"id":7,"name":"octo/hello","url":"https://api.github.com/repos/octo/hello"},"payload":{"push_id":99,"size":3,"distinct_size":3},"public":true,"created_at":"2024-01-01T15:42:07Z"}"#;

    #[test]
    fn test_parse_push_event() {
        let event = Event::parse_line(PUSH_LINE).unwrap();

        assert_eq!(event.id, EventId::new("34567890123"));
        assert_eq!(event.kind, EventKind::Push);
        assert_eq!(event.actor.login, "octocat");
        assert_eq!(event.repo.name, "octo/hello");
        assert_eq!(event.commit_count(), 3);
        assert_eq!(event.minute_bucket(), 42);
        assert_eq!(event.extra.get("public"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_unknown_kind_kept_verbatim() {
        let line = r#"{"id":"1","type":"BrandNewEvent","actor":{"login":"a"},"repo":{"name":"a/b"},"payload":{"size":10},"created_at":"2024-01-01T15:00:00Z"}"#;
        let event = Event::parse_line(line).unwrap();

        assert_eq!(event.kind, EventKind::Unknown("BrandNewEvent".to_string()));
        assert!(!event.kind.is_known());
        // size is only interpreted on pushes
        assert_eq!(event.commit_count(), 0);

        let json: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "BrandNewEvent");
        assert_eq!(json["payload"]["size"], 10);
    }

    #[test]
    fn test_missing_login_rejected() {
        let line = r#"{"id":"1","type":"WatchEvent","actor":{"login":""},"repo":{"name":"a/b"},"created_at":"2024-01-01T15:00:00Z"}"#;
        assert!(matches!(Event::parse_line(line), Err(ParseError::Json(_))));
    }

    #[test]
    fn test_malformed_line_rejected() {
        assert!(matches!(Event::parse_line("{not json"), Err(ParseError::Json(_))));
        assert!(matches!(Event::parse_line("   "), Err(ParseError::Empty)));
    }

    #[test]
    fn test_numeric_id_accepted() {
        let line = r#"{"id":42,"type":"ForkEvent","actor":{"login":"a"},"repo":{"name":"a/b"},"created_at":"2024-01-01T15:00:00Z"}"#;
        let event = Event::parse_line(line).unwrap();
        assert_eq!(event.id.as_str(), "42");
    }

    #[test]
    fn test_derived_id_survives_reencoding() {
        let line = r#"{"type":"WatchEvent","actor":{"login":"a"},"repo":{"name":"a/b"},"created_at":"2024-01-01T15:00:00Z"}"#;
        let first = Event::parse_line(line).unwrap();
        assert!(first.id.is_derived());

        // Same content parses to the same id
        let again = Event::parse_line(line).unwrap();
        assert_eq!(first.id, again.id);

        // The queue form carries the derived id explicitly
        let decoded = Event::parse_line(&first.to_json().unwrap()).unwrap();
        assert_eq!(decoded, first);
    }

    #[test]
    fn test_avatar_url_defaults_to_empty() {
        let line = r#"{"id":"5","type":"PushEvent","actor":{"login":"a"},"repo":{"name":"a/b"},"payload":{},"created_at":"2024-01-01T15:00:00Z"}"#;
        let event = Event::parse_line(line).unwrap();
        assert_eq!(event.actor.avatar_url, "");
        assert_eq!(event.commit_count(), 0);
    }
}
