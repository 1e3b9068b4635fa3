//! Protocol envelopes exchanged with the worker and broadcast to subscribers.
//!
//! Every unit of communication is a single JSON object with a `type`
//! discriminator. Worker-emitted objects are forwarded with their declared
//! kind and payload intact; anything the worker prints that is not a JSON
//! object is downgraded into a fallback envelope rather than dropped.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

// ── Envelope kind ────────────────────────────────────────────────────────────

/// Discriminator for an [`Envelope`].
///
/// The well-known kinds cover the system-generated envelopes and the two
/// fallback wrappers; any other `type` string a worker declares passes
/// through as [`EnvelopeKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Fallback wrapper for a non-JSON stdout line, and the worker's own
    /// plain chat output.
    AgentMessage,
    /// Wrapper for every stderr line.
    AgentError,
    /// System envelope broadcast when the worker has been stopped.
    AgentStopped,
    /// System envelope sent to a newly registered subscriber only.
    ConnectionEstablished,
    /// System envelope for crashes and reader failures.
    Error,
    /// Worker-declared kind forwarded verbatim.
    Other(String),
}

impl EnvelopeKind {
    /// Wire representation of the kind (the `type` field value).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AgentMessage => "agent_message",
            Self::AgentError => "agent_error",
            Self::AgentStopped => "agent_stopped",
            Self::ConnectionEstablished => "connection_established",
            Self::Error => "error",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for EnvelopeKind {
    fn from(s: &str) -> Self {
        match s {
            "agent_message" => Self::AgentMessage,
            "agent_error" => Self::AgentError,
            "agent_stopped" => Self::AgentStopped,
            "connection_established" => Self::ConnectionEstablished,
            "error" => Self::Error,
            other => Self::Other(other.to_owned()),
        }
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// One protocol unit: a kind, its payload fields, and a production timestamp.
///
/// Immutable once constructed. Serializes to a flat JSON object:
/// `{"type": <kind>, …payload fields…, "timestamp": <ISO-8601>}`. A
/// worker-declared `timestamp` payload field wins over the supervisor's
/// clock so worker envelopes round-trip unmodified.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    kind: EnvelopeKind,
    body: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Construct a system envelope with a single `content` field.
    fn system(kind: EnvelopeKind, content: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("content".into(), Value::String(content.into()));
        Self {
            kind,
            body,
            timestamp: Utc::now(),
        }
    }

    /// Fallback wrapper for a stdout line that is not a JSON object.
    #[must_use]
    pub fn agent_message(raw_line: impl Into<String>) -> Self {
        Self::system(EnvelopeKind::AgentMessage, raw_line)
    }

    /// Wrapper for one stderr line.
    #[must_use]
    pub fn agent_error(raw_line: impl Into<String>) -> Self {
        Self::system(EnvelopeKind::AgentError, raw_line)
    }

    /// System envelope broadcast once `stop()` completes.
    #[must_use]
    pub fn agent_stopped() -> Self {
        Self::system(EnvelopeKind::AgentStopped, "Agent has been stopped")
    }

    /// Greeting sent to a newly registered subscriber.
    #[must_use]
    pub fn connection_established() -> Self {
        Self::system(EnvelopeKind::ConnectionEstablished, "Connected to agent conduit")
    }

    /// System envelope carrying a crash or reader failure detail.
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self::system(EnvelopeKind::Error, detail)
    }

    /// Parse one worker stdout line into a structured envelope.
    ///
    /// Returns `None` when the line is not a JSON object carrying a string
    /// `type` field; the caller downgrades such lines to
    /// [`Envelope::agent_message`] so no output is silently dropped.
    #[must_use]
    pub fn from_worker_line(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        let Value::Object(mut body) = value else {
            return None;
        };
        let kind = match body.remove("type") {
            Some(Value::String(s)) => EnvelopeKind::from(s.as_str()),
            _ => return None,
        };

        // A declared timestamp is authoritative. It stays in the body and is
        // re-emitted verbatim on the wire; the parsed value (when the worker
        // declared valid RFC 3339) backs the typed accessor, with receipt
        // time as the fallback.
        let timestamp = body
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc));

        Some(Self {
            kind,
            body,
            timestamp,
        })
    }

    /// Envelope kind.
    #[must_use]
    pub fn kind(&self) -> &EnvelopeKind {
        &self.kind
    }

    /// The `content` payload field, when present and textual.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.body.get("content").and_then(Value::as_str)
    }

    /// Production (or worker-declared) timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Serialize for Envelope {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.body.len() + 2))?;
        map.serialize_entry("type", self.kind.as_str())?;
        for (key, value) in &self.body {
            if key == "timestamp" {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        // A worker-declared timestamp is forwarded exactly as received, even
        // when it is not RFC 3339 (e.g. a numeric epoch).
        match self.body.get("timestamp") {
            Some(declared) => map.serialize_entry("timestamp", declared)?,
            None => map.serialize_entry("timestamp", &self.timestamp.to_rfc3339())?,
        }
        map.end()
    }
}

// ── Outbound commands ────────────────────────────────────────────────────────

/// Commands the supervisor writes to the worker's stdin.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Forward user input to the worker.
    Message {
        /// Text payload delivered to the worker.
        content: String,
    },
    /// Ask the worker to exit gracefully.
    Exit,
}
