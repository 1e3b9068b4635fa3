//! Command relay: subscriber input → worker stdin.
//!
//! Subscribers may send structured `{"type": "message", "content": …}`
//! payloads or raw text. The relay extracts the worker-bound content and
//! forwards it through [`Supervisor::send`]. Malformed input is never
//! discarded, only downgraded: anything that is not a recognized command
//! object is forwarded verbatim as plain text.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::supervisor::Supervisor;
use crate::Result;

/// Extract the worker-bound text from a raw subscriber payload.
///
/// A JSON object with `type` of `message` or `user_message` yields its
/// `content` field (empty string when absent). Any other payload, JSON or
/// not, is returned verbatim.
#[must_use]
pub fn extract_content(raw: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
        if matches!(
            map.get("type").and_then(Value::as_str),
            Some("message" | "user_message")
        ) {
            return map
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
        }
    }
    raw.to_owned()
}

/// Forwards inbound subscriber payloads to the supervisor.
#[derive(Clone)]
pub struct CommandRelay {
    supervisor: Arc<Supervisor>,
}

impl CommandRelay {
    /// Create a relay bound to a supervisor.
    #[must_use]
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    /// Decode one inbound payload and write its content to the worker.
    ///
    /// # Errors
    ///
    /// Propagates [`Supervisor::send`] errors (`NotRunning`, `ProcessDied`,
    /// `ProcessCrashed`).
    pub async fn forward(&self, raw: &str) -> Result<()> {
        let content = extract_content(raw);
        debug!(bytes = content.len(), "relaying inbound command");
        self.supervisor.send(&content).await
    }
}
