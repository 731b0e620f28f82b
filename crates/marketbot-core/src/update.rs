//! Inbound update model
//!
//! The pipeline never sees transport types. Adapters convert whatever the
//! messaging platform delivers into an [`InboundUpdate`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-user key used for rate limiting and user lookups.
///
/// For Telegram this is the numeric user id rendered as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create an identity from any string-like key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for Identity {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for Identity {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for Identity {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Content carried by an update, handed untouched to the terminal handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Plain message text or a `/command`
    Text(String),
    /// Inline keyboard callback data
    Callback(String),
}

/// A single event from the messaging platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundUpdate {
    /// Who sent the update
    pub identity: Identity,
    /// Where replies go
    pub chat_id: i64,
    /// Sender's display name, for diagnostics only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Update content
    pub payload: Payload,
}

impl InboundUpdate {
    /// Create a text update.
    #[must_use]
    pub fn text(identity: impl Into<Identity>, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            chat_id,
            display_name: None,
            payload: Payload::Text(text.into()),
        }
    }

    /// Create a callback update.
    #[must_use]
    pub fn callback(identity: impl Into<Identity>, chat_id: i64, data: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            chat_id,
            display_name: None,
            payload: Payload::Callback(data.into()),
        }
    }

    /// Attach the sender's display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Render the update as compact JSON for log entries.
    ///
    /// Falls back to the `Debug` form if serialization fails.
    #[must_use]
    pub fn to_log_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
