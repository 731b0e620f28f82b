//! User records and lookup
//!
//! The authoritative user record lives in the marketplace backend. The core
//! only needs to know whether a caller exists and whether the account is
//! active; every other field is carried along opaquely for handlers.

mod http;

pub use http::HttpUserDirectory;

use crate::update::Identity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while looking up a user
#[derive(Debug, Error)]
pub enum LookupError {
    /// The lookup did not complete within the configured timeout
    #[error("Lookup timed out after {0:?}")]
    Timeout(Duration),
    /// Network or connection failure
    #[error("Transport error: {0}")]
    Transport(String),
    /// Backend answered with an unexpected status code
    #[error("Unexpected backend status: {0}")]
    Status(u16),
    /// Backend answered with a body we could not decode
    #[error("Decode error: {0}")]
    Decode(String),
}

/// A marketplace user as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Backend primary key
    pub id: i64,
    /// Whether the account may use the bot
    pub is_active: bool,
    /// Platform username, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Remaining backend fields (balance, referral code, ...)
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl User {
    /// Read an opaque backend field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Read an opaque backend field rendered as display text.
    ///
    /// Strings are returned without quotes, other JSON values in their
    /// compact JSON form.
    #[must_use]
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.field(name).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Looks up users by their platform identity
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find the user bound to `identity`.
    ///
    /// Returns `Ok(None)` when no such user exists.
    async fn find_user_by_identity(&self, identity: &Identity)
        -> Result<Option<User>, LookupError>;
}
