//! Reply side-channel
//!
//! Every user-visible effect of the pipeline goes through a single
//! "reply to this update" action. Stages use it for short-circuit notices,
//! the containment stage for the fault apology, and handlers for their
//! regular answers.

use crate::update::InboundUpdate;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while delivering a reply
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The platform rejected or could not receive the reply
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A reply the pipeline can send back to the originating chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Caller exceeded the rate limit
    Throttled {
        /// Time until the current window resets
        retry_after: Duration,
    },
    /// Caller has no account on the marketplace
    Unregistered,
    /// Caller's account is disabled
    Blocked,
    /// The user backend could not be reached
    LookupFailed,
    /// Something went wrong while handling the update
    Fault,
    /// Free-form handler reply
    Text(String),
}

impl Notice {
    /// Short machine-friendly name, used in log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Throttled { .. } => "throttled",
            Self::Unregistered => "unregistered",
            Self::Blocked => "blocked",
            Self::LookupFailed => "lookup_failed",
            Self::Fault => "fault",
            Self::Text(_) => "text",
        }
    }

    /// Default plain-text rendering of the notice.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Throttled { retry_after } => {
                // Round up so we never tell the user to retry too early
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                format!("⏳ Too many requests. Please try again in {secs} s.")
            }
            Self::Unregistered => {
                "👋 You are not registered yet. Send /start to create an account.".to_string()
            }
            Self::Blocked => "⛔️ Your account is blocked. Please contact support.".to_string(),
            Self::LookupFailed => {
                "⚠️ Service is temporarily unavailable. Please try again later.".to_string()
            }
            Self::Fault => "❌ Sorry, something went wrong. Please try again.".to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Delivers replies to the chat an update came from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `notice` in reply to `update`.
    async fn reply(&self, update: &InboundUpdate, notice: Notice) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttled_rounds_retry_up() {
        let notice = Notice::Throttled {
            retry_after: Duration::from_millis(56_200),
        };
        assert!(notice.render().contains("57 s"));

        let exact = Notice::Throttled {
            retry_after: Duration::from_secs(57),
        };
        assert!(exact.render().contains("57 s"));
    }

    #[test]
    fn test_text_renders_verbatim() {
        let notice = Notice::Text("Balance: 10".to_string());
        assert_eq!(notice.render(), "Balance: 10");
        assert_eq!(notice.kind(), "text");
    }
}
