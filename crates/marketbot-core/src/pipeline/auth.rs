//! Authorization gate
//!
//! Classifies the caller by asking the user directory on every request.
//! Results are never cached: an account can be blocked at any moment and the
//! next request must see it.

use super::{Next, Outcome, PipelineContext, PipelineError, ShortCircuit, Stage};
use crate::update::Identity;
use crate::users::{LookupError, User, UserDirectory};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on a single user lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Classification of a caller
#[derive(Debug, Clone, PartialEq)]
pub enum UserVerdict {
    /// No account exists for the identity
    Unregistered,
    /// Account exists but is disabled
    Blocked,
    /// Account exists and may proceed
    Active(User),
    /// The lookup failed or timed out; treated as a denial
    LookupFailed,
}

/// Resolves identities to verdicts through a [`UserDirectory`]
#[derive(Clone)]
pub struct AuthGate {
    directory: Arc<dyn UserDirectory>,
    lookup_timeout: Duration,
}

impl AuthGate {
    /// Create a gate over `directory` with a per-lookup timeout.
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>, lookup_timeout: Duration) -> Self {
        Self {
            directory,
            lookup_timeout,
        }
    }

    /// Configured lookup timeout.
    #[must_use]
    pub const fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }

    /// Classify `identity`.
    ///
    /// Never fails: lookup errors and timeouts become
    /// [`UserVerdict::LookupFailed`] and are logged as warnings.
    pub async fn authorize(&self, identity: &Identity) -> UserVerdict {
        let lookup = self.directory.find_user_by_identity(identity);
        let result = match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(self.lookup_timeout)),
        };

        match result {
            Ok(None) => {
                debug!(identity = %identity, "No user for identity");
                UserVerdict::Unregistered
            }
            Ok(Some(user)) if !user.is_active => {
                debug!(identity = %identity, user_id = user.id, "User is blocked");
                UserVerdict::Blocked
            }
            Ok(Some(user)) => UserVerdict::Active(user),
            Err(e) => {
                warn!(identity = %identity, error = %e, "User lookup failed");
                UserVerdict::LookupFailed
            }
        }
    }
}

/// Pipeline stage that only lets active users through
pub struct AuthStage {
    gate: AuthGate,
}

impl AuthStage {
    /// Stage name used for substitution.
    pub const NAME: &'static str = "auth";

    /// Wrap `gate` in a stage.
    #[must_use]
    pub const fn new(gate: AuthGate) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Stage for AuthStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn call(
        &self,
        ctx: &mut PipelineContext,
        next: Next<'_>,
    ) -> Result<Outcome, PipelineError> {
        let verdict = self.gate.authorize(ctx.identity()).await;
        let reason = match verdict {
            UserVerdict::Active(user) => {
                ctx.set_user(user);
                return next.run(ctx).await;
            }
            UserVerdict::Unregistered => ShortCircuit::Unregistered,
            UserVerdict::Blocked => ShortCircuit::Blocked,
            UserVerdict::LookupFailed => ShortCircuit::LookupFailed,
        };

        info!(identity = %ctx.identity(), verdict = ?reason, "Request rejected by auth gate");
        ctx.reply_best_effort(reason.notice()).await;
        Ok(Outcome::ShortCircuited(reason))
    }
}
