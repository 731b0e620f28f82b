//! Request middleware pipeline
//!
//! Every inbound update runs through an ordered list of [`Stage`]s before it
//! reaches the terminal [`Handler`]. A stage either passes control inward by
//! running [`Next`], or short-circuits the chain with its own [`Outcome`].
//!
//! The standard chain, outer to inner:
//! error containment → rate limiter → auth gate → handler.

pub mod auth;
pub mod containment;
pub mod dispatcher;
pub mod rate_limit;

pub use auth::{AuthGate, AuthStage, UserVerdict};
pub use containment::ContainmentStage;
pub use dispatcher::{Pipeline, PipelineBuilder};
pub use rate_limit::{RateDecision, RateLimitStage, RateLimiter, ReaperHandle};

use crate::notify::{Notice, Notifier, NotifyError};
use crate::update::{Identity, InboundUpdate};
use crate::users::User;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{trace, warn};

/// Faults that travel outward through the chain
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The terminal handler returned an error
    #[error("Handler failed: {0:#}")]
    Handler(anyhow::Error),
    /// A reply required by a stage could not be delivered
    #[error("Reply failed: {0}")]
    Notify(#[from] NotifyError),
    /// A stage failed for its own reasons
    #[error("Stage {stage} failed: {error:#}")]
    Stage {
        /// Name of the failing stage
        stage: &'static str,
        /// Underlying cause
        error: anyhow::Error,
    },
}

/// Why a stage stopped the chain early
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortCircuit {
    /// Rate limit exceeded
    Throttled {
        /// Time until the caller's window resets
        retry_after: Duration,
    },
    /// No marketplace account for the caller
    Unregistered,
    /// Caller's account is disabled
    Blocked,
    /// User lookup failed or timed out
    LookupFailed,
}

impl ShortCircuit {
    /// The notice sent to the user for this short-circuit.
    #[must_use]
    pub fn notice(&self) -> Notice {
        match self {
            Self::Throttled { retry_after } => Notice::Throttled {
                retry_after: *retry_after,
            },
            Self::Unregistered => Notice::Unregistered,
            Self::Blocked => Notice::Blocked,
            Self::LookupFailed => Notice::LookupFailed,
        }
    }
}

/// Final result of running an update through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The handler ran to completion
    Handled,
    /// A stage stopped the chain before the handler
    ShortCircuited(ShortCircuit),
    /// A fault was caught and reported to the user
    Faulted,
}

/// Per-invocation state shared by the stages of one update
///
/// Created by the dispatcher for a single update and dropped when the chain
/// returns. Never shared across updates.
pub struct PipelineContext {
    update: InboundUpdate,
    user: Option<User>,
    notifier: Arc<dyn Notifier>,
}

impl PipelineContext {
    /// Create a context for `update`, replying through `notifier`.
    #[must_use]
    pub fn new(update: InboundUpdate, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            update,
            user: None,
            notifier,
        }
    }

    /// The update being processed.
    #[must_use]
    pub const fn update(&self) -> &InboundUpdate {
        &self.update
    }

    /// The caller's identity.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.update.identity
    }

    /// The user record resolved by the auth gate, if it ran.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Record the resolved user for downstream stages.
    pub fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    /// Reply to the update, propagating delivery failures.
    ///
    /// # Errors
    ///
    /// Returns the notifier's error if the reply could not be delivered.
    pub async fn reply(&self, notice: Notice) -> Result<(), NotifyError> {
        self.notifier.reply(&self.update, notice).await
    }

    /// Reply once, logging and swallowing a delivery failure.
    ///
    /// Returns `true` if the reply was delivered.
    pub async fn reply_best_effort(&self, notice: Notice) -> bool {
        let kind = notice.kind();
        match self.notifier.reply(&self.update, notice).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    identity = %self.identity(),
                    notice = kind,
                    error = %e,
                    "Failed to deliver notice"
                );
                false
            }
        }
    }
}

/// Terminal business logic reached only by active users
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle the update in `ctx`.
    ///
    /// Errors propagate outward to the containment stage.
    async fn handle(&self, ctx: &mut PipelineContext) -> anyhow::Result<()>;
}

/// A cross-cutting step of the pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name of the stage for logging and substitution
    fn name(&self) -> &'static str;

    /// Process `ctx`, either returning early or running `next`.
    async fn call(
        &self,
        ctx: &mut PipelineContext,
        next: Next<'_>,
    ) -> Result<Outcome, PipelineError>;
}

/// The remainder of the chain below the current stage
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Arc<dyn Stage>], handler: &'a dyn Handler) -> Self {
        Self { stages, handler }
    }

    /// Run the remaining stages and the handler.
    ///
    /// # Errors
    ///
    /// Returns any fault raised by an inner stage or the handler.
    pub async fn run(self, ctx: &mut PipelineContext) -> Result<Outcome, PipelineError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                trace!(stage = stage.name(), identity = %ctx.identity(), "Entering stage");
                stage.call(ctx, Next::new(rest, self.handler)).await
            }
            None => {
                self.handler
                    .handle(ctx)
                    .await
                    .map_err(PipelineError::Handler)?;
                Ok(Outcome::Handled)
            }
        }
    }
}
