//! Pipeline composition and dispatch

use super::auth::{AuthGate, AuthStage};
use super::containment::{log_fault, ContainmentStage, Fault};
use super::rate_limit::{RateLimitStage, RateLimiter};
use super::{Handler, Next, Outcome, PipelineContext, Stage};
use crate::notify::Notifier;
use crate::update::InboundUpdate;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// An ordered chain of stages ending in a handler
///
/// Each [`Pipeline::dispatch`] call is an independent invocation with its
/// own [`PipelineContext`]. The pipeline does not queue or reorder updates;
/// per-user ordering is whatever the transport delivers.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    handler: Arc<dyn Handler>,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    /// Start an empty chain for `handler`.
    #[must_use]
    pub fn builder(handler: Arc<dyn Handler>, notifier: Arc<dyn Notifier>) -> PipelineBuilder {
        PipelineBuilder {
            stages: Vec::new(),
            handler,
            notifier,
        }
    }

    /// Builder pre-filled with the standard chain:
    /// containment → rate limit → auth → handler.
    #[must_use]
    pub fn standard_builder(
        limiter: RateLimiter,
        gate: AuthGate,
        handler: Arc<dyn Handler>,
        notifier: Arc<dyn Notifier>,
    ) -> PipelineBuilder {
        Self::builder(handler, notifier)
            .stage(ContainmentStage::new())
            .stage(RateLimitStage::new(limiter))
            .stage(AuthStage::new(gate))
    }

    /// The standard chain, ready to dispatch.
    #[must_use]
    pub fn standard(
        limiter: RateLimiter,
        gate: AuthGate,
        handler: Arc<dyn Handler>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::standard_builder(limiter, gate, handler, notifier).build()
    }

    /// Stage names, outermost first.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run one update through the chain.
    ///
    /// Never fails. With a containment stage in the chain every fault is
    /// reported there; without one, an error reaching the top is logged and
    /// reported as [`Outcome::Faulted`] with no reply.
    pub async fn dispatch(&self, update: InboundUpdate) -> Outcome {
        let span = info_span!("dispatch", identity = %update.identity);
        let mut ctx = PipelineContext::new(update, Arc::clone(&self.notifier));

        async move {
            match Next::new(&self.stages, self.handler.as_ref())
                .run(&mut ctx)
                .await
            {
                Ok(outcome) => {
                    debug!(outcome = ?outcome, "Update dispatched");
                    outcome
                }
                Err(e) => {
                    log_fault(&ctx, &Fault::Error(e));
                    Outcome::Faulted
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Assembles a [`Pipeline`] stage by stage
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    handler: Arc<dyn Handler>,
    notifier: Arc<dyn Notifier>,
}

impl PipelineBuilder {
    /// Append `stage` inside the stages added so far.
    #[must_use]
    pub fn stage(self, stage: impl Stage + 'static) -> Self {
        self.shared_stage(Arc::new(stage))
    }

    /// Append an already shared stage.
    #[must_use]
    pub fn shared_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Substitute the stage called `name` with `stage`, keeping its position.
    ///
    /// Leaves the chain unchanged (with a warning) if no stage has that name.
    #[must_use]
    pub fn replace(mut self, name: &str, stage: impl Stage + 'static) -> Self {
        match self.stages.iter().position(|s| s.name() == name) {
            Some(index) => self.stages[index] = Arc::new(stage),
            None => warn!(stage = name, "No stage to replace"),
        }
        self
    }

    /// Drop the stage called `name`, if present.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.stages.retain(|s| s.name() != name);
        self
    }

    /// Finish the chain.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let names: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();
        info!(stages = ?names, "Pipeline assembled");

        Pipeline {
            stages: self.stages,
            handler: self.handler,
            notifier: self.notifier,
        }
    }
}
