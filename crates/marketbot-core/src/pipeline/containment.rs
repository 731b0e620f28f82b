//! Fault containment
//!
//! The outermost stage. Anything that goes wrong below it, whether an error
//! returned by a stage or handler or a panic, is logged here with the full
//! update and answered with one generic apology. The fault is never retried.

use super::{Next, Outcome, PipelineContext, PipelineError, Stage};
use crate::notify::Notice;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Stage that turns downstream faults into [`Outcome::Faulted`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainmentStage;

impl ContainmentStage {
    /// Stage name used for substitution.
    pub const NAME: &'static str = "containment";

    /// Create the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// A fault caught below the containment stage
#[derive(Debug)]
pub(crate) enum Fault {
    /// Error returned through the chain
    Error(PipelineError),
    /// Panic message
    Panic(String),
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Log a fault together with the update that caused it.
pub(crate) fn log_fault(ctx: &PipelineContext, fault: &Fault) {
    let update = ctx.update().to_log_string();
    match fault {
        Fault::Error(e) => error!(
            identity = %ctx.identity(),
            update = %update,
            error = %e,
            details = ?e,
            "❌ Unhandled error while processing update"
        ),
        Fault::Panic(panic) => error!(
            identity = %ctx.identity(),
            update = %update,
            panic = %panic,
            "❌ Panic while processing update"
        ),
    }
}

#[async_trait]
impl Stage for ContainmentStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn call(
        &self,
        ctx: &mut PipelineContext,
        next: Next<'_>,
    ) -> Result<Outcome, PipelineError> {
        let result = AssertUnwindSafe(next.run(ctx)).catch_unwind().await;

        let fault = match result {
            Ok(Ok(outcome)) => return Ok(outcome),
            Ok(Err(e)) => Fault::Error(e),
            Err(payload) => Fault::Panic(panic_message(payload.as_ref())),
        };

        log_fault(ctx, &fault);
        ctx.reply_best_effort(Notice::Fault).await;
        Ok(Outcome::Faulted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_from_str() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }

    #[test]
    fn test_panic_message_from_string() {
        let payload: Box<dyn Any + Send> = Box::new(format!("index {} out of range", 3));
        assert_eq!(panic_message(payload.as_ref()), "index 3 out of range");
    }

    #[test]
    fn test_panic_message_unknown_payload() {
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
