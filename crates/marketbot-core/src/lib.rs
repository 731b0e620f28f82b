#![deny(missing_docs)]
//! Marketbot core library.
//!
//! Transport-agnostic request pipeline for the marketplace bot: rate limiting,
//! authorization, fault containment, and the dispatcher that chains them.

/// Configuration management.
pub mod config;
/// Reply side-channel used by stages and handlers.
pub mod notify;
/// Middleware pipeline stages and dispatcher.
pub mod pipeline;
/// Inbound update model.
pub mod update;
/// User records and the backend lookup client.
pub mod users;

#[cfg(test)]
pub mod testing;

pub use notify::{Notice, Notifier, NotifyError};
pub use pipeline::{
    Handler, Outcome, Pipeline, PipelineBuilder, PipelineContext, PipelineError, ShortCircuit,
    Stage,
};
pub use update::{Identity, InboundUpdate, Payload};
pub use users::{LookupError, User, UserDirectory};
