//! Per-identity fixed window rate limiting
//!
//! Each identity gets a counter that resets at fixed window boundaries. The
//! table is a sharded concurrent map, so a check only locks the shard holding
//! that identity, and the background reaper walks one shard at a time.
//!
//! Known limitation: a caller can land up to `2 × max_requests` requests
//! around a window boundary (the end of one window plus the start of the
//! next). This is the usual fixed window trade-off for O(1) state per user.

use super::{Next, Outcome, PipelineContext, PipelineError, ShortCircuit, Stage};
use crate::update::Identity;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Default number of requests allowed per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 20;
/// Shortest window a limiter accepts.
pub const MIN_WINDOW: Duration = Duration::from_secs(1);

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request fits in the current window
    Allow,
    /// Window budget is spent
    Deny {
        /// Time until the window resets
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Whether the request was allowed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

impl RateWindow {
    fn open(now: Instant, window_size: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + window_size,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at
    }
}

/// Fixed window request counter keyed by [`Identity`]
///
/// Cloning is cheap and shares the same table.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<Identity, RateWindow>>,
    window_size: Duration,
    max_requests: u32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_REQUESTS)
    }
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per `window_size`.
    ///
    /// A `max_requests` of zero is treated as one, since the first request
    /// of a window always opens it. Windows shorter than [`MIN_WINDOW`] are
    /// raised to it; a zero window would admit every request.
    #[must_use]
    pub fn new(window_size: Duration, max_requests: u32) -> Self {
        if window_size < MIN_WINDOW {
            warn!(
                window_ms = u64::try_from(window_size.as_millis()).unwrap_or(u64::MAX),
                "Rate limit window too short, using {}s",
                MIN_WINDOW.as_secs()
            );
        }
        Self {
            windows: Arc::new(DashMap::new()),
            window_size: window_size.max(MIN_WINDOW),
            max_requests: max_requests.max(1),
        }
    }

    /// Configured window length.
    #[must_use]
    pub const fn window_size(&self) -> Duration {
        self.window_size
    }

    /// Configured per-window budget.
    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count a request from `identity` at `now`.
    ///
    /// The read-modify-write happens under the entry's shard lock, so
    /// concurrent checks for one identity never admit more than
    /// `max_requests` per window. Denied requests are not counted and do
    /// not extend the window.
    pub fn check(&self, identity: &Identity, now: Instant) -> RateDecision {
        match self.windows.entry(identity.clone()) {
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                if window.is_expired(now) {
                    *window = RateWindow::open(now, self.window_size);
                    RateDecision::Allow
                } else if window.count < self.max_requests {
                    window.count += 1;
                    RateDecision::Allow
                } else {
                    RateDecision::Deny {
                        retry_after: window.reset_at.saturating_duration_since(now),
                    }
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(RateWindow::open(now, self.window_size));
                RateDecision::Allow
            }
        }
    }

    /// Count a request from `identity` at the current time.
    pub fn check_now(&self, identity: &Identity) -> RateDecision {
        self.check(identity, Instant::now())
    }

    /// Requests counted for `identity` in its live window.
    ///
    /// Returns `0` when there is no live window.
    #[must_use]
    pub fn count(&self, identity: &Identity, now: Instant) -> u32 {
        self.windows
            .get(identity)
            .filter(|window| !window.is_expired(now))
            .map_or(0, |window| window.count)
    }

    /// Remove every window that has expired by `now`.
    ///
    /// Returns the number of removed entries.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let keep = !window.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of tracked identities, including expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no identity is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Spawn the background reaper, sweeping once per window.
    ///
    /// The task runs until [`ReaperHandle::stop`] is called or the handle is
    /// dropped. Must be called from within a Tokio runtime.
    #[must_use = "dropping the handle stops the reaper"]
    pub fn start_reaper(&self) -> ReaperHandle {
        let limiter = self.clone();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let period = self.window_size;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = limiter.sweep(Instant::now());
                        if removed > 0 {
                            debug!(removed, remaining = limiter.len(), "Rate limit windows swept");
                        }
                    }
                }
            }

            debug!("Rate limit reaper stopped");
        });

        info!(
            window_secs = period.as_secs(),
            max_requests = self.max_requests,
            "Rate limit reaper started"
        );

        ReaperHandle {
            token,
            task: Some(task),
        }
    }
}

/// Owns the background reaper task of a [`RateLimiter`]
pub struct ReaperHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    /// Stop the reaper and wait for the task to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Rate limit reaper ended abnormally");
            }
        }
    }

    /// Whether the reaper task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Pipeline stage enforcing a [`RateLimiter`]
pub struct RateLimitStage {
    limiter: RateLimiter,
}

impl RateLimitStage {
    /// Stage name used for substitution.
    pub const NAME: &'static str = "rate_limit";

    /// Wrap `limiter` in a stage.
    #[must_use]
    pub const fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn call(
        &self,
        ctx: &mut PipelineContext,
        next: Next<'_>,
    ) -> Result<Outcome, PipelineError> {
        match self.limiter.check_now(ctx.identity()) {
            RateDecision::Allow => next.run(ctx).await,
            RateDecision::Deny { retry_after } => {
                info!(
                    identity = %ctx.identity(),
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    "Request throttled"
                );
                let reason = ShortCircuit::Throttled { retry_after };
                ctx.reply_best_effort(reason.notice()).await;
                Ok(Outcome::ShortCircuited(reason))
            }
        }
    }
}
