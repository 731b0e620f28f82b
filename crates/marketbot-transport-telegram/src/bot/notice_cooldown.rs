//! Repeat notice flood protection
//!
//! A user hammering the bot while throttled or unregistered would otherwise
//! get one notice per update, which quickly runs into Telegram's own flood
//! limits. After a notice of such a kind is delivered, further notices of the
//! same kind to the same identity are dropped until the cooldown expires.

use async_trait::async_trait;
use marketbot_core::{Identity, InboundUpdate, Notice, Notifier, NotifyError};
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Tracks which identities recently received which notice kind
#[derive(Clone)]
pub struct NoticeCooldown {
    /// (identity, notice kind) -> () with TTL equal to the cooldown
    cache: Cache<(Identity, &'static str), ()>,
    silenced_count: Arc<AtomicU64>,
}

impl NoticeCooldown {
    /// Creates a cooldown tracker.
    ///
    /// # Arguments
    ///
    /// * `cooldown` - How long a delivered notice suppresses repeats
    /// * `max_capacity` - Maximum number of tracked (identity, kind) pairs
    #[must_use]
    pub fn new(cooldown: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(cooldown)
            .build();

        Self {
            cache,
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether a notice of `kind` may be sent to `identity` now.
    ///
    /// Silenced attempts are counted; every 100th is logged.
    pub async fn should_send(&self, identity: &Identity, kind: &'static str) -> bool {
        if self.cache.get(&(identity.clone(), kind)).await.is_none() {
            return true;
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(100) {
            debug!(
                silenced = count,
                identity = %identity,
                kind,
                "🔇 Silenced repeated notices"
            );
        }

        false
    }

    /// Start the cooldown for `kind` after a successful delivery.
    pub async fn mark_sent(&self, identity: &Identity, kind: &'static str) {
        self.cache.insert((identity.clone(), kind), ()).await;
    }

    /// Current number of entries in the cache.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Total number of silenced notices.
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }
}

/// Whether repeats of this notice are suppressed during the cooldown.
///
/// Faults and lookup failures are always reported, and handler replies are
/// never touched.
#[must_use]
pub const fn is_silenceable(notice: &Notice) -> bool {
    matches!(
        notice,
        Notice::Throttled { .. } | Notice::Unregistered | Notice::Blocked
    )
}

/// [`Notifier`] decorator that applies a [`NoticeCooldown`]
pub struct CooldownNotifier<N> {
    inner: N,
    cooldown: NoticeCooldown,
}

impl<N: Notifier> CooldownNotifier<N> {
    /// Wrap `inner`.
    #[must_use]
    pub const fn new(inner: N, cooldown: NoticeCooldown) -> Self {
        Self { inner, cooldown }
    }

    /// The cooldown tracker in use.
    #[must_use]
    pub const fn cooldown(&self) -> &NoticeCooldown {
        &self.cooldown
    }
}

#[async_trait]
impl<N: Notifier> Notifier for CooldownNotifier<N> {
    async fn reply(&self, update: &InboundUpdate, notice: Notice) -> Result<(), NotifyError> {
        if !is_silenceable(&notice) {
            return self.inner.reply(update, notice).await;
        }

        let kind = notice.kind();
        if !self.cooldown.should_send(&update.identity, kind).await {
            return Ok(());
        }

        self.inner.reply(update, notice).await?;
        self.cooldown.mark_sent(&update.identity, kind).await;
        Ok(())
    }
}
