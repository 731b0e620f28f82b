#![allow(dead_code)]

use async_trait::async_trait;
use marketbot_core::{
    Handler, Identity, InboundUpdate, LookupError, Notice, Notifier, NotifyError,
    PipelineContext, User, UserDirectory,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn user(id: i64, is_active: bool) -> User {
    User {
        id,
        is_active,
        username: None,
        fields: serde_json::Map::new(),
    }
}

/// Directory answering from a fixed table; identities not in it are unknown.
#[derive(Default)]
pub struct MapDirectory {
    users: HashMap<Identity, User>,
    failing: Vec<Identity>,
    pub lookups: AtomicUsize,
}

impl MapDirectory {
    pub fn with_user(mut self, identity: &str, user: User) -> Self {
        self.users.insert(Identity::from(identity), user);
        self
    }

    pub fn failing_for(mut self, identity: &str) -> Self {
        self.failing.push(Identity::from(identity));
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for MapDirectory {
    async fn find_user_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<User>, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(identity) {
            return Err(LookupError::Transport("connection refused".to_string()));
        }
        Ok(self.users.get(identity).cloned())
    }
}

/// Notifier recording `(identity, notice)` pairs.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Identity, Notice)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(Identity, Notice)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, identity: &str) -> Vec<Notice> {
        let identity = Identity::from(identity);
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == identity)
            .map(|(_, notice)| notice)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn reply(&self, update: &InboundUpdate, notice: Notice) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((update.identity.clone(), notice));
        }
        Ok(())
    }
}

/// Handler that replies "ok" to everyone except the listed identities,
/// for which it fails.
#[derive(Default)]
pub struct EchoHandler {
    fail_for: Vec<Identity>,
    pub calls: AtomicUsize,
}

impl EchoHandler {
    pub fn failing_for(identity: &str) -> Self {
        Self {
            fail_for: vec![Identity::from(identity)],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, ctx: &mut PipelineContext) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_for.contains(ctx.identity()) {
            anyhow::bail!("balance service returned garbage");
        }
        // Let a concurrent invocation interleave here
        tokio::task::yield_now().await;
        let user = ctx
            .user()
            .ok_or_else(|| anyhow::anyhow!("handler reached without a user"))?;
        ctx.reply(Notice::Text(format!("ok {}", user.id))).await?;
        Ok(())
    }
}
