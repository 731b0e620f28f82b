//! Testing helpers and fakes.
//!
//! Provides canned users plus a handler and a notifier that record what
//! reached them.

use crate::notify::{Notice, Notifier, NotifyError};
use crate::pipeline::{Handler, PipelineContext};
use crate::update::InboundUpdate;
use crate::users::User;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// An active user with a balance field.
#[must_use]
pub fn active_user(id: i64) -> User {
    let mut fields = serde_json::Map::new();
    fields.insert("balance".to_string(), serde_json::json!("100.00"));
    User {
        id,
        is_active: true,
        username: Some(format!("user{id}")),
        fields,
    }
}

/// A blocked user.
#[must_use]
pub fn inactive_user(id: i64) -> User {
    User {
        is_active: false,
        ..active_user(id)
    }
}

/// Handler that succeeds and records the user it was given.
#[derive(Default)]
pub struct OkHandler {
    calls: AtomicUsize,
    users: Mutex<Vec<i64>>,
}

impl OkHandler {
    /// Number of times the handler ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids of the users seen in the context, in call order.
    pub fn seen_users(&self) -> Vec<i64> {
        self.users.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Handler for OkHandler {
    async fn handle(&self, ctx: &mut PipelineContext) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let (Some(user), Ok(mut users)) = (ctx.user(), self.users.lock()) {
            users.push(user.id);
        }
        Ok(())
    }
}

/// Notifier that records every notice and always succeeds.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    /// Notices sent so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn reply(&self, _update: &InboundUpdate, notice: Notice) -> Result<(), NotifyError> {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
        Ok(())
    }
}
