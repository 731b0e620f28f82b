//! Telegram delivery of pipeline notices.

use async_trait::async_trait;
use marketbot_core::{InboundUpdate, Notice, Notifier, NotifyError};
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use tracing::debug;

/// Sends every notice as an HTML message to the update's chat.
///
/// One `sendMessage` call per reply; failures are returned to the caller,
/// which decides whether to log or propagate them.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    /// Create a notifier over `bot`.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn reply(&self, update: &InboundUpdate, notice: Notice) -> Result<(), NotifyError> {
        let kind = notice.kind();
        self.bot
            .send_message(ChatId(update.chat_id), notice.render())
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| NotifyError::Transport(format!("Telegram send error: {e}")))?;

        debug!(chat_id = update.chat_id, kind, "Notice delivered");
        Ok(())
    }
}
