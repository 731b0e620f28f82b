//! Conversion from Telegram updates to pipeline updates.

use marketbot_core::{Identity, InboundUpdate};
use teloxide::types::{CallbackQuery, Message, User};

/// Username if set, otherwise the first name.
#[must_use]
pub fn display_name(user: &User) -> String {
    user.username
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| user.first_name.clone())
}

fn identity(user: &User) -> Identity {
    Identity::from(user.id.0)
}

/// Convert a message. Returns `None` for messages without a sender
/// (channel posts, service messages).
///
/// Text or caption becomes the payload; media-only messages carry an empty
/// text so the handler can still answer them.
#[must_use]
pub fn from_message(msg: &Message) -> Option<InboundUpdate> {
    let user = msg.from.as_ref()?;
    let text = msg.text().or_else(|| msg.caption()).unwrap_or_default();

    Some(
        InboundUpdate::text(identity(user), msg.chat.id.0, text)
            .with_display_name(display_name(user)),
    )
}

/// Convert a callback query.
///
/// Replies go to the chat of the message carrying the keyboard, or to the
/// sender's private chat when that message is unavailable.
#[must_use]
pub fn from_callback(q: &CallbackQuery) -> InboundUpdate {
    let chat_id = q
        .message
        .as_ref()
        .map_or_else(|| q.from.id.0.cast_signed(), |m| m.chat().id.0);

    InboundUpdate::callback(
        identity(&q.from),
        chat_id,
        q.data.clone().unwrap_or_default(),
    )
    .with_display_name(display_name(&q.from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketbot_core::Payload;
    use serde_json::json;

    fn sender() -> serde_json::Value {
        json!({"id": 42, "is_bot": false, "first_name": "Alice"})
    }

    #[test]
    fn test_display_name_prefers_username() -> Result<(), serde_json::Error> {
        let plain: User = serde_json::from_value(sender())?;
        assert_eq!(display_name(&plain), "Alice");

        let named: User = serde_json::from_value(
            json!({"id": 42, "is_bot": false, "first_name": "Alice", "username": "alice"}),
        )?;
        assert_eq!(display_name(&named), "alice");
        Ok(())
    }

    #[test]
    fn test_text_message_converts() -> Result<(), serde_json::Error> {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 1,
            "date": 1_700_000_000,
            "chat": {"id": 42, "type": "private", "first_name": "Alice"},
            "from": sender(),
            "text": "/balance"
        }))?;

        let update = from_message(&msg);
        let Some(update) = update else {
            panic!("message with a sender must convert");
        };
        assert_eq!(update.identity.as_str(), "42");
        assert_eq!(update.chat_id, 42);
        assert_eq!(update.payload, Payload::Text("/balance".to_string()));
        assert_eq!(update.display_name.as_deref(), Some("Alice"));
        Ok(())
    }

    #[test]
    fn test_callback_without_message_replies_privately() -> Result<(), serde_json::Error> {
        let q: CallbackQuery = serde_json::from_value(json!({
            "id": "q1",
            "from": sender(),
            "chat_instance": "ci",
            "data": "balance"
        }))?;

        let update = from_callback(&q);
        assert_eq!(update.chat_id, 42);
        assert_eq!(update.payload, Payload::Callback("balance".to_string()));
        Ok(())
    }
}
