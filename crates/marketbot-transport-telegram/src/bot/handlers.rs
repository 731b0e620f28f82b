//! Marketplace commands for authorized users.

use anyhow::Result;
use async_trait::async_trait;
use marketbot_core::{Handler, Notice, Payload, PipelineContext, User};
use teloxide::utils::command::BotCommands;
use tracing::debug;

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Greet the user
    #[command(description = "Start the bot.")]
    Start,
    /// Show the account balance
    #[command(description = "Show your balance.")]
    Balance,
    /// Show the account profile
    #[command(description = "Show your profile.")]
    Profile,
    /// Show the referral code
    #[command(description = "Show your referral code.")]
    Referral,
    /// List commands
    #[command(description = "Show this help.")]
    Help,
}

impl Command {
    /// Parse message text or callback data.
    ///
    /// Callback data is the bare command name (`balance`); message text is a
    /// regular `/command`, optionally addressed as `/command@bot`.
    #[must_use]
    pub fn from_payload(payload: &Payload, bot_username: &str) -> Option<Self> {
        match payload {
            Payload::Text(text) => Self::parse(text.trim(), bot_username).ok(),
            Payload::Callback(data) => {
                Self::parse(&format!("/{}", data.trim()), bot_username).ok()
            }
        }
    }
}

/// Terminal handler answering marketplace commands from the user record
pub struct MarketHandler {
    bot_username: String,
}

impl MarketHandler {
    /// Create a handler for the bot with the given username.
    #[must_use]
    pub fn new(bot_username: impl Into<String>) -> Self {
        Self {
            bot_username: bot_username.into(),
        }
    }
}

fn escaped_field(user: &User, name: &str) -> Option<String> {
    user.field_text(name)
        .map(|value| html_escape::encode_text(&value).into_owned())
}

fn shown_name(user: &User) -> String {
    user.username.as_deref().map_or_else(
        || format!("#{}", user.id),
        |name| html_escape::encode_text(name).into_owned(),
    )
}

fn help_text() -> String {
    Command::descriptions().to_string()
}

fn start_text(user: &User) -> String {
    format!(
        "👋 Welcome, <b>{}</b>!\n\n{}",
        shown_name(user),
        help_text()
    )
}

fn balance_text(user: &User) -> String {
    let balance = escaped_field(user, "balance").unwrap_or_else(|| "0".to_string());
    format!("💰 Balance: <b>{balance}</b>")
}

fn profile_text(user: &User) -> String {
    let balance = escaped_field(user, "balance").unwrap_or_else(|| "0".to_string());
    format!(
        "👤 <b>Profile</b>\n\nID: <code>{}</code>\nName: {}\nBalance: {balance}",
        user.id,
        shown_name(user)
    )
}

fn referral_text(user: &User) -> String {
    escaped_field(user, "referralCode").map_or_else(
        || "🔗 You have no referral code yet.".to_string(),
        |code| format!("🔗 Your referral code: <code>{code}</code>"),
    )
}

/// Reply text for `command`, or the help text when nothing matched.
#[must_use]
pub fn render_reply(command: Option<&Command>, user: &User) -> String {
    match command {
        Some(Command::Start) => start_text(user),
        Some(Command::Balance) => balance_text(user),
        Some(Command::Profile) => profile_text(user),
        Some(Command::Referral) => referral_text(user),
        Some(Command::Help) | None => help_text(),
    }
}

#[async_trait]
impl Handler for MarketHandler {
    async fn handle(&self, ctx: &mut PipelineContext) -> Result<()> {
        let Some(user) = ctx.user() else {
            anyhow::bail!("Handler reached without an authorized user");
        };

        let command = Command::from_payload(&ctx.update().payload, &self.bot_username);
        debug!(identity = %ctx.identity(), command = ?command, "Handling update");

        let text = render_reply(command.as_ref(), user);
        ctx.reply(Notice::Text(text)).await?;
        Ok(())
    }
}
