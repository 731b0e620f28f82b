use crate::bot::handlers::{Command, MarketHandler};
use crate::bot::{update, CooldownNotifier, NoticeCooldown, TelegramNotifier};
use crate::config::BotSettings;
use anyhow::{Context, Result};
use marketbot_core::Pipeline;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

/// Run the Telegram transport runtime.
///
/// Returns after the dispatcher shuts down (Ctrl-C) and the rate limit
/// reaper has stopped.
///
/// # Errors
///
/// Returns an error if the bot identity cannot be fetched from Telegram or
/// the backend client cannot be created.
pub async fn run_bot(settings: Arc<BotSettings>) -> Result<()> {
    let bot = Bot::new(settings.telegram.telegram_token.clone());

    let me = bot
        .get_me()
        .await
        .context("Failed to fetch bot identity from Telegram")?;
    let bot_username = me.username().to_string();
    info!("Authorized as @{}", bot_username);

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {}", e);
    }

    let gate = settings
        .pipeline
        .auth_gate()
        .context("Failed to initialize user directory")?;
    info!(
        backend_url = %settings.pipeline.backend_url,
        lookup_timeout_ms = settings.pipeline.user_lookup_timeout_ms,
        "User directory initialized"
    );

    let limiter = settings.pipeline.rate_limiter();
    let reaper = limiter.start_reaper();

    let notifier = CooldownNotifier::new(
        TelegramNotifier::new(bot.clone()),
        init_notice_cooldown(&settings),
    );
    let pipeline = Arc::new(Pipeline::standard(
        limiter,
        gate,
        Arc::new(MarketHandler::new(bot_username)),
        Arc::new(notifier),
    ));

    info!("Bot is running...");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![pipeline])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Dispatcher stopped, shutting down");
    reaper.stop().await;
    Ok(())
}

fn init_notice_cooldown(settings: &BotSettings) -> NoticeCooldown {
    let cooldown = settings.telegram.notice_cooldown();
    let capacity = settings.telegram.notice_cooldown_capacity;

    info!(
        "Initializing NoticeCooldown (cooldown: {}s, max_size: {})",
        cooldown.as_secs(),
        capacity
    );

    NoticeCooldown::new(cooldown, capacity)
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(Update::filter_message().endpoint(handle_message))
}

async fn handle_message(
    msg: Message,
    pipeline: Arc<Pipeline>,
) -> Result<(), teloxide::RequestError> {
    match update::from_message(&msg) {
        Some(inbound) => {
            pipeline.dispatch(inbound).await;
        }
        None => debug!(chat_id = msg.chat.id.0, "Ignoring message without a sender"),
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    pipeline: Arc<Pipeline>,
) -> Result<(), teloxide::RequestError> {
    // Stop the client-side spinner; the actual answer arrives as a message
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {}", e);
    }

    pipeline.dispatch(update::from_callback(&q)).await;
    respond(())
}
