/// Marketplace command handler
pub mod handlers;
/// Repeat notice flood protection
pub mod notice_cooldown;
/// Telegram notice delivery
pub mod notifier;
/// Telegram update conversion
pub mod update;

pub use notice_cooldown::{CooldownNotifier, NoticeCooldown};
pub use notifier::TelegramNotifier;
