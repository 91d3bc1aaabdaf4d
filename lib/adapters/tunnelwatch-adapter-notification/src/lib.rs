//! Telegram Bot API notification channel and inbound update parsing.

pub mod telegram;
pub mod update;

pub use telegram::TelegramNotifier;
pub use update::{SECRET_HEADER, Update, callback_press};
