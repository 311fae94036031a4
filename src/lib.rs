//! Habit Assistant - Rust chat daemon
//!
//! Tracks meals, water and reflections per chat and day, keeps a per-chat
//! task list, and broadcasts water reminders and a morning quote to
//! subscribed chats over the Telegram Bot API.

pub mod advice;
pub mod config;
pub mod conversation;
pub mod error;
pub mod locks;
pub mod logstore;
pub mod reminders;
pub mod replies;
pub mod router;
pub mod scheduler;
pub mod subscribers;
pub mod tasks;
pub mod telegram;
pub mod transport;

pub use error::{Error, Result};

/// Transport chat identifier; negative for group chats
pub type ChatId = i64;

/// Transport message identifier
pub type MessageId = i64;

/// Current calendar date in local time
pub fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}
