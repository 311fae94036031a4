//! Scheduled broadcasts to subscribed chats
//!
//! - Water reminder: on startup, then every `water_interval_secs`. Each
//!   delivered reminder is deleted `reminder_delete_after_secs` later.
//! - Morning quote: daily on `morning_quote_cron`, one random quote.
//!
//! Both iterate a snapshot of the subscriber set. A failed send or delete is
//! logged and skipped; it never stops the broadcast or the timer.

use crate::config::Config;
use crate::error::Result;
use crate::replies::{self, MORNING_QUOTES, WATER_REMINDER};
use crate::scheduler::{parse_schedule, Scheduler};
use crate::subscribers::SubscriberRegistry;
use crate::transport::Transport;
use crate::{ChatId, MessageId};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: Vec<(ChatId, MessageId)>,
    pub failed: Vec<ChatId>,
}

/// Send `text` to each chat in order, recording rather than propagating failures
pub async fn broadcast(transport: &dyn Transport, chats: &[ChatId], text: &str) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for &chat_id in chats {
        match transport.send_message(chat_id, text).await {
            Ok(message_id) => report.sent.push((chat_id, message_id)),
            Err(e) => {
                warn!("Broadcast to chat {} via {} failed: {}", chat_id, transport.name(), e);
                report.failed.push(chat_id);
            }
        }
    }
    report
}

/// Pick one morning quote uniformly at random
pub fn pick_quote() -> &'static str {
    MORNING_QUOTES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
}

pub struct Reminders {
    transport: Arc<dyn Transport>,
    subscribers: Arc<SubscriberRegistry>,
    scheduler: Arc<Scheduler>,
    delete_after: Duration,
}

impl Reminders {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        subscribers: Arc<SubscriberRegistry>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            transport,
            subscribers,
            scheduler,
            delete_after: Duration::from_secs(config.reminder_delete_after_secs),
        }
    }

    /// Broadcast the water reminder and queue a deletion for every delivered message
    pub async fn send_water_reminder(&self) -> BroadcastReport {
        let chats = self.subscribers.snapshot();
        let report = broadcast(self.transport.as_ref(), &chats, WATER_REMINDER).await;

        for &(chat_id, message_id) in &report.sent {
            let transport = self.transport.clone();
            self.scheduler.once(
                &format!("delete-reminder-{}-{}", chat_id, message_id),
                self.delete_after,
                async move {
                    match transport.delete_message(chat_id, message_id).await {
                        Ok(()) => debug!("Deleted reminder {} in chat {}", message_id, chat_id),
                        Err(e) => warn!(
                            "Failed to delete reminder {} in chat {}: {}",
                            message_id, chat_id, e
                        ),
                    }
                },
            );
        }

        info!(
            "Water reminder: {} sent, {} failed",
            report.sent.len(),
            report.failed.len()
        );
        report
    }

    pub async fn send_morning_quote(&self) -> BroadcastReport {
        let text = replies::morning_quote(pick_quote());
        let chats = self.subscribers.snapshot();
        let report = broadcast(self.transport.as_ref(), &chats, &text).await;
        info!(
            "Morning quote: {} sent, {} failed",
            report.sent.len(),
            report.failed.len()
        );
        report
    }

    /// Register both recurring jobs on the scheduler
    pub fn start(self: &Arc<Self>, config: &Config) -> Result<()> {
        let schedule = parse_schedule(&config.morning_quote_cron)?;

        let water = self.clone();
        self.scheduler.every(
            "water-reminder",
            Duration::ZERO,
            Duration::from_secs(config.water_interval_secs),
            move || {
                let water = water.clone();
                async move {
                    water.send_water_reminder().await;
                }
            },
        );

        let quotes = self.clone();
        self.scheduler.daily("morning-quote", schedule, move || {
            let quotes = quotes.clone();
            async move {
                quotes.send_morning_quote().await;
            }
        });

        Ok(())
    }
}
