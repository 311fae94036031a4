//! Command router - maps inbound chat text to one-shot handlers or the
//! conversation engine

use crate::conversation::{ConversationEngine, EntryPoint};
use crate::error::Error;
use crate::logstore::LogStore;
use crate::replies;
use crate::subscribers::SubscriberRegistry;
use crate::tasks::TaskManager;
use crate::ChatId;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{error, info, warn};

/// `/name`, optional `@botname`, optional arguments
static COMMAND_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^/([A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s+(.*))?$").expect("Invalid command regex")
});

/// Date argument format for `/summarydate`
pub const USER_DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    StopReminder,
    AddTask,
    MyTasks,
    DoneTask(Option<String>),
    Eat,
    Drink,
    Reflect,
    Summary,
    SummaryDate(Option<String>),
    Clear,
    Cancel,
    Unknown(String),
}

/// Name and description for every command, in menu order
pub const COMMAND_MENU: &[(&str, &str)] = &[
    ("start", "начать и включить напоминания"),
    ("addtask", "добавить задачу"),
    ("mytasks", "мои задачи на сегодня"),
    ("donetask", "отметить задачу: /donetask номер"),
    ("eat", "записать приём пищи"),
    ("drink", "записать выпитую воду"),
    ("reflect", "записать мысли о дне"),
    ("summary", "сводка за сегодня"),
    ("summarydate", "сводка за дату: /summarydate ДД.ММ.ГГГГ"),
    ("clear", "удалить записи за сегодня"),
    ("stopreminder", "отключить напоминания"),
    ("cancel", "отменить текущее действие"),
];

/// An inbound message, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Command),
    Text(String),
}

impl Inbound {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(caps) = COMMAND_PATTERN.captures(trimmed) else {
            return Inbound::Text(text.to_string());
        };

        let name = caps
            .get(1)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();
        let first_arg = caps
            .get(2)
            .and_then(|m| m.as_str().split_whitespace().next())
            .map(str::to_string);

        let command = match name.as_str() {
            "start" => Command::Start,
            "stopreminder" => Command::StopReminder,
            "addtask" => Command::AddTask,
            "mytasks" => Command::MyTasks,
            "donetask" => Command::DoneTask(first_arg),
            "eat" => Command::Eat,
            "drink" => Command::Drink,
            "reflect" => Command::Reflect,
            "summary" => Command::Summary,
            "summarydate" => Command::SummaryDate(first_arg),
            "clear" => Command::Clear,
            "cancel" => Command::Cancel,
            _ => Command::Unknown(name),
        };
        Inbound::Command(command)
    }
}

/// Dispatches inbound messages for every chat
pub struct Router {
    log_store: Arc<LogStore>,
    tasks: Arc<TaskManager>,
    subscribers: Arc<SubscriberRegistry>,
    conversations: Arc<ConversationEngine>,
}

impl Router {
    pub fn new(
        log_store: Arc<LogStore>,
        tasks: Arc<TaskManager>,
        subscribers: Arc<SubscriberRegistry>,
        conversations: Arc<ConversationEngine>,
    ) -> Self {
        Self {
            log_store,
            tasks,
            subscribers,
            conversations,
        }
    }

    /// Handle one inbound message; `None` means no reply is sent
    pub fn handle(&self, chat_id: ChatId, text: &str) -> Option<String> {
        match Inbound::parse(text) {
            Inbound::Command(command) => self.dispatch(chat_id, command),
            Inbound::Text(text) => self.conversations.handle_text(chat_id, &text),
        }
    }

    /// [`handle`](Self::handle) on tokio's blocking pool, keeping file I/O
    /// and std locks off the async workers. A panicking handler yields no reply.
    pub async fn handle_blocking(self: &Arc<Self>, chat_id: ChatId, text: String) -> Option<String> {
        let router = self.clone();
        match tokio::task::spawn_blocking(move || router.handle(chat_id, &text)).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Handler for chat {} failed: {}", chat_id, e);
                None
            }
        }
    }

    /// One-shot commands leave a pending conversation untouched
    pub fn dispatch(&self, chat_id: ChatId, command: Command) -> Option<String> {
        let reply = match command {
            Command::Start => self.start(chat_id),
            Command::StopReminder => self.stop_reminder(chat_id),
            Command::AddTask => self.conversations.enter(chat_id, EntryPoint::AddTask).to_string(),
            Command::Eat => self.conversations.enter(chat_id, EntryPoint::Eat).to_string(),
            Command::Drink => self.conversations.enter(chat_id, EntryPoint::Drink).to_string(),
            Command::Reflect => self.conversations.enter(chat_id, EntryPoint::Reflect).to_string(),
            Command::Cancel => self.conversations.cancel(chat_id).to_string(),
            Command::MyTasks => self.my_tasks(chat_id),
            Command::DoneTask(arg) => self.done_task(chat_id, arg.as_deref()),
            Command::Summary => self.summary(chat_id),
            Command::SummaryDate(arg) => self.summary_date(chat_id, arg.as_deref()),
            Command::Clear => self.clear(chat_id),
            Command::Unknown(_) => return None,
        };
        Some(reply)
    }

    fn start(&self, chat_id: ChatId) -> String {
        match self.subscribers.subscribe(chat_id) {
            Ok(_) => replies::START_GREETING.to_string(),
            Err(e) => storage_error(chat_id, "subscribe", e),
        }
    }

    fn stop_reminder(&self, chat_id: ChatId) -> String {
        match self.subscribers.unsubscribe(chat_id) {
            Ok(()) => replies::REMINDERS_OFF.to_string(),
            Err(Error::NotSubscribed(_)) => replies::REMINDERS_ALREADY_OFF.to_string(),
            Err(e) => storage_error(chat_id, "unsubscribe", e),
        }
    }

    fn my_tasks(&self, chat_id: ChatId) -> String {
        match self.tasks.list_tasks(chat_id) {
            Ok(text) => text,
            Err(e) => storage_error(chat_id, "list tasks", e),
        }
    }

    fn done_task(&self, chat_id: ChatId, arg: Option<&str>) -> String {
        match self.tasks.mark_done(chat_id, arg.unwrap_or("")) {
            Ok(task) => replies::task_done(&task.name),
            Err(Error::NoTasks) => replies::NO_TASKS_TO_MARK.to_string(),
            Err(Error::InvalidInput(_)) => replies::DONETASK_USAGE.to_string(),
            Err(Error::IndexOutOfRange { .. }) => replies::BAD_TASK_NUMBER.to_string(),
            Err(e) => storage_error(chat_id, "mark task done", e),
        }
    }

    fn summary(&self, chat_id: ChatId) -> String {
        match self.log_store.require_records(chat_id, crate::today()) {
            Ok(summary) => replies::summary_today(&summary),
            Err(Error::NoRecords) => replies::SUMMARY_EMPTY.to_string(),
            Err(e) => storage_error(chat_id, "read summary", e),
        }
    }

    fn summary_date(&self, chat_id: ChatId, arg: Option<&str>) -> String {
        let Some(date_text) = arg else {
            return replies::SUMMARYDATE_USAGE.to_string();
        };
        let date = match parse_user_date(date_text) {
            Ok(date) => date,
            Err(_) => return replies::SUMMARYDATE_FORMAT_ERROR.to_string(),
        };

        match self.log_store.require_records(chat_id, date) {
            Ok(summary) => replies::summary_for_date(date_text, &summary),
            Err(Error::NoRecords) => replies::no_records_for(date_text),
            Err(e) => storage_error(chat_id, "read summary", e),
        }
    }

    fn clear(&self, chat_id: ChatId) -> String {
        match self.log_store.clear_today(chat_id) {
            Ok(removed) => {
                info!("Cleared {} log files for chat {}", removed, chat_id);
                replies::CLEARED.to_string()
            }
            Err(e) => {
                error!("Failed to clear logs for chat {}: {}", chat_id, e);
                replies::clear_failed(&e)
            }
        }
    }
}

/// Parse `DD.MM.YYYY`
pub fn parse_user_date(text: &str) -> crate::Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), USER_DATE_FORMAT)
        .map_err(|e| Error::InvalidFormat(format!("date {:?}: {}", text, e)))
}

fn storage_error(chat_id: ChatId, action: &str, err: Error) -> String {
    if err.is_user_input() {
        warn!("Unexpected rejection trying to {} for chat {}: {}", action, chat_id, err);
    } else {
        error!("Failed to {} for chat {}: {}", action, chat_id, err);
    }
    replies::STORAGE_ERROR.to_string()
}
