//! Conversation engine - per-chat state machine for multi-step commands
//!
//! An entry command moves a chat from `Idle` into one of the `Awaiting*`
//! states and sends a prompt. The next plain message is the answer: it is
//! validated, written, confirmed, and the chat returns to `Idle`. A new entry
//! command always replaces whatever was pending.

use crate::advice::Advisor;
use crate::error::Error;
use crate::logstore::{FoodEntry, LogStore};
use crate::replies;
use crate::tasks::TaskManager;
use crate::ChatId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

/// Where a chat is in a multi-step command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingTaskText,
    AwaitingMealText,
    AwaitingWaterAmount,
    AwaitingReflectionText,
}

/// Commands that open a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    AddTask,
    Eat,
    Drink,
    Reflect,
}

impl EntryPoint {
    pub fn awaiting(self) -> ConversationState {
        match self {
            EntryPoint::AddTask => ConversationState::AwaitingTaskText,
            EntryPoint::Eat => ConversationState::AwaitingMealText,
            EntryPoint::Drink => ConversationState::AwaitingWaterAmount,
            EntryPoint::Reflect => ConversationState::AwaitingReflectionText,
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            EntryPoint::AddTask => replies::ASK_TASK,
            EntryPoint::Eat => replies::ASK_MEAL,
            EntryPoint::Drink => replies::ASK_WATER,
            EntryPoint::Reflect => replies::ASK_REFLECTION,
        }
    }
}

/// Result of feeding one answer into the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConversationState,
    pub reply: String,
}

impl Transition {
    fn to(next: ConversationState, reply: impl Into<String>) -> Self {
        Self {
            next,
            reply: reply.into(),
        }
    }

    fn done(reply: impl Into<String>) -> Self {
        Self::to(ConversationState::Idle, reply)
    }
}

pub struct ConversationEngine {
    /// Chats absent from the map are `Idle`
    states: Mutex<HashMap<ChatId, ConversationState>>,
    log_store: Arc<LogStore>,
    tasks: Arc<TaskManager>,
    advisor: Arc<dyn Advisor>,
}

impl ConversationEngine {
    pub fn new(log_store: Arc<LogStore>, tasks: Arc<TaskManager>, advisor: Arc<dyn Advisor>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            log_store,
            tasks,
            advisor,
        }
    }

    pub fn state(&self, chat_id: ChatId) -> ConversationState {
        self.states().get(&chat_id).copied().unwrap_or_default()
    }

    fn set_state(&self, chat_id: ChatId, state: ConversationState) {
        let mut states = self.states();
        if state == ConversationState::Idle {
            states.remove(&chat_id);
        } else {
            states.insert(chat_id, state);
        }
    }

    /// Start (or restart) a conversation; returns the prompt
    pub fn enter(&self, chat_id: ChatId, entry: EntryPoint) -> &'static str {
        let previous = self.state(chat_id);
        if previous != ConversationState::Idle {
            debug!("Chat {} re-entered {:?}, dropping {:?}", chat_id, entry, previous);
        }
        self.set_state(chat_id, entry.awaiting());
        entry.prompt()
    }

    /// Back to `Idle` from anywhere; acknowledged even when already idle
    pub fn cancel(&self, chat_id: ChatId) -> &'static str {
        self.set_state(chat_id, ConversationState::Idle);
        replies::CANCELLED
    }

    /// Feed a plain (non-command) message. `None` when the chat is idle.
    pub fn handle_text(&self, chat_id: ChatId, text: &str) -> Option<String> {
        let state = self.state(chat_id);
        if state == ConversationState::Idle {
            return None;
        }

        let transition = self.step(chat_id, state, text);
        debug!("Chat {}: {:?} -> {:?}", chat_id, state, transition.next);
        self.set_state(chat_id, transition.next);
        Some(transition.reply)
    }

    fn step(&self, chat_id: ChatId, state: ConversationState, text: &str) -> Transition {
        match state {
            ConversationState::Idle => Transition::done(String::new()),
            ConversationState::AwaitingTaskText => match self.tasks.add_task(chat_id, text) {
                Ok(task) => Transition::done(replies::task_added(&task.name)),
                // Empty task text gets another attempt
                Err(Error::EmptyInput) => Transition::to(state, replies::TASK_EMPTY),
                Err(e) => storage_failure(chat_id, "add task", e),
            },
            ConversationState::AwaitingMealText => {
                let meal = match FoodEntry::parse(text) {
                    Ok(meal) => meal,
                    Err(_) => return Transition::done(replies::MEAL_FORMAT_ERROR),
                };
                match self.log_store.append_food(chat_id, &meal) {
                    Ok(()) => Transition::done(replies::meal_saved(&self.advisor.meal_advice(&meal))),
                    Err(e) => storage_failure(chat_id, "save meal", e),
                }
            }
            ConversationState::AwaitingWaterAmount => match self.log_store.append_water_text(chat_id, text) {
                Ok(amount) => Transition::done(replies::water_saved(amount)),
                Err(Error::InvalidFormat(_)) => Transition::done(replies::WATER_FORMAT_ERROR),
                Err(e) => storage_failure(chat_id, "save water", e),
            },
            ConversationState::AwaitingReflectionText => {
                let text = text.trim();
                match self.log_store.append_reflection(chat_id, text) {
                    Ok(()) => Transition::done(replies::reflection_saved(
                        &self.advisor.reflection_feedback(text),
                    )),
                    Err(e) => storage_failure(chat_id, "save reflection", e),
                }
            }
        }
    }

    /// Number of chats with a pending conversation
    pub fn active_count(&self) -> usize {
        self.states().len()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<ChatId, ConversationState>> {
        self.states.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn storage_failure(chat_id: ChatId, action: &str, err: Error) -> Transition {
    error!("Failed to {} for chat {}: {}", action, chat_id, err);
    Transition::done(replies::STORAGE_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::DisabledAdvisor;
    use crate::config::Config;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        engine: ConversationEngine,
        log_store: Arc<LogStore>,
        tasks: Arc<TaskManager>,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_test(temp_dir.path());
        let log_store = Arc::new(LogStore::new(&config));
        let tasks = Arc::new(TaskManager::new(&config));
        let engine = ConversationEngine::new(log_store.clone(), tasks.clone(), Arc::new(DisabledAdvisor));
        Fixture {
            _temp_dir: temp_dir,
            engine,
            log_store,
            tasks,
        }
    }

    #[test]
    fn test_idle_ignores_text() {
        let f = fixture();
        assert_eq!(f.engine.handle_text(1, "hello"), None);
        assert_eq!(f.engine.state(1), ConversationState::Idle);
    }

    #[test]
    fn test_add_task_flow() {
        let f = fixture();
        assert_eq!(f.engine.enter(1, EntryPoint::AddTask), replies::ASK_TASK);
        assert_eq!(f.engine.state(1), ConversationState::AwaitingTaskText);

        let reply = f.engine.handle_text(1, "  Buy milk ").unwrap();
        assert_eq!(reply, replies::task_added("Buy milk"));
        assert_eq!(f.engine.state(1), ConversationState::Idle);
        assert_eq!(f.tasks.load(1).unwrap()[0].name, "Buy milk");
    }

    #[test]
    fn test_empty_task_reprompts() {
        let f = fixture();
        f.engine.enter(1, EntryPoint::AddTask);

        let reply = f.engine.handle_text(1, "   ").unwrap();
        assert_eq!(reply, replies::TASK_EMPTY);
        assert_eq!(f.engine.state(1), ConversationState::AwaitingTaskText);

        f.engine.handle_text(1, "Second try").unwrap();
        assert_eq!(f.engine.state(1), ConversationState::Idle);
        assert_eq!(f.tasks.load(1).unwrap().len(), 1);
    }

    #[test]
    fn test_bad_meal_ends_conversation() {
        let f = fixture();
        f.engine.enter(1, EntryPoint::Eat);

        let reply = f.engine.handle_text(1, "no separator").unwrap();
        assert_eq!(reply, replies::MEAL_FORMAT_ERROR);
        assert_eq!(f.engine.state(1), ConversationState::Idle);
        assert!(f.log_store.today_summary(1).unwrap().food.is_empty());

        // The retry is plain text again, not a meal
        assert_eq!(f.engine.handle_text(1, "завтрак - овсянка"), None);
    }

    #[test]
    fn test_meal_saved_with_advice() {
        let f = fixture();
        f.engine.enter(1, EntryPoint::Eat);

        let reply = f.engine.handle_text(1, "завтрак - овсянка").unwrap();
        assert!(reply.contains("Приём пищи записан"));
        assert!(reply.contains("недоступен"));

        let summary = f.log_store.today_summary(1).unwrap();
        assert_eq!(summary.food[0].label, "завтрак");
        assert_eq!(summary.food[0].description, "овсянка");
    }

    #[test]
    fn test_bad_water_ends_conversation() {
        let f = fixture();
        f.engine.enter(1, EntryPoint::Drink);

        let reply = f.engine.handle_text(1, "not_a_number").unwrap();
        assert_eq!(reply, replies::WATER_FORMAT_ERROR);
        assert_eq!(f.engine.state(1), ConversationState::Idle);
        assert_eq!(f.log_store.today_summary(1).unwrap().water_entries, 0);
    }

    #[test]
    fn test_water_saved() {
        let f = fixture();
        f.engine.enter(1, EntryPoint::Drink);
        assert_eq!(f.engine.handle_text(1, "250").unwrap(), replies::water_saved(250));
        assert_eq!(f.log_store.today_summary(1).unwrap().water_ml, 250);
    }

    #[test]
    fn test_empty_reflection_accepted() {
        let f = fixture();
        f.engine.enter(1, EntryPoint::Reflect);

        let reply = f.engine.handle_text(1, "   ").unwrap();
        assert!(reply.contains("Рефлексия записана"));
        assert_eq!(f.log_store.today_summary(1).unwrap().reflections, vec![String::new()]);
    }

    #[test]
    fn test_reentry_last_wins() {
        let f = fixture();
        f.engine.enter(1, EntryPoint::Eat);
        f.engine.enter(1, EntryPoint::Drink);
        assert_eq!(f.engine.state(1), ConversationState::AwaitingWaterAmount);

        f.engine.handle_text(1, "300").unwrap();
        let summary = f.log_store.today_summary(1).unwrap();
        assert_eq!(summary.water_ml, 300);
        assert!(summary.food.is_empty());
    }

    #[test]
    fn test_cancel_from_any_state() {
        let f = fixture();
        assert_eq!(f.engine.cancel(1), replies::CANCELLED);

        f.engine.enter(1, EntryPoint::Reflect);
        assert_eq!(f.engine.cancel(1), replies::CANCELLED);
        assert_eq!(f.engine.state(1), ConversationState::Idle);
        assert_eq!(f.engine.handle_text(1, "anything"), None);
        assert_eq!(f.engine.active_count(), 0);
    }

    #[test]
    fn test_chats_are_independent() {
        let f = fixture();
        f.engine.enter(1, EntryPoint::Eat);
        f.engine.enter(2, EntryPoint::Drink);

        assert_eq!(f.engine.state(1), ConversationState::AwaitingMealText);
        assert_eq!(f.engine.state(2), ConversationState::AwaitingWaterAmount);
        assert_eq!(f.engine.active_count(), 2);
    }
}
