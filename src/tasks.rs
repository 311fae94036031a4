//! Task manager - per-chat recurring task list with per-date completion marks
//!
//! One file per chat, one line per task: `name|YYYY-MM-DD,YYYY-MM-DD`.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::locks::PathLocks;
use crate::replies;
use crate::ChatId;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const FIELD_DELIMITER: char = '|';
const DATE_DELIMITER: char = ',';
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A task and the dates it was marked done
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub done_dates: BTreeSet<NaiveDate>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done_dates: BTreeSet::new(),
        }
    }

    pub fn is_done_on(&self, date: NaiveDate) -> bool {
        self.done_dates.contains(&date)
    }

    /// Serialize as one line; dates come out sorted
    pub fn to_line(&self) -> String {
        let dates = self
            .done_dates
            .iter()
            .map(|d| d.format(DATE_FORMAT).to_string())
            .collect::<Vec<_>>()
            .join(&DATE_DELIMITER.to_string());
        format!("{}{}{}", self.name, FIELD_DELIMITER, dates)
    }

    /// Parse one stored line. Dates are after the last delimiter, so a name
    /// may itself contain `|`.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let (name, dates) = match line.rsplit_once(FIELD_DELIMITER) {
            Some((name, dates)) => (name, dates),
            None => (line, ""),
        };

        let mut done_dates = BTreeSet::new();
        for raw in dates.split(DATE_DELIMITER).map(str::trim).filter(|d| !d.is_empty()) {
            match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
                Ok(date) => {
                    done_dates.insert(date);
                }
                Err(e) => warn!("Ignoring bad completion date '{}' for task '{}': {}", raw, name, e),
            }
        }

        Some(Self {
            name: name.to_string(),
            done_dates,
        })
    }
}

/// Normalize user text into a task name. Line breaks would split the
/// record, so they collapse into single spaces.
pub fn normalize_task_name(text: &str) -> Result<String> {
    let name = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() {
        return Err(Error::EmptyInput);
    }
    Ok(name)
}

/// Parse a 1-based task number from a command argument
pub fn parse_task_index(arg: &str, len: usize) -> Result<usize> {
    let arg = arg.trim();
    if arg.is_empty() || !arg.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidInput(format!("task number expected, got {:?}", arg)));
    }

    // All digits: anything unparseable is simply too large.
    let index = arg.parse::<usize>().unwrap_or(usize::MAX);
    if index == 0 || index > len {
        return Err(Error::IndexOutOfRange { index, len });
    }
    Ok(index)
}

/// Per-chat task lists stored as flat files
pub struct TaskManager {
    tasks_dir: PathBuf,
    locks: PathLocks,
}

impl TaskManager {
    pub fn new(config: &Config) -> Self {
        Self {
            tasks_dir: config.tasks_dir.clone(),
            locks: PathLocks::new(),
        }
    }

    pub fn task_file(&self, chat_id: ChatId) -> PathBuf {
        self.tasks_dir.join(format!("tasks_{}.txt", chat_id))
    }

    /// Load a chat's tasks in insertion order; empty when no file exists
    pub fn load(&self, chat_id: ChatId) -> Result<Vec<Task>> {
        let path = self.task_file(chat_id);
        self.locks.with_lock(&path, || read_tasks(&path))
    }

    /// Overwrite a chat's task file
    pub fn save(&self, chat_id: ChatId, tasks: &[Task]) -> Result<()> {
        let path = self.task_file(chat_id);
        self.locks.with_lock(&path, || write_tasks(&path, tasks))
    }

    /// Load, modify and save under one lock
    fn update<T>(&self, chat_id: ChatId, f: impl FnOnce(&mut Vec<Task>) -> Result<T>) -> Result<T> {
        let path = self.task_file(chat_id);
        self.locks.with_lock(&path, || {
            let mut tasks = read_tasks(&path)?;
            let out = f(&mut tasks)?;
            write_tasks(&path, &tasks)?;
            Ok(out)
        })
    }

    /// Append a new undone task
    pub fn add_task(&self, chat_id: ChatId, text: &str) -> Result<Task> {
        let name = normalize_task_name(text)?;
        let task = Task::new(name);

        let added = self.update(chat_id, |tasks| {
            tasks.push(task.clone());
            Ok(task)
        })?;
        debug!("Added task '{}' for chat {}", added.name, chat_id);
        Ok(added)
    }

    /// Mark task number `arg` (1-based) done today
    pub fn mark_done(&self, chat_id: ChatId, arg: &str) -> Result<Task> {
        self.mark_done_on(chat_id, arg, crate::today())
    }

    /// Mark task number `arg` done on `date`. Repeats on the same date change
    /// nothing; failures leave the file untouched.
    pub fn mark_done_on(&self, chat_id: ChatId, arg: &str, date: NaiveDate) -> Result<Task> {
        self.update(chat_id, |tasks| {
            if tasks.is_empty() {
                return Err(Error::NoTasks);
            }
            let index = parse_task_index(arg, tasks.len())?;
            let task = &mut tasks[index - 1];
            task.done_dates.insert(date);
            Ok(task.clone())
        })
    }

    /// Render today's checklist, or the "no tasks yet" hint
    pub fn list_tasks(&self, chat_id: ChatId) -> Result<String> {
        let tasks = self.load(chat_id)?;
        Ok(replies::render_tasks(&tasks, crate::today()))
    }
}

fn read_tasks(path: &Path) -> Result<Vec<Task>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.lines().filter_map(Task::from_line).collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::Io(e)),
    }
}

fn write_tasks(path: &Path, tasks: &[Task]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    // Write to temp file in same directory (for atomic rename)
    let mut temp = NamedTempFile::new_in(parent)?;
    for task in tasks {
        writeln!(temp, "{}", task.to_line())?;
    }
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn manager(temp_dir: &TempDir) -> TaskManager {
        TaskManager::new(&Config::for_test(temp_dir.path()))
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_line_format() {
        let mut task = Task::new("Stretch");
        task.done_dates.insert(date("2025-05-26"));
        task.done_dates.insert(date("2025-05-25"));
        assert_eq!(task.to_line(), "Stretch|2025-05-25,2025-05-26");

        assert_eq!(Task::new("Read").to_line(), "Read|");
    }

    #[test]
    fn test_from_line_variants() {
        let task = Task::from_line("  Walk|2025-01-02  ").unwrap();
        assert_eq!(task.name, "Walk");
        assert!(task.is_done_on(date("2025-01-02")));

        let legacy = Task::from_line("No delimiter").unwrap();
        assert_eq!(legacy.name, "No delimiter");
        assert!(legacy.done_dates.is_empty());

        let piped = Task::from_line("a|b|2025-01-01").unwrap();
        assert_eq!(piped.name, "a|b");
        assert_eq!(piped.done_dates.len(), 1);

        assert!(Task::from_line("   ").is_none());
    }

    #[test]
    fn test_from_line_skips_bad_dates() {
        let task = Task::from_line("Run|2025-01-01,garbage").unwrap();
        assert_eq!(task.done_dates.len(), 1);
    }

    #[test]
    fn test_normalize_task_name() {
        assert_eq!(normalize_task_name("  Buy milk \n").unwrap(), "Buy milk");
        assert_eq!(normalize_task_name("two\nlines").unwrap(), "two lines");
        assert!(matches!(normalize_task_name("   \n "), Err(Error::EmptyInput)));
    }

    #[test]
    fn test_parse_task_index() {
        assert_eq!(parse_task_index("1", 3).unwrap(), 1);
        assert_eq!(parse_task_index(" 3 ", 3).unwrap(), 3);
        assert!(matches!(
            parse_task_index("0", 3),
            Err(Error::IndexOutOfRange { index: 0, len: 3 })
        ));
        assert!(matches!(
            parse_task_index("4", 3),
            Err(Error::IndexOutOfRange { index: 4, len: 3 })
        ));
        assert!(matches!(
            parse_task_index("99999999999999999999999", 3),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(matches!(parse_task_index("-1", 3), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_task_index("one", 3), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_task_index("", 3), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        assert!(manager.load(1).unwrap().is_empty());
    }

    #[test]
    fn test_add_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        manager.add_task(1, "Buy milk").unwrap();
        let listing = manager.list_tasks(1).unwrap();
        assert!(listing.contains("1. Buy milk ⬜"));
    }

    #[test]
    fn test_add_empty_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        assert!(matches!(manager.add_task(1, "  "), Err(Error::EmptyInput)));
        assert!(!manager.task_file(1).exists());
    }

    #[test]
    fn test_mark_done_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        let today = date("2025-05-25");

        manager.add_task(1, "Stretch").unwrap();
        manager.mark_done_on(1, "1", today).unwrap();
        manager.mark_done_on(1, "1", today).unwrap();

        let tasks = manager.load(1).unwrap();
        assert_eq!(tasks[0].done_dates.len(), 1);

        manager.mark_done_on(1, "1", date("2025-05-26")).unwrap();
        assert_eq!(manager.load(1).unwrap()[0].done_dates.len(), 2);
    }

    #[test]
    fn test_mark_done_failures_do_not_mutate() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        assert!(matches!(manager.mark_done(1, "1"), Err(Error::NoTasks)));

        manager.add_task(1, "A").unwrap();
        manager.add_task(1, "B").unwrap();
        let before = fs::read_to_string(manager.task_file(1)).unwrap();

        assert!(matches!(manager.mark_done(1, "0"), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(manager.mark_done(1, "3"), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(manager.mark_done(1, "x"), Err(Error::InvalidInput(_))));

        let after = fs::read_to_string(manager.task_file(1)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_list_empty() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        assert_eq!(manager.list_tasks(1).unwrap(), replies::NO_TASKS);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        fs::create_dir_all(&temp_dir.path().join("tasks")).unwrap();
        fs::write(manager.task_file(1), "\nA|\n   \nB|2025-01-01\n\n").unwrap();

        let tasks = manager.load(1).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].name, "B");
    }

    #[test]
    fn test_concurrent_mark_done_keeps_all_marks() {
        let temp_dir = TempDir::new().unwrap();
        let manager = std::sync::Arc::new(manager(&temp_dir));
        for i in 0..8 {
            manager.add_task(1, &format!("task {}", i)).unwrap();
        }

        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    manager.mark_done_on(1, &i.to_string(), date("2025-03-01")).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let tasks = manager.load(1).unwrap();
        assert_eq!(tasks.len(), 8);
        assert!(tasks.iter().all(|t| t.is_done_on(date("2025-03-01"))));
    }

    fn arb_task() -> impl Strategy<Value = Task> {
        let name = "[a-zA-Zа-я0-9 |.!-]{0,20}[a-zA-Zа-я0-9]";
        let dates = prop::collection::btree_set(0i64..3000, 0..5);
        (name, dates).prop_map(|(name, offsets)| Task {
            name: name.trim().to_string(),
            done_dates: offsets
                .into_iter()
                .map(|o| date("2020-01-01") + chrono::Duration::days(o))
                .collect(),
        })
    }

    proptest! {
        #[test]
        fn prop_save_load_round_trip(tasks in prop::collection::vec(arb_task(), 0..8)) {
            let temp_dir = TempDir::new().unwrap();
            let manager = manager(&temp_dir);

            manager.save(1, &tasks).unwrap();
            let loaded = manager.load(1).unwrap();
            prop_assert_eq!(loaded, tasks);
        }
    }
}
