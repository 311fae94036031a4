//! Daily log store - append-only food, water and reflection records
//!
//! Layout: `<logs_dir>/<chat_id>/<YYYY-MM-DD>/{food,water,reflection}.jsonl`,
//! one JSON object per line. Records are never edited; a whole day can be
//! cleared.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::locks::PathLocks;
use crate::ChatId;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The three per-day log partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    Food,
    Water,
    Reflection,
}

impl LogCategory {
    pub const ALL: [LogCategory; 3] = [LogCategory::Food, LogCategory::Water, LogCategory::Reflection];

    pub fn file_name(self) -> &'static str {
        match self {
            LogCategory::Food => "food.jsonl",
            LogCategory::Water => "water.jsonl",
            LogCategory::Reflection => "reflection.jsonl",
        }
    }
}

/// A meal, written as `label - description`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodEntry {
    pub label: String,
    pub description: String,
}

impl FoodEntry {
    /// Split on the first `-`; both halves trimmed
    pub fn parse(text: &str) -> Result<Self> {
        let (label, description) = text
            .split_once('-')
            .ok_or_else(|| Error::InvalidFormat("meal must look like `label - description`".to_string()))?;

        Ok(Self {
            label: label.trim().to_string(),
            description: description.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct WaterEntry {
    amount_ml: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ReflectionEntry {
    text: String,
}

/// Parse a water amount in millilitres: a base-10 integer, sign allowed
pub fn parse_water_amount(text: &str) -> Result<i64> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| Error::InvalidFormat(format!("water amount must be an integer, got {:?}", text)))
}

/// Everything logged by one chat on one date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub food: Vec<FoodEntry>,
    pub water_ml: i64,
    pub water_entries: usize,
    pub reflections: Vec<String>,
}

impl DaySummary {
    pub fn is_empty(&self) -> bool {
        self.food.is_empty() && self.water_entries == 0 && self.reflections.is_empty()
    }
}

/// Append-only per-chat, per-day log storage
pub struct LogStore {
    logs_dir: PathBuf,
    locks: PathLocks,
}

impl LogStore {
    pub fn new(config: &Config) -> Self {
        Self {
            logs_dir: config.logs_dir.clone(),
            locks: PathLocks::new(),
        }
    }

    /// Folder holding one chat's logs for one date
    pub fn day_dir(&self, chat_id: ChatId, date: NaiveDate) -> PathBuf {
        self.logs_dir
            .join(chat_id.to_string())
            .join(date.format("%Y-%m-%d").to_string())
    }

    fn category_path(&self, chat_id: ChatId, date: NaiveDate, category: LogCategory) -> PathBuf {
        self.day_dir(chat_id, date).join(category.file_name())
    }

    pub fn append_food(&self, chat_id: ChatId, entry: &FoodEntry) -> Result<()> {
        self.append_food_on(chat_id, crate::today(), entry)
    }

    pub fn append_food_on(&self, chat_id: ChatId, date: NaiveDate, entry: &FoodEntry) -> Result<()> {
        self.append(chat_id, date, LogCategory::Food, entry)
    }

    pub fn append_water(&self, chat_id: ChatId, amount_ml: i64) -> Result<()> {
        self.append_water_on(chat_id, crate::today(), amount_ml)
    }

    pub fn append_water_on(&self, chat_id: ChatId, date: NaiveDate, amount_ml: i64) -> Result<()> {
        self.append(chat_id, date, LogCategory::Water, &WaterEntry { amount_ml })
    }

    /// Validate raw user text and append it as today's water entry.
    /// Nothing is written when the text is not an integer.
    pub fn append_water_text(&self, chat_id: ChatId, text: &str) -> Result<i64> {
        let amount = parse_water_amount(text)?;
        self.append_water(chat_id, amount)?;
        Ok(amount)
    }

    pub fn append_reflection(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.append_reflection_on(chat_id, crate::today(), text)
    }

    pub fn append_reflection_on(&self, chat_id: ChatId, date: NaiveDate, text: &str) -> Result<()> {
        let entry = ReflectionEntry {
            text: text.to_string(),
        };
        self.append(chat_id, date, LogCategory::Reflection, &entry)
    }

    fn append<T: Serialize>(
        &self,
        chat_id: ChatId,
        date: NaiveDate,
        category: LogCategory,
        entry: &T,
    ) -> Result<()> {
        let path = self.category_path(chat_id, date, category);
        let line = serde_json::to_string(entry)?;

        self.locks.with_lock(&path, || -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(file, "{}", line)?;
            Ok(())
        })?;

        debug!("Appended {:?} entry for chat {} on {}", category, chat_id, date);
        Ok(())
    }

    /// Aggregate all three categories for `date`
    pub fn day_summary(&self, chat_id: ChatId, date: NaiveDate) -> Result<DaySummary> {
        let food: Vec<FoodEntry> = self.read_category(chat_id, date, LogCategory::Food)?;
        let water: Vec<WaterEntry> = self.read_category(chat_id, date, LogCategory::Water)?;
        let reflections: Vec<ReflectionEntry> =
            self.read_category(chat_id, date, LogCategory::Reflection)?;

        Ok(DaySummary {
            date,
            food,
            // Saturates; any i64 is a valid entry
            water_ml: water
                .iter()
                .fold(0i64, |total, w| total.saturating_add(w.amount_ml)),
            water_entries: water.len(),
            reflections: reflections.into_iter().map(|r| r.text).collect(),
        })
    }

    pub fn today_summary(&self, chat_id: ChatId) -> Result<DaySummary> {
        self.day_summary(chat_id, crate::today())
    }

    /// Like [`day_summary`](Self::day_summary) but `NoRecords` for an empty day
    pub fn require_records(&self, chat_id: ChatId, date: NaiveDate) -> Result<DaySummary> {
        let summary = self.day_summary(chat_id, date)?;
        if summary.is_empty() {
            return Err(Error::NoRecords);
        }
        Ok(summary)
    }

    fn read_category<T: DeserializeOwned>(
        &self,
        chat_id: ChatId,
        date: NaiveDate,
        category: LogCategory,
    ) -> Result<Vec<T>> {
        let path = self.category_path(chat_id, date, category);
        if !path.exists() {
            return Ok(Vec::new());
        }
        self.locks.with_lock(&path, || read_json_lines(&path))
    }

    /// Remove today's logs for every category
    pub fn clear_today(&self, chat_id: ChatId) -> Result<usize> {
        self.clear_day(chat_id, crate::today())
    }

    /// Remove one date's logs; missing files are skipped. Returns files removed.
    pub fn clear_day(&self, chat_id: ChatId, date: NaiveDate) -> Result<usize> {
        let mut removed = 0;
        for category in LogCategory::ALL {
            let path = self.category_path(chat_id, date, category);
            let deleted = self.locks.with_lock(&path, || match fs::remove_file(&path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(Error::Io(e)),
            })?;
            if deleted {
                removed += 1;
            }
        }
        debug!("Cleared {} log files for chat {} on {}", removed, chat_id, date);
        Ok(removed)
    }
}

fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io(e)),
    };

    let mut entries = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping malformed log line in {}: {}", path.display(), e),
        }
    }
    Ok(entries)
}
