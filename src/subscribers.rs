//! Subscriber registry - persistent JSON set of chats that opted in to reminders

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ChatId;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tempfile::NamedTempFile;
use tracing::info;

/// Durable set of subscribed chat ids.
///
/// Broadcast jobs read a [`snapshot`](Self::snapshot) while inbound commands
/// mutate the set; the write lock is held across the save so the file always
/// matches memory.
pub struct SubscriberRegistry {
    registry_path: PathBuf,
    data: RwLock<BTreeSet<ChatId>>,
}

impl SubscriberRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            registry_path: config.subscribers_file.clone(),
            data: RwLock::new(BTreeSet::new()),
        }
    }

    /// Create and load from disk in one step
    pub fn open(config: &Config) -> Result<Self> {
        let registry = Self::new(config);
        registry.load()?;
        Ok(registry)
    }

    /// Load registry from disk
    pub fn load(&self) -> Result<usize> {
        let loaded = if self.registry_path.exists() {
            let content = fs::read_to_string(&self.registry_path)?;
            if content.trim().is_empty() {
                BTreeSet::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeSet::new()
        };

        let mut data = self.write();
        *data = loaded;
        Ok(data.len())
    }

    /// Save registry to disk atomically
    fn save(&self, data: &BTreeSet<ChatId>) -> Result<()> {
        save_atomic(&self.registry_path, data)
    }

    /// Add a chat. Returns `true` if it was not already subscribed.
    pub fn subscribe(&self, chat_id: ChatId) -> Result<bool> {
        let mut data = self.write();
        if !data.insert(chat_id) {
            return Ok(false);
        }
        if let Err(e) = self.save(&data) {
            data.remove(&chat_id);
            return Err(e);
        }
        info!("Chat {} subscribed to reminders ({} total)", chat_id, data.len());
        Ok(true)
    }

    /// Remove a chat; `NotSubscribed` if it was never added
    pub fn unsubscribe(&self, chat_id: ChatId) -> Result<()> {
        let mut data = self.write();
        if !data.remove(&chat_id) {
            return Err(Error::NotSubscribed(chat_id));
        }
        if let Err(e) = self.save(&data) {
            data.insert(chat_id);
            return Err(e);
        }
        info!("Chat {} unsubscribed from reminders ({} left)", chat_id, data.len());
        Ok(())
    }

    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.read().contains(&chat_id)
    }

    /// Point-in-time copy for iteration outside the lock
    pub fn snapshot(&self) -> Vec<ChatId> {
        self.read().iter().copied().collect()
    }

    /// Write the current set to disk
    pub fn flush(&self) -> Result<()> {
        let data = self.read();
        self.save(&data)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeSet<ChatId>> {
        self.data.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeSet<ChatId>> {
        self.data.write().unwrap_or_else(|p| p.into_inner())
    }
}

fn save_atomic(path: &Path, data: &BTreeSet<ChatId>) -> Result<()> {
    // Ensure parent directory exists
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    // Write to temp file in same directory (for atomic rename)
    let mut temp = NamedTempFile::new_in(parent)?;
    let json = serde_json::to_string_pretty(data)?;
    temp.write_all(json.as_bytes())?;
    temp.as_file().sync_all()?;

    // Atomic rename
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
