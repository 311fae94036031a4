//! Configuration and paths

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// All configurable paths and constants
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub subscribers_file: PathBuf,
    pub bot_token: Option<String>,
    pub api_base_url: String,
    pub water_interval_secs: u64,
    pub reminder_delete_after_secs: u64,
    pub morning_quote_cron: String,
    pub poll_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("habit-assistant");
        Self::rooted_at(&data_dir)
    }
}

impl Config {
    /// Default intervals with every path placed under `data_dir`
    pub fn rooted_at(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            tasks_dir: data_dir.join("tasks"),
            logs_dir: data_dir.join("logs"),
            subscribers_file: data_dir.join("subscribers.json"),
            bot_token: None,
            api_base_url: TELEGRAM_API_URL.to_string(),
            water_interval_secs: 2 * 60 * 60,
            reminder_delete_after_secs: 600,
            morning_quote_cron: "0 0 6 * * *".to_string(),
            poll_timeout_secs: 30,
        }
    }

    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &Path) -> Self {
        let mut config = Self::rooted_at(temp_dir);
        config.bot_token = Some("test-token".to_string());
        config.api_base_url = "http://127.0.0.1:9".to_string();
        config
    }

    /// Bot token, required only when the daemon talks to the transport
    pub fn require_token(&self) -> Result<&str> {
        match self.bot_token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(Error::Config(
                "bot token missing (set TELEGRAM_BOT_TOKEN or --token)".to_string(),
            )),
        }
    }
}

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";
