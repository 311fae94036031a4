//! Telegram Bot API transport.
//!
//! Uses long polling via `getUpdates` for inbound messages and
//! `sendMessage` / `deleteMessage` for outbound ones.
//! Docs: <https://core.telegram.org/bots/api>

use crate::config::Config;
use crate::error::{Error, Result};
use crate::router::COMMAND_MENU;
use crate::transport::{IncomingMessage, Transport};
use crate::{ChatId, MessageId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: MessageId,
    chat: TgChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: ChatId,
}

/// Telegram transport using the Bot API
pub struct TelegramTransport {
    client: reqwest::Client,
    base_url: String,
    poll_timeout_secs: u64,
    /// Tracks the last update_id to avoid reprocessing.
    last_update_id: Arc<Mutex<Option<i64>>>,
}

impl TelegramTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let token = config.require_token()?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: format!("{}/bot{}", config.api_base_url.trim_end_matches('/'), token),
            poll_timeout_secs: config.poll_timeout_secs,
            last_update_id: Arc::new(Mutex::new(None)),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        call_api(&self.client, &self.base_url, method, &body, None).await
    }

    /// Register bot commands so users see an autocomplete menu.
    /// Best-effort: logs failures but does not propagate errors.
    pub async fn register_commands(&self) {
        let commands: Vec<_> = COMMAND_MENU
            .iter()
            .map(|(command, description)| serde_json::json!({ "command": command, "description": description }))
            .collect();

        match self
            .call::<bool>("setMyCommands", serde_json::json!({ "commands": commands }))
            .await
        {
            Ok(_) => info!("registered Telegram bot commands"),
            Err(e) => warn!("failed to register Telegram bot commands: {e}"),
        }
    }

    /// Spawn the long-polling loop. Text messages arrive on the returned
    /// receiver in delivery order; the loop stops when it is dropped.
    pub fn start_polling(&self) -> mpsc::Receiver<IncomingMessage> {
        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let poll_timeout = self.poll_timeout_secs;
        let last_update_id = self.last_update_id.clone();

        info!("Telegram transport starting long polling...");

        tokio::spawn(async move {
            let mut backoff_secs: u64 = 1;

            loop {
                let offset = last_update_id.lock().await.map(|id| id + 1);
                let mut body = serde_json::json!({
                    "timeout": poll_timeout,
                    "allowed_updates": ["message"],
                });
                if let Some(off) = offset {
                    body["offset"] = serde_json::json!(off);
                }

                let updates: Vec<TgUpdate> = match call_api(
                    &client,
                    &base_url,
                    "getUpdates",
                    &body,
                    Some(Duration::from_secs(poll_timeout + 5)),
                )
                .await
                {
                    Ok(u) => u,
                    Err(e) => {
                        error!("telegram poll error (retry in {backoff_secs}s): {e}");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(60);
                        continue;
                    }
                };

                // Successful poll -- reset backoff.
                backoff_secs = 1;

                if let Some(last_update) = updates.last() {
                    *last_update_id.lock().await = Some(last_update.update_id);
                }

                for update in updates {
                    let Some(msg) = update.message else { continue };
                    let Some(text) = msg.text else {
                        debug!("telegram: skipping non-text message in chat {}", msg.chat.id);
                        continue;
                    };

                    let incoming = IncomingMessage {
                        chat_id: msg.chat.id,
                        text,
                    };
                    if tx.send(incoming).await.is_err() {
                        info!("telegram receiver dropped, stopping poll");
                        return;
                    }
                }
            }
        });

        rx
    }
}

async fn call_api<T: DeserializeOwned>(
    client: &reqwest::Client,
    base_url: &str,
    method: &str,
    body: &serde_json::Value,
    timeout: Option<Duration>,
) -> Result<T> {
    let mut request = client.post(format!("{base_url}/{method}")).json(body);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let resp: TgResponse<T> = request.send().await?.json().await?;
    if !resp.ok {
        return Err(Error::Transport(format!(
            "telegram {method} failed: {}",
            resp.description.unwrap_or_default()
        )));
    }
    resp.result
        .ok_or_else(|| Error::Transport(format!("telegram {method} returned no result")))
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        let mut last_id = None;
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
                "parse_mode": "HTML",
            });
            let sent: TgMessage = self.call("sendMessage", body).await?;
            last_id = Some(sent.message_id);
        }
        last_id.ok_or_else(|| Error::Transport("refusing to send an empty message".to_string()))
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
        });
        self.call::<bool>("deleteMessage", body).await?;
        Ok(())
    }
}

/// Split text into chunks of at most `max_len` bytes, preferring line
/// breaks and never cutting a UTF-8 character.
fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_len {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let break_at = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .map(|i| start + i + 1)
                .unwrap_or(end)
        } else {
            end
        };
        chunks.push(&text[start..break_at]);
        start = break_at;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_message() {
        assert_eq!(split_message("hello", 4096), vec!["hello"]);
        assert!(split_message("", 4096).is_empty());
    }

    #[test]
    fn test_split_long_message() {
        let text = "a\n".repeat(3000);
        let chunks = split_message(&text, 4096);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 4096);
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_multibyte_without_newlines() {
        let text = "ж".repeat(5000);
        let chunks = split_message(&text, 4096);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_new_requires_token() {
        let mut config = Config::for_test(std::path::Path::new("/tmp"));
        config.bot_token = None;
        assert!(matches!(TelegramTransport::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_base_url() {
        let mut config = Config::for_test(std::path::Path::new("/tmp"));
        config.api_base_url = "https://api.example.org/".to_string();
        config.bot_token = Some("123:abc".to_string());
        let transport = TelegramTransport::new(&config).unwrap();
        assert_eq!(transport.base_url, "https://api.example.org/bot123:abc");
        assert_eq!(transport.name(), "telegram");
    }

    #[test]
    fn test_parse_update_payload() {
        let json = r#"{"ok":true,"result":[{"update_id":7,"message":{"message_id":3,"chat":{"id":-100,"type":"group"},"text":"/start"}}]}"#;
        let resp: TgResponse<Vec<TgUpdate>> = serde_json::from_str(json).unwrap();
        assert!(resp.ok);
        let updates = resp.result.unwrap();
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(updates[0].update_id, 7);
        assert_eq!(msg.chat.id, -100);
        assert_eq!(msg.text.as_deref(), Some("/start"));
    }

    #[test]
    fn test_parse_error_payload() {
        let json = r#"{"ok":false,"description":"Forbidden: bot was blocked by the user"}"#;
        let resp: TgResponse<TgMessage> = serde_json::from_str(json).unwrap();
        assert!(!resp.ok);
        assert!(resp.result.is_none());
        assert!(resp.description.unwrap().contains("blocked"));
    }
}
