use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::DiscordConfig;
use crate::core::DigestMessage;
use crate::plugins::traits::{NotificationResult, NotifierPlugin};
use crate::utils::error::{AppError, Result};

/// Discord rejects content over 2000 characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 1900;

/// Message flag that stops Discord from unfurling every product link.
pub const SUPPRESS_EMBEDS: u64 = 4;

const WEBHOOK_PREFIXES: [&str; 2] = [
    "https://discord.com/api/webhooks/",
    "https://discordapp.com/api/webhooks/",
];

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

pub fn is_webhook_url(url: &str) -> bool {
    WEBHOOK_PREFIXES.iter().any(|prefix| url.starts_with(prefix))
}

/// Split `content` into messages of at most `limit` characters, breaking on
/// line boundaries. A single line longer than `limit` is cut by characters.
pub fn chunk_lines(content: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in content.lines() {
        let line_len = line.chars().count();

        if line_len > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { line_len } else { line_len + 1 };
        if current_len + needed > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
    username: Option<String>,
    avatar_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        DiscordNotifier {
            client: Client::new(),
            webhook_url: webhook_url.into(),
            username: None,
            avatar_url: None,
        }
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn with_avatar_url(mut self, avatar_url: Option<String>) -> Self {
        self.avatar_url = avatar_url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn from_config(config: &DiscordConfig) -> Result<Self> {
        let webhook_url = config
            .webhook_url
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| AppError::Notification("Missing Discord webhook_url".to_string()))?;

        if !is_webhook_url(webhook_url) {
            return Err(AppError::Notification("Invalid Discord webhook URL format".to_string()));
        }

        Ok(Self::new(webhook_url)
            .with_username(config.username.clone())
            .with_avatar_url(config.avatar_url.clone()))
    }

    pub fn build_payload(&self, content: &str) -> Value {
        let mut payload = json!({
            "content": content,
            "flags": SUPPRESS_EMBEDS,
        });
        if let Some(username) = &self.username {
            payload["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }
        payload
    }

    async fn post(&self, content: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&self.build_payload(content))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(AppError::Notification(format!(
                "Discord webhook returned {}: {}",
                status.as_u16(),
                snippet
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NotifierPlugin for DiscordNotifier {
    fn name(&self) -> &str {
        "Discord Notifier"
    }

    fn plugin_type(&self) -> &str {
        "discord"
    }

    fn description(&self) -> &str {
        "Posts change digests to a Discord webhook"
    }

    async fn send(&self, message: &DigestMessage) -> Result<NotificationResult> {
        let content = if message.text_body.trim().is_empty() {
            message.subject.trim()
        } else {
            message.text_body.trim()
        };

        let chunks = chunk_lines(content, DISCORD_MESSAGE_LIMIT);
        for (index, chunk) in chunks.iter().enumerate() {
            if let Err(e) = self.post(chunk).await {
                warn!(chunk = index + 1, total = chunks.len(), error = %e, "Discord delivery failed");
                return Err(e);
            }
        }

        debug!(messages = chunks.len(), "Discord digest delivered");
        Ok(NotificationResult::sent(None))
    }
}
