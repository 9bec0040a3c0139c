//! Messaging channel — renewal reminders via the Telegram Bot API.

use async_trait::async_trait;
use serde::Deserialize;

use subwatch_core::config::MessagingSettings;
use subwatch_core::error::{Result, SubwatchError};
use subwatch_core::traits::ChannelAdapter;
use subwatch_core::types::{ChannelKind, ConnectionCheck, RenewalNotice, SendOutcome};

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Telegram Bot API adapter for one user's chat.
pub struct TelegramAdapter {
    settings: MessagingSettings,
    client: reqwest::Client,
}

impl TelegramAdapter {
    pub fn new(settings: MessagingSettings) -> Self {
        Self { settings, client: reqwest::Client::new() }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.settings.bot_token, method)
    }

    async fn try_send(&self, notice: &RenewalNotice) -> Result<Option<String>> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": self.settings.chat_id,
                "text": message_text(notice),
                "parse_mode": "Markdown",
            }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| SubwatchError::Channel(format!("sendMessage failed: {e}")))?;

        let body: ApiResponse<SentMessage> = resp
            .json()
            .await
            .map_err(|e| SubwatchError::Channel(format!("Invalid Telegram response: {e}")))?;

        if !body.ok {
            return Err(SubwatchError::Channel(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }
        Ok(body.result.map(|m| m.message_id.to_string()))
    }
}

/// Reminder text, Markdown-formatted.
fn message_text(notice: &RenewalNotice) -> String {
    let mut text = format!(
        "🔔 *{}* renews {} — {} ({})",
        escape_markdown(&notice.name),
        notice.renews_phrase(),
        escape_markdown(&notice.cost_display),
        notice.next_renewal.format("%Y-%m-%d"),
    );
    if let Some(note) = &notice.note {
        text.push_str("\n\n_");
        text.push_str(&escape_markdown(note));
        text.push('_');
    }
    text
}

/// Escape Telegram MarkdownV1 special characters.
fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Messaging
    }

    async fn send(&self, notice: &RenewalNotice) -> SendOutcome {
        match self.try_send(notice).await {
            Ok(message_id) => {
                tracing::info!("✅ Telegram reminder sent to chat {}", self.settings.chat_id);
                SendOutcome::sent(message_id)
            }
            Err(e) => SendOutcome::failed(e.to_string()),
        }
    }

    async fn test_connection(&self) -> ConnectionCheck {
        let resp = match self
            .client
            .get(self.api_url("getMe"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ConnectionCheck::failed(format!("getMe failed: {e}")),
        };
        match resp.json::<ApiResponse<BotInfo>>().await {
            Ok(body) if body.ok => {
                let name = body
                    .result
                    .and_then(|b| b.username)
                    .unwrap_or_else(|| "unknown".into());
                ConnectionCheck::ok(format!("Telegram bot @{name} reachable"))
            }
            Ok(body) => ConnectionCheck::failed(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )),
            Err(e) => ConnectionCheck::failed(format!("Invalid getMe response: {e}")),
        }
    }
}

// --- Telegram API types ---

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct BotInfo {
    username: Option<String>,
}
