use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use super::{Notifier, NotifyResult};
use crate::error::NotificationError;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Markdown flavour understood by the chat backend
const PARSE_MODE: &str = "Markdown";

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub chat_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'static str>,
}

pub struct MessageBuilder {
    chat_id: String,
    text: String,
    parse_mode: Option<&'static str>,
}

impl MessageBuilder {
    pub fn new(chat_id: impl ToString) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            text: String::new(),
            parse_mode: Some(PARSE_MODE),
        }
    }

    pub fn text(mut self, text: impl ToString) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn plain(mut self) -> Self {
        self.parse_mode = None;
        self
    }

    pub fn build(self) -> Message {
        Message {
            chat_id: self.chat_id,
            text: self.text,
            parse_mode: self.parse_mode,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.token)
    }

    #[instrument(skip_all, fields(chat_id = %message.chat_id))]
    pub async fn send_message(&self, message: &Message) -> NotifyResult {
        let response = match self.client.post(self.endpoint()).json(message).send().await {
            Ok(response) => response,
            Err(e) => {
                // reqwest errors carry the URL, which contains the bot token
                let e = e.without_url();
                error!("Failed to send chat message: {}", e);
                return Err(NotificationError::Transport(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            info!("Successfully sent chat message");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!("Chat message failed with status: {}", status);
        error!("Chat API error response: {}", body);
        Err(NotificationError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> NotifyResult {
        let message = MessageBuilder::new(&self.chat_id).text(text).build();
        self.send_message(&message).await
    }

    async fn send_plain(&self, text: &str) -> NotifyResult {
        let message = MessageBuilder::new(&self.chat_id).text(text).plain().build();
        self.send_message(&message).await
    }
}
