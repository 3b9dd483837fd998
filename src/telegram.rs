//! Telegram Bot API transport: outgoing messages, webhook registration, and
//! the inbound update types the webhook handler deserializes.

use anyhow::{anyhow, Result};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;

pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
}

impl TelegramClient {
    pub fn new(http: reqwest::Client, token: String) -> Self {
        Self { http, token }
    }

    fn method_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    /// Send a text message. Fire-and-forget: delivery failures are logged and
    /// swallowed, a lost notification must never break the calling cycle.
    pub async fn send_message(&self, chat_id: &str, text: &str) {
        let body = json!({ "chat_id": chat_id, "text": text });
        let result = async {
            self.http
                .post(self.method_url("sendMessage"))
                .json(&body)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, anyhow::Error>(())
        }
        .await;
        if let Err(e) = result {
            error!("sendMessage to {chat_id} failed: {e:#}");
        }
    }

    /// Point Telegram's webhook at our endpoint.
    pub async fn set_webhook(&self, base_url: &str) -> Result<()> {
        let body = json!({
            "url": format!("{base_url}/webhook"),
            "drop_pending_updates": true,
            "allowed_updates": ["message"],
        });
        let response = self
            .http
            .post(self.method_url("setWebhook"))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("setWebhook returned {status}: {detail}"));
        }
        info!("setWebhook: {status} {detail}");
        Ok(())
    }
}

/// One inbound webhook update. Only `message` updates are subscribed.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_update_deserializes() {
        let raw = r#"{
            "update_id": 7,
            "message": {
                "message_id": 1,
                "chat": { "id": 42, "type": "private" },
                "text": "завтра в 14:30 встреча"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.text.as_deref(), Some("завтра в 14:30 встреча"));
    }

    #[test]
    fn non_message_update_deserializes_to_none() {
        let raw = r#"{ "update_id": 8, "edited_message": {} }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn voice_message_has_no_text() {
        let raw = r#"{
            "message": { "chat": { "id": 42 }, "voice": { "duration": 3 } }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert!(update.message.unwrap().text.is_none());
    }
}
