use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backup::{DeliveryError, DocumentChannel};
use crate::config::TelegramConfig;
use crate::validation::is_valid_recipient;

/// Sends rendered reports through the Telegram Bot API `sendDocument` method.
#[derive(Clone)]
pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("api_base", &self.api_base)
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty()
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendDocument", self.api_base, self.bot_token)
    }

    async fn send(&self, recipient: &str, path: &Path, caption: &str) -> Result<(), DeliveryError> {
        if !self.is_configured() {
            return Err(DeliveryError::NotConfigured);
        }
        let chat_id = recipient.trim();
        if !is_valid_recipient(chat_id) {
            return Err(DeliveryError::InvalidRecipient(chat_id.to_string()));
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        let document = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(document_mime(path))
            .map_err(map_reqwest_error)?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", document);

        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;
        let parsed = serde_json::from_str::<ApiResponse>(&body).ok();

        match parsed {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => {
                tracing::debug!(recipient = chat_id, "Document accepted by Telegram");
                Ok(())
            }
            Some(ApiResponse { description, .. }) => Err(DeliveryError::Api {
                status: status.as_u16(),
                message: description.unwrap_or_else(|| "request rejected".to_string()),
            }),
            None => Err(DeliveryError::Api {
                status: status.as_u16(),
                message: truncate(&body, 200),
            }),
        }
    }
}

#[async_trait]
impl DocumentChannel for TelegramChannel {
    async fn send_document(
        &self,
        recipient: &str,
        path: &Path,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        self.send(recipient, path, caption).await
    }
}

fn map_reqwest_error(error: reqwest::Error) -> DeliveryError {
    if error.is_timeout() {
        DeliveryError::Timeout
    } else {
        // Without the URL: it carries the bot token.
        DeliveryError::Network(error.without_url().to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn document_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}
