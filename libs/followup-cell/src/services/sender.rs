use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::error::FollowupError;
use crate::models::MessagePayload;

/// Delivery boundary. Implementations are expected to enforce their own
/// request timeouts; the dispatch core only bounds the attempt count.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, payload: &MessagePayload) -> Result<(), FollowupError>;
}

/// WhatsApp Cloud API style client: bearer-token JSON POST per message.
pub struct WhatsAppSender {
    client: Client,
    api_url: String,
    api_token: String,
}

impl WhatsAppSender {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.whatsapp_api_url.clone(),
            api_token: config.whatsapp_api_token.clone(),
        }
    }
}

#[async_trait]
impl MessageSender for WhatsAppSender {
    async fn send(&self, payload: &MessagePayload) -> Result<(), FollowupError> {
        if self.api_url.is_empty() || self.api_token.is_empty() {
            return Err(FollowupError::NotConfigured);
        }

        let url = format!("{}/messages", self.api_url);

        let request_body = json!({
            "messaging_product": "whatsapp",
            "to": payload.recipient,
            "type": "text",
            "text": { "body": payload.body }
        });

        debug!("Sending follow-up message to {}", payload.recipient);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| FollowupError::DeliveryError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let response_text = response.text().await.unwrap_or_default();
            error!(
                "Message delivery failed: {} - {}",
                status, response_text
            );
            return Err(FollowupError::DeliveryError(format!(
                "HTTP {}: {}",
                status, response_text
            )));
        }

        debug!("Message accepted by provider for {}", payload.recipient);
        Ok(())
    }
}
