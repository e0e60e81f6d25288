use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use chat_cell::{ChannelSendError, ChoiceSet, MessagingChannel};
use shared_config::AppConfig;

/// Outbound adapter: POSTs messages to the channel's send endpoint.
pub struct HttpMessagingChannel {
    client: Client,
    send_url: String,
    api_token: String,
}

impl HttpMessagingChannel {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            send_url: format!(
                "{}/sendMessage",
                config.messaging_api_url.trim_end_matches('/')
            ),
            api_token: config.messaging_api_token.clone(),
        }
    }
}

#[async_trait]
impl MessagingChannel for HttpMessagingChannel {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        choices: Option<&ChoiceSet>,
    ) -> Result<(), ChannelSendError> {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "choices": choices,
        });
        debug!("Sending message to chat {}", chat_id);

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelSendError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelSendError(format!("{}: {}", status, detail)));
        }
        Ok(())
    }
}
