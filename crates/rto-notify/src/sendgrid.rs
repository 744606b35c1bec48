//! SendGrid v3 mail API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::EmailError;
use crate::provider::{EmailMessage, EmailProvider, Sender};

pub const DEFAULT_SENDGRID_URL: &str = "https://api.sendgrid.com";

pub struct SendGridProvider {
    client: Client,
    base_url: String,
    api_key: String,
    sender: Sender,
}

impl SendGridProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        sender: Sender,
    ) -> Result<Self, EmailError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(EmailError::Configuration(
                "SendGrid API key is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EmailError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            sender,
        })
    }

    fn payload(&self, message: &EmailMessage) -> Value {
        let mut to = json!({ "email": message.to });
        if let Some(name) = &message.to_name {
            to["name"] = json!(name);
        }

        json!({
            "personalizations": [{ "to": [to] }],
            "from": { "email": self.sender.address, "name": self.sender.name },
            "subject": message.subject,
            "content": [{ "type": "text/plain", "value": message.body }],
        })
    }
}

/// 429 and 5xx are worth retrying; any other failure status is final.
fn classify_status(status: StatusCode, body: String) -> EmailError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        EmailError::Provider(format!("SendGrid returned {}: {}", status, body))
    } else {
        EmailError::Rejected(format!("SendGrid returned {}: {}", status, body))
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    fn name(&self) -> &str {
        "sendgrid"
    }

    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: &EmailMessage) -> Result<String, EmailError> {
        let url = format!("{}/v3/mail/send", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| EmailError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "SendGrid rejected send");
            return Err(classify_status(status, body));
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        debug!(message_id = %message_id, "SendGrid accepted message");
        Ok(message_id)
    }
}
