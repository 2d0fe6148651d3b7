//! Notification delivery

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::models::{Channel, NotificationMessage};

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Transport(String),

    #[error("messaging API returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("transport not configured: {0}")]
    Unconfigured(String),
}

/// Outbound messaging operations
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Push a message to one addressed recipient
    async fn push_to_recipient(
        &self,
        recipient: &str,
        text: &str,
    ) -> std::result::Result<(), DeliveryError>;

    /// Send a message to every subscriber
    async fn broadcast(&self, text: &str) -> std::result::Result<(), DeliveryError>;

    /// Answer an inbound message using its reply token
    async fn reply(&self, reply_token: &str, text: &str) -> std::result::Result<(), DeliveryError>;
}

/// Routes notification messages to the transport
pub struct NotificationDispatcher {
    transport: Arc<dyn MessagingTransport>,
    recipient: Option<String>,
}

impl NotificationDispatcher {
    /// Create a dispatcher; `recipient` receives direct pushes
    pub fn new(transport: Arc<dyn MessagingTransport>, recipient: Option<String>) -> Self {
        Self {
            transport,
            recipient,
        }
    }

    /// The underlying transport
    pub fn transport(&self) -> Arc<dyn MessagingTransport> {
        Arc::clone(&self.transport)
    }

    /// Send a single notification
    pub async fn send(
        &self,
        message: &NotificationMessage,
    ) -> std::result::Result<(), DeliveryError> {
        match message.channel {
            Channel::Direct => {
                let recipient = self
                    .recipient
                    .as_deref()
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| {
                        DeliveryError::InvalidRecipient("no direct recipient".to_string())
                    })?;
                self.transport.push_to_recipient(recipient, &message.text).await
            }
            Channel::Broadcast => self.transport.broadcast(&message.text).await,
        }
    }

    /// Send and swallow failures; returns whether delivery succeeded.
    ///
    /// A dropped notification is not retried: the next scheduled cycle
    /// re-evaluates and may notify again.
    pub async fn deliver(&self, message: &NotificationMessage) -> bool {
        match self.send(message).await {
            Ok(()) => {
                info!(channel = %message.channel, "Notification sent");
                true
            }
            Err(e) => {
                error!(channel = %message.channel, error = %e, "Notification delivery failed");
                false
            }
        }
    }
}

/// LINE Messaging API transport
pub struct LineTransport {
    client: Client,
    base_url: String,
    access_token: String,
}

impl LineTransport {
    /// Create a transport from configuration
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let access_token = config
            .channel_access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::config("transport.channel_access_token is not set"))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        endpoint: &str,
        payload: &T,
    ) -> std::result::Result<(), DeliveryError> {
        let response = self
            .client
            .post(format!("{}{endpoint}", self.base_url))
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl MessagingTransport for LineTransport {
    async fn push_to_recipient(
        &self,
        recipient: &str,
        text: &str,
    ) -> std::result::Result<(), DeliveryError> {
        let payload = PushPayload {
            to: recipient,
            messages: vec![TextMessage::new(text)],
        };
        self.post("/v2/bot/message/push", &payload).await
    }

    async fn broadcast(&self, text: &str) -> std::result::Result<(), DeliveryError> {
        let payload = BroadcastPayload {
            messages: vec![TextMessage::new(text)],
        };
        self.post("/v2/bot/message/broadcast", &payload).await
    }

    async fn reply(&self, reply_token: &str, text: &str) -> std::result::Result<(), DeliveryError> {
        let payload = ReplyPayload {
            reply_token,
            messages: vec![TextMessage::new(text)],
        };
        self.post("/v2/bot/message/reply", &payload).await
    }
}

/// Dry-run transport that only logs
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl MessagingTransport for LogTransport {
    async fn push_to_recipient(
        &self,
        recipient: &str,
        text: &str,
    ) -> std::result::Result<(), DeliveryError> {
        info!(recipient, text, "[dry-run] push");
        Ok(())
    }

    async fn broadcast(&self, text: &str) -> std::result::Result<(), DeliveryError> {
        info!(text, "[dry-run] broadcast");
        Ok(())
    }

    async fn reply(&self, reply_token: &str, text: &str) -> std::result::Result<(), DeliveryError> {
        info!(reply_token, text, "[dry-run] reply");
        Ok(())
    }
}

// LINE payload types
#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl<'a> TextMessage<'a> {
    fn new(text: &'a str) -> Self {
        Self { kind: "text", text }
    }
}

#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    to: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct BroadcastPayload<'a> {
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyPayload<'a> {
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}
