//! Outbound notification messages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery channel for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Push to the single configured recipient
    #[default]
    Direct,
    /// Send to every subscriber
    Broadcast,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Direct => f.write_str("direct"),
            Channel::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// A message ready for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    /// Message body
    pub text: String,
    /// Where to deliver it
    pub channel: Channel,
}

impl NotificationMessage {
    /// Create a direct-push message
    pub fn direct(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            channel: Channel::Direct,
        }
    }

    /// Create a broadcast message
    pub fn broadcast(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            channel: Channel::Broadcast,
        }
    }

    /// Return the same text routed to another channel
    #[must_use]
    pub fn on(self, channel: Channel) -> Self {
        Self { channel, ..self }
    }
}
