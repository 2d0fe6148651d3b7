//! Page-feed content relay

use std::sync::Arc;

use crate::alerting::{render, NotificationDispatcher};
use crate::config::MessageTemplates;
use crate::models::{Channel, NotificationMessage};

/// Forwards external content as a labelled notification
pub struct ContentRelay {
    dispatcher: Arc<NotificationDispatcher>,
    template: String,
    placeholder: String,
    channel: Channel,
}

impl ContentRelay {
    /// Create a relay sending on `channel`
    pub fn new(
        dispatcher: Arc<NotificationDispatcher>,
        templates: &MessageTemplates,
        channel: Channel,
    ) -> Self {
        Self {
            dispatcher,
            template: templates.relay.clone(),
            placeholder: templates.relay_placeholder.clone(),
            channel,
        }
    }

    /// The message for a payload; the payload text is passed through unchanged
    pub fn message_for(&self, payload: Option<&str>) -> NotificationMessage {
        let content = payload.unwrap_or(&self.placeholder);
        let text = render(&self.template, &[("message", content.to_string())]);
        NotificationMessage::direct(text).on(self.channel)
    }

    /// Relay a payload; returns whether delivery succeeded
    pub async fn relay(&self, payload: Option<&str>) -> bool {
        self.dispatcher.deliver(&self.message_for(payload)).await
    }
}
