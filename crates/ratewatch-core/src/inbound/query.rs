//! Interactive rate queries

use std::sync::Arc;
use tracing::{info, warn};

use crate::alerting::render;
use crate::config::MessageTemplates;
use crate::rate::RateSource;

/// Answers a chat command with the current rate.
///
/// Bypasses the scheduler and the dispatcher: every query performs its own
/// fetch and the answer goes back to the requester only.
pub struct RateQuery {
    source: Arc<dyn RateSource>,
    keyword: String,
    reply_template: String,
    unavailable: String,
}

impl RateQuery {
    /// Create a query handler recognising `keyword`
    pub fn new(
        source: Arc<dyn RateSource>,
        keyword: impl Into<String>,
        templates: &MessageTemplates,
    ) -> Self {
        Self {
            source,
            keyword: keyword.into().trim().to_lowercase(),
            reply_template: templates.query_reply.clone(),
            unavailable: templates.query_unavailable.clone(),
        }
    }

    /// Whether inbound text is the query command
    pub fn matches(&self, text: &str) -> bool {
        text.trim().to_lowercase() == self.keyword
    }

    /// Fetch and render the reply; a failed fetch yields the fallback text
    pub async fn answer(&self) -> String {
        match self.source.fetch().await {
            Ok(sample) => {
                info!(rate = %sample.value(), "Answering rate query");
                render(&self.reply_template, &[("rate", sample.value().to_string())])
            }
            Err(e) => {
                warn!(error = %e, "Rate query fetch failed");
                self.unavailable.clone()
            }
        }
    }

    /// Reply text for inbound text, or `None` when it is not a query
    pub async fn respond(&self, text: &str) -> Option<String> {
        if !self.matches(text) {
            return None;
        }
        Some(self.answer().await)
    }
}
