//! Webhook handlers

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::signature::{verify_line_signature, SIGNATURE_HEADER};
use crate::alerting::MessagingTransport;
use crate::inbound::{ContentRelay, RateQuery};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<RateQuery>,
    pub relay: Arc<ContentRelay>,
    pub transport: Arc<dyn MessagingTransport>,
    pub channel_secret: Option<Arc<str>>,
    pub verify_token: Option<Arc<str>>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness text
pub async fn home() -> &'static str {
    "ratewatch is running"
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Chat webhook body
#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(default)]
    pub events: Vec<ChatEvent>,
}

/// One chat webhook event; unknown kinds are kept and ignored
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub reply_token: Option<String>,
    pub source: Option<EventSource>,
    pub message: Option<ChatMessage>,
}

/// Where a chat event came from
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub group_id: Option<String>,
    pub user_id: Option<String>,
}

/// Chat message content
#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

impl ChatEvent {
    fn text(&self) -> Option<&str> {
        if self.kind != "message" {
            return None;
        }
        self.message
            .as_ref()
            .filter(|m| m.kind == "text")
            .and_then(|m| m.text.as_deref())
    }
}

/// Chat platform callback: verify the signature, answer rate queries
pub async fn line_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, (StatusCode, String)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing signature".to_string()))?;

    let Some(secret) = state.channel_secret.as_deref() else {
        warn!("Callback received but no channel secret is configured");
        return Err((StatusCode::BAD_REQUEST, "invalid signature".to_string()));
    };

    if !verify_line_signature(&body, signature, secret) {
        warn!("Callback signature mismatch");
        return Err((StatusCode::BAD_REQUEST, "invalid signature".to_string()));
    }

    let callback: CallbackBody = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid body: {e}")))?;

    for event in &callback.events {
        if let Some(source) = &event.source {
            debug!(
                source_type = %source.kind,
                group_id = source.group_id.as_deref().unwrap_or("N/A"),
                user_id = source.user_id.as_deref().unwrap_or("N/A"),
                "Chat event"
            );
        }

        let (Some(text), Some(reply_token)) = (event.text(), event.reply_token.as_deref()) else {
            continue;
        };

        let Some(reply) = state.query.respond(text).await else {
            continue;
        };

        if let Err(e) = state.transport.reply(reply_token, &reply).await {
            error!(error = %e, "Failed to reply to rate query");
        }
    }

    Ok("OK")
}

/// Subscription handshake for the page-feed webhook
pub async fn facebook_verify(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let token = params.get("hub.verify_token").map(String::as_str);
    let expected = state.verify_token.as_deref();

    match (token, expected) {
        (Some(token), Some(expected)) if token == expected => {
            info!("Page webhook verified");
            let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
            (StatusCode::OK, challenge)
        }
        _ => {
            warn!("Page webhook verification failed");
            (StatusCode::FORBIDDEN, "verification failed".to_string())
        }
    }
}

/// Page-feed webhook body
#[derive(Debug, Deserialize)]
pub struct PageEvent {
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<PageEntry>,
}

/// One entry in a page-feed event
#[derive(Debug, Deserialize)]
pub struct PageEntry {
    #[serde(default)]
    pub changes: Vec<PageChange>,
}

/// One change in a page entry
#[derive(Debug, Deserialize)]
pub struct PageChange {
    pub field: Option<String>,
    #[serde(default)]
    pub value: PageChangeValue,
}

/// Changed content
#[derive(Debug, Default, Deserialize)]
pub struct PageChangeValue {
    pub message: Option<String>,
}

/// Page-feed events: relay every new feed post
pub async fn facebook_event(State(state): State<AppState>, body: Bytes) -> &'static str {
    let event: PageEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Failed to parse page webhook body");
            return "OK";
        }
    };
    debug!(object = ?event.object, entries = event.entry.len(), "Page webhook event");

    if event.object.as_deref() != Some("page") {
        return "OK";
    }

    let posts = event
        .entry
        .iter()
        .flat_map(|entry| entry.changes.iter())
        .filter(|change| change.field.as_deref() == Some("feed"));

    for change in posts {
        state.relay.relay(change.value.message.as_deref()).await;
    }

    "OK"
}
