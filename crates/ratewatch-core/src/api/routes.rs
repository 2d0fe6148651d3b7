//! Webhook routes

use axum::{
    body::Body,
    http::Request,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers::{self, AppState};

/// Create the webhook router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health))

        // Chat platform
        .route("/callback", post(handlers::line_callback))

        // Page feed
        .route(
            "/facebook_webhook",
            get(handlers::facebook_verify).post(handlers::facebook_event),
        )

        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %Uuid::new_v4(),
            )
        }))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::NotificationDispatcher;
    use crate::api::signature::sign;
    use crate::config::MessageTemplates;
    use crate::inbound::{ContentRelay, RateQuery};
    use crate::models::Channel;
    use crate::testkit::{RecordingTransport, ScriptedSource};
    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &str = "channel-secret";

    fn app(source: &Arc<ScriptedSource>, transport: &Arc<RecordingTransport>) -> Router {
        let templates = MessageTemplates::default();
        let dispatcher = Arc::new(NotificationDispatcher::new(
            transport.clone(),
            Some("C-group".to_string()),
        ));
        create_router(AppState {
            query: Arc::new(RateQuery::new(source.clone(), "匯率", &templates)),
            relay: Arc::new(ContentRelay::new(dispatcher, &templates, Channel::Direct)),
            transport: transport.clone(),
            channel_secret: Some(Arc::from(SECRET)),
            verify_token: Some(Arc::from("verify-me")),
        })
    }

    fn callback(body: &serde_json::Value, signature: Option<String>) -> Request<Body> {
        let body = body.to_string();
        let mut builder = Request::post("/callback").header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("X-Line-Signature", signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn text_event(text: &str) -> serde_json::Value {
        json!({
            "destination": "U-bot",
            "events": [{
                "type": "message",
                "replyToken": "reply-1",
                "source": {"type": "group", "groupId": "C-group"},
                "message": {"type": "text", "id": "1", "text": text}
            }]
        })
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(&ScriptedSource::fixed(dec!(31)), &RecordingTransport::new());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_query_keyword_replies_with_rate() {
        let source = ScriptedSource::fixed(dec!(31.2568));
        let transport = RecordingTransport::new();
        let body = text_event(" 匯率 ");
        let signature = sign(body.to_string().as_bytes(), SECRET);

        let response = app(&source, &transport)
            .oneshot(callback(&body, signature))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "reply");
        assert_eq!(sent[0].target.as_deref(), Some("reply-1"));
        assert_eq!(sent[0].text, "Current USD/TWD rate: 31.2568");
    }

    #[tokio::test]
    async fn test_other_text_gets_no_reply() {
        let source = ScriptedSource::fixed(dec!(31));
        let transport = RecordingTransport::new();
        let body = text_event("hello");
        let signature = sign(body.to_string().as_bytes(), SECRET);

        let response = app(&source, &transport)
            .oneshot(callback(&body, signature))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(transport.sent().is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected() {
        let source = ScriptedSource::fixed(dec!(31));
        let transport = RecordingTransport::new();
        let body = text_event("匯率");
        let forged = sign(b"something else", SECRET);

        let response = app(&source, &transport)
            .oneshot(callback(&body, forged))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app(&source, &transport)
            .oneshot(callback(&body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(source.calls(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_page_webhook_handshake() {
        let app = app(&ScriptedSource::fixed(dec!(31)), &RecordingTransport::new());

        let ok = app
            .clone()
            .oneshot(
                Request::get(
                    "/facebook_webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=42",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(body_text(ok).await, "42");

        let denied = app
            .oneshot(
                Request::get("/facebook_webhook?hub.verify_token=wrong&hub.challenge=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_page_feed_posts_are_relayed() {
        let transport = RecordingTransport::new();
        let body = json!({
            "object": "page",
            "entry": [{
                "changes": [
                    {"field": "feed", "value": {"message": "Branch opens at 9"}},
                    {"field": "feed", "value": {}},
                    {"field": "ratings", "value": {"message": "ignored"}}
                ]
            }]
        });

        let response = app(&ScriptedSource::fixed(dec!(31)), &transport)
            .oneshot(
                Request::post("/facebook_webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let texts: Vec<String> = transport.sent().into_iter().map(|s| s.text).collect();
        assert_eq!(
            texts,
            vec![
                "📰 New page post: Branch opens at 9".to_string(),
                "📰 New page post: 📰 New post".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_page_event_still_ok() {
        let transport = RecordingTransport::new();

        let response = app(&ScriptedSource::fixed(dec!(31)), &transport)
            .oneshot(
                Request::post("/facebook_webhook")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(transport.sent().is_empty());
    }
}
