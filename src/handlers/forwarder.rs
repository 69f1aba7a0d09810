//! HTTP webhook forwarder for notification events.
//!
//! POSTs each consumed event to the external notification endpoint as
//! `{"event_type": ..., "data": "<JSON-encoded data>"}`. Failures are
//! logged and swallowed: the event counts as consumed either way, and there
//! is no retry or dead-letter queue.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::bus::{Event, EventHandler};
use crate::config::NotifyConfig;

/// Longest slice of a response body kept in errors and logs.
const MAX_BODY_CHARS: usize = 200;

/// Errors that can occur when forwarding an event.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// Request failed before a response arrived (connect, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-2xx status.
    #[error("HTTP {status} - {body}")]
    Status { status: StatusCode, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Forwarder configuration.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Webhook endpoint URL.
    pub webhook_url: String,

    /// Request timeout. Bounds how long one slow endpoint can stall the loop.
    pub timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ForwarderConfig {
    /// Set the endpoint URL.
    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl From<&NotifyConfig> for ForwarderConfig {
    fn from(config: &NotifyConfig) -> Self {
        Self {
            webhook_url: config.webhook_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Outbound webhook body. `data` is the event data as a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookBody {
    pub event_type: String,
    pub data: String,
}

impl WebhookBody {
    pub fn from_event(event: &Event) -> Result<Self, ForwardError> {
        Ok(Self {
            event_type: event.event_type.clone(),
            data: serde_json::to_string(&event.data)?,
        })
    }
}

/// Forwards consumed events to an external notification webhook.
pub struct NotificationForwarder {
    client: Client,
    config: ForwarderConfig,
}

impl NotificationForwarder {
    /// Create a new forwarder with the given configuration.
    pub fn new(config: ForwarderConfig) -> Result<Self, ForwardError> {
        if config.webhook_url.is_empty() {
            return Err(ForwardError::Config(
                "notification webhook URL not configured".to_string(),
            ));
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// Post one event to the webhook. 2xx is success; everything else is an error.
    pub async fn forward(&self, event: &Event) -> Result<StatusCode, ForwardError> {
        let body = WebhookBody::from_event(event)?;

        debug!(
            endpoint = %self.config.webhook_url,
            event_type = %body.event_type,
            "Forwarding notification"
        );

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            debug!(status = %status, response = %truncate(&text), "Notification accepted");
            Ok(status)
        } else {
            Err(ForwardError::Status {
                status,
                body: truncate(&text),
            })
        }
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_BODY_CHARS).collect()
}

#[async_trait]
impl EventHandler for NotificationForwarder {
    async fn handle(&self, event: Event) {
        match self.forward(&event).await {
            Ok(status) => info!(
                event_type = %event.event_type,
                status = %status,
                "Notification sent"
            ),
            Err(e) => error!(
                event_type = %event.event_type,
                endpoint = %self.config.webhook_url,
                error = %e,
                "Failed to notify, dropping event"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventKind;
    use axum::{extract::State, http::StatusCode as AxumStatus, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Received = Arc<Mutex<Vec<Value>>>;

    /// Start a webhook receiver answering with `status`; returns its URL.
    async fn start_receiver(status: u16) -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/notify",
                post(
                    move |State(received): State<Received>, Json(body): Json<Value>| async move {
                        received.lock().await.push(body);
                        (AxumStatus::from_u16(status).unwrap(), "ack")
                    },
                ),
            )
            .with_state(Arc::clone(&received));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/notify", addr), received)
    }

    fn like_event() -> Event {
        Event::from_payload(
            EventKind::NewLike,
            &json!({"post_id": 5, "liked_by_user_id": "u2", "post_owner_id": "u1"}),
        )
        .unwrap()
    }

    fn forwarder(url: &str) -> NotificationForwarder {
        NotificationForwarder::new(
            ForwarderConfig::default()
                .with_webhook_url(url)
                .with_timeout(Duration::from_secs(2)),
        )
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = ForwarderConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.webhook_url.is_empty());
    }

    #[test]
    fn test_empty_endpoint_fails() {
        let result = NotificationForwarder::new(ForwarderConfig::default());
        assert!(matches!(result, Err(ForwardError::Config(_))));
    }

    #[test]
    fn test_webhook_body_encodes_data_as_string() {
        let body = WebhookBody::from_event(&like_event()).unwrap();
        assert_eq!(body.event_type, "new_like");

        let decoded: Value = serde_json::from_str(&body.data).unwrap();
        assert_eq!(decoded["post_owner_id"], "u1");
    }

    #[tokio::test]
    async fn test_forward_posts_body() {
        let (url, received) = start_receiver(200).await;

        let status = forwarder(&url).forward(&like_event()).await.unwrap();

        assert_eq!(status, StatusCode::OK);
        let bodies = received.lock().await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["event_type"], "new_like");
        assert!(bodies[0]["data"].is_string());
    }

    #[tokio::test]
    async fn test_forward_non_success_is_error() {
        let (url, received) = start_receiver(503).await;

        let result = forwarder(&url).forward(&like_event()).await;

        match result {
            Err(ForwardError::Status { status, body }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "ack");
            }
            other => panic!("expected status error, got {:?}", other),
        }
        // No retry.
        assert_eq!(received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_swallows_unreachable_endpoint() {
        let forwarder = forwarder("http://127.0.0.1:1/notify");

        assert!(forwarder.forward(&like_event()).await.is_err());
        // Must not panic or propagate.
        forwarder.handle(like_event()).await;
    }

    #[tokio::test]
    async fn test_handle_swallows_rejection() {
        let (url, received) = start_receiver(400).await;

        forwarder(&url).handle(like_event()).await;

        assert_eq!(received.lock().await.len(), 1);
    }
}
