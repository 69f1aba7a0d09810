//! Notification bus.
//!
//! This module contains:
//! - `Event`: the message deposited on the queue
//! - `Transport` / `BrokerChannel` traits: the broker seam
//! - `EventHandler` / `EventPublisher` traits: the consumer and producer seams
//! - Connection Manager, Publisher and Consumer Loop built on those seams
//! - Implementations: AMQP (RabbitMQ), in-process channel broker, mock publisher

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

// Implementation modules
#[cfg(feature = "amqp")]
pub mod amqp;
pub mod channel;
pub mod connection;
pub mod consumer;
pub mod mock;
pub mod publisher;

// Re-exports
#[cfg(feature = "amqp")]
pub use amqp::AmqpTransport;
pub use channel::ChannelBroker;
pub use connection::{Connection, ConnectionManager, ConnectionState, RetryPolicy};
pub use consumer::{ConsumerLoop, ConsumerState, StopHandle};
pub use mock::MockPublisher;
pub use publisher::QueuePublisher;

// ============================================================================
// Errors
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Retry budget exhausted while connecting.
    #[error("Broker unreachable after {attempts} attempts: {last_error}")]
    BrokerUnreachable { attempts: u32, last_error: String },

    /// The queue does not exist on the broker.
    #[error("Queue '{0}' not found")]
    QueueMissing(String),

    /// The broker refused a request for a reason reconnecting cannot fix,
    /// such as missing permissions or mismatched queue arguments.
    #[error("Broker rejected request: {0}")]
    Rejected(String),

    /// The broker closed the connection or channel.
    #[error("Connection closed by broker: {0}")]
    BrokerDisconnected(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    /// Fatal errors cannot be cured by reconnecting.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BusError::BrokerUnreachable { .. }
                | BusError::QueueMissing(_)
                | BusError::Rejected(_)
        )
    }
}

// ============================================================================
// Event
// ============================================================================

/// Kinds of social interaction announced on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NewLike,
    NewComment,
    CommentReply,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewLike => "new_like",
            EventKind::NewComment => "new_comment",
            EventKind::CommentReply => "comment_reply",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message body on the broker: `{"event_type": ..., "data": {...}}`.
///
/// Events carry no identity; consumers must tolerate redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Build an event from a typed payload that serializes to a JSON object.
    pub fn from_payload<T: Serialize>(kind: EventKind, payload: &T) -> Result<Self> {
        match serde_json::to_value(payload)? {
            serde_json::Value::Object(data) => Ok(Self::new(kind.as_str(), data)),
            other => Err(BusError::Publish(format!(
                "{} payload must be a JSON object, got {}",
                kind, other
            ))),
        }
    }

    /// Encode as the JSON wire body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a wire body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn is(&self, kind: EventKind) -> bool {
        self.event_type == kind.as_str()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Stream of delivered message bodies.
///
/// An `Err` item or the end of the stream means the consumer is gone.
pub type DeliveryStream = BoxStream<'static, Result<Vec<u8>>>;

/// A broker that can be connected to.
///
/// Implementations:
/// - `AmqpTransport`: RabbitMQ via AMQP
/// - `ChannelBroker`: in-process broker for local runs and tests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Make a single connection attempt.
    ///
    /// Returns only once the broker has acknowledged an open channel.
    async fn open(&self) -> Result<Box<dyn BrokerChannel>>;
}

/// An open channel on a broker connection.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a queue that survives broker restarts.
    async fn declare_durable_queue(&self, queue: &str) -> Result<()>;

    /// Send a persistent message to `queue` via the default exchange.
    async fn publish_persistent(&self, queue: &str, body: Vec<u8>) -> Result<()>;

    /// Start consuming an existing queue with automatic acknowledgement.
    ///
    /// Fails with `BusError::QueueMissing` if the queue does not exist.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream>;

    /// Close the channel and its connection.
    async fn close(&self) -> Result<()>;
}

/// Handler invoked by the Consumer Loop for each delivered event.
///
/// Delivery is acknowledged before the handler runs, so a failure inside the
/// handler is never redelivered. Handlers swallow their own errors.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event);
}

/// Producer side of the bus, used on the request path.
///
/// Implementations:
/// - `QueuePublisher`: durable queue on a broker
/// - `MockPublisher`: in-memory recorder for testing
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deposit an event on the queue. Failures are returned, not retried.
    async fn publish(&self, event: &Event) -> Result<()>;
}
