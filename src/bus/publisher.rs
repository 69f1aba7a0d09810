//! Queue publisher.
//!
//! Deposits events on a durable queue as persistent messages. Runs on the
//! request path: failures go back to the caller. A cached connection the
//! broker has dropped is replaced once within the same publish.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::{BusError, Connection, ConnectionManager, Event, EventKind, EventPublisher, Result};

/// Publishes events to a single durable queue, reusing one connection.
pub struct QueuePublisher {
    manager: Arc<ConnectionManager>,
    queue: String,
    connection: Mutex<Option<Connection>>,
}

impl QueuePublisher {
    pub fn new(manager: Arc<ConnectionManager>, queue: impl Into<String>) -> Self {
        Self {
            manager,
            queue: queue.into(),
            connection: Mutex::new(None),
        }
    }

    /// Serialize a typed payload and publish it.
    pub async fn publish_payload<T: Serialize>(&self, kind: EventKind, payload: &T) -> Result<()> {
        let event = Event::from_payload(kind, payload)?;
        self.publish(&event).await
    }

    async fn send(&self, connection: &Connection, body: Vec<u8>) -> Result<()> {
        connection.declare_durable_queue(&self.queue).await?;
        connection.publish_persistent(&self.queue, body).await
    }

    /// Close the cached connection, if any.
    pub async fn close(&self) -> Result<()> {
        match self.connection.lock().await.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EventPublisher for QueuePublisher {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(event_type = %event.event_type, queue = %self.queue))]
    async fn publish(&self, event: &Event) -> Result<()> {
        let body = event.to_bytes()?;
        let mut guard = self.connection.lock().await;

        if let Some(cached) = guard.take() {
            match self.send(&cached, body.clone()).await {
                Ok(()) => {
                    debug!("Published event");
                    *guard = Some(cached);
                    return Ok(());
                }
                Err(BusError::BrokerDisconnected(reason)) => {
                    warn!(reason = %reason, "Cached connection lost, reconnecting");
                    let _ = cached.close().await;
                }
                Err(e) => {
                    error!(error = %e, "Publish failed, dropping connection");
                    let _ = cached.close().await;
                    return Err(e);
                }
            }
        }

        let connection = self.manager.connect().await?;
        match self.send(&connection, body).await {
            Ok(()) => {
                debug!("Published event");
                *guard = Some(connection);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Publish failed, dropping connection");
                let _ = connection.close().await;
                Err(e)
            }
        }
    }
}
