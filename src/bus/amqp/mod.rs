//! AMQP (RabbitMQ) transport.
//!
//! Publishes through the default exchange straight to a named durable queue
//! and consumes that queue with automatic acknowledgement.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    protocol::{AMQPErrorKind, AMQPHardError, AMQPSoftError},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tracing::{debug, info};

use super::{BrokerChannel, BusError, DeliveryStream, Result, Transport};

/// Reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

/// Persistent delivery mode.
const PERSISTENT: u8 = 2;

/// RabbitMQ transport using lapin.
#[derive(Clone, Debug)]
pub struct AmqpTransport {
    /// AMQP connection URL (e.g., amqp://localhost:5672).
    url: String,
    /// Consumer tag prefix; each consume gets a unique suffix.
    consumer_tag: String,
}

impl AmqpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            consumer_tag: "tidings-consumer".to_string(),
        }
    }

    /// Override the consumer tag prefix.
    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn open(&self) -> Result<Box<dyn BrokerChannel>> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| BusError::Connection(format!("Failed to connect: {}", e)))?;

        // create_channel waits for the broker's channel open-ok.
        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(REPLY_SUCCESS, "channel open failed").await;
                return Err(BusError::Connection(format!(
                    "Failed to create channel: {}",
                    e
                )));
            }
        };

        // Publisher confirms: every publish waits for the broker's ack.
        if let Err(e) = channel.confirm_select(ConfirmSelectOptions::default()).await {
            let _ = connection.close(REPLY_SUCCESS, "confirm select failed").await;
            return Err(BusError::Connection(format!(
                "Failed to enable publisher confirms: {}",
                e
            )));
        }

        if !connection.status().connected() || !channel.status().connected() {
            return Err(BusError::Connection(
                "Connection object exists but is not open".to_string(),
            ));
        }

        info!("Connected to RabbitMQ");

        Ok(Box::new(AmqpChannel {
            connection,
            channel,
            consumer_tag: self.consumer_tag.clone(),
        }))
    }
}

/// An open lapin connection and channel.
struct AmqpChannel {
    connection: Connection,
    channel: Channel,
    consumer_tag: String,
}

/// Map a lapin error to the bus taxonomy.
///
/// Only a forced close or a dead socket counts as a disconnect. Any other
/// protocol error is the broker refusing the request and is fatal.
fn classify(queue: &str, err: lapin::Error) -> BusError {
    match &err {
        lapin::Error::ProtocolError(amqp) => match amqp.kind() {
            AMQPErrorKind::Soft(AMQPSoftError::NOTFOUND) => {
                BusError::QueueMissing(queue.to_string())
            }
            AMQPErrorKind::Hard(AMQPHardError::CONNECTIONFORCED) => {
                BusError::BrokerDisconnected(err.to_string())
            }
            _ => BusError::Rejected(err.to_string()),
        },
        lapin::Error::InvalidConnectionState(_)
        | lapin::Error::InvalidChannelState(_)
        | lapin::Error::IOError(_) => BusError::BrokerDisconnected(err.to_string()),
        _ => BusError::Connection(err.to_string()),
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_durable_queue(&self, queue: &str) -> Result<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| classify(queue, e))?;
        Ok(())
    }

    async fn publish_persistent(&self, queue: &str, body: Vec<u8>) -> Result<()> {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT);

        let confirm = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish: {}", e)))?;

        let confirmation = confirm
            .await
            .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {}", e)))?;
        if confirmation.is_nack() {
            return Err(BusError::Publish(format!(
                "Broker nacked message for queue '{}'",
                queue
            )));
        }

        debug!(queue = %queue, bytes = body.len(), "Published message");
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
        // Passive declare: checks existence without creating the queue.
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| classify(queue, e))?;

        let tag = format!("{}-{}", self.consumer_tag, uuid::Uuid::new_v4());
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| classify(queue, e))?;

        info!(queue = %queue, consumer_tag = %tag, "Started consumer");

        let queue = queue.to_string();
        Ok(consumer
            .map(move |delivery| {
                delivery
                    .map(|d| d.data)
                    .map_err(|e| classify(&queue, e))
            })
            .boxed())
    }

    async fn close(&self) -> Result<()> {
        // The channel may already be closed by the broker.
        if self.channel.status().connected() {
            let _ = self.channel.close(REPLY_SUCCESS, "OK").await;
        }
        if self.connection.status().connected() {
            self.connection
                .close(REPLY_SUCCESS, "OK")
                .await
                .map_err(|e| BusError::Connection(format!("Failed to close: {}", e)))?;
        }
        Ok(())
    }
}
