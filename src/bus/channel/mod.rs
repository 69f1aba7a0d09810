//! In-process channel-based broker.
//!
//! Models the parts of a durable-queue broker the pipeline depends on:
//! named queues that outlive connections, auto-ack delivery through tokio
//! channels, and broker-initiated disconnects. Fault injection hooks make
//! it the backbone of the bus tests; it also runs the pipeline locally
//! without RabbitMQ.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use super::{BrokerChannel, BusError, DeliveryStream, Result, Transport};

struct Consumer {
    connection: u64,
    sender: mpsc::UnboundedSender<Result<Vec<u8>>>,
}

#[derive(Default)]
struct Queue {
    durable: bool,
    messages: VecDeque<Vec<u8>>,
    consumers: Vec<Consumer>,
    next_consumer: usize,
}

impl Queue {
    /// Hand the body to a live consumer, or buffer it.
    fn deliver(&mut self, body: Vec<u8>) -> bool {
        let mut body = body;
        while !self.consumers.is_empty() {
            let idx = self.next_consumer % self.consumers.len();
            match self.consumers[idx].sender.send(Ok(body)) {
                Ok(()) => {
                    self.next_consumer = idx + 1;
                    return true;
                }
                Err(mpsc::error::SendError(returned)) => {
                    // Receiver dropped without closing the channel.
                    self.consumers.remove(idx);
                    body = returned.unwrap_or_default();
                }
            }
        }
        self.messages.push_back(body);
        false
    }
}

#[derive(Default)]
struct Inner {
    queues: HashMap<String, Queue>,
    open_connections: HashSet<u64>,
    next_connection: u64,
    connect_attempts: u32,
    failing_connects: u32,
    failing_consumes: u32,
    delivered: usize,
}

/// In-process broker. Cloning shares the same queues.
#[derive(Clone, Default)]
pub struct ChannelBroker {
    inner: Arc<Mutex<Inner>>,
}

impl ChannelBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a durable queue out of band, as an operator would.
    pub fn declare_queue(&self, queue: &str) {
        self.lock().queues.entry(queue.to_string()).or_default().durable = true;
    }

    /// Delete a queue. Active consumers see `QueueMissing`.
    pub fn delete_queue(&self, queue: &str) {
        if let Some(removed) = self.lock().queues.remove(queue) {
            for consumer in removed.consumers {
                let _ = consumer
                    .sender
                    .send(Err(BusError::QueueMissing(queue.to_string())));
            }
        }
    }

    /// Enqueue a raw body, bypassing any client connection.
    pub fn inject(&self, queue: &str, body: impl Into<Vec<u8>>) {
        let mut inner = self.lock();
        let delivered = match inner.queues.get_mut(queue) {
            Some(q) => q.deliver(body.into()),
            None => false,
        };
        if delivered {
            inner.delivered += 1;
        }
    }

    /// Close every client connection from the broker side.
    pub fn disconnect_all(&self) {
        let mut inner = self.lock();
        let closed = inner.open_connections.len();
        inner.open_connections.clear();
        for queue in inner.queues.values_mut() {
            for consumer in queue.consumers.drain(..) {
                let _ = consumer.sender.send(Err(BusError::BrokerDisconnected(
                    "connection closed by broker".to_string(),
                )));
            }
        }
        info!(closed, "Broker closed all connections");
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().failing_connects = count;
    }

    /// Make the next `count` consume requests fail with a channel close.
    pub fn fail_next_consumes(&self, count: u32) {
        self.lock().failing_consumes = count;
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open_connections.len()
    }

    pub fn queue_exists(&self, queue: &str) -> bool {
        self.lock().queues.contains_key(queue)
    }

    pub fn is_durable(&self, queue: &str) -> bool {
        self.lock().queues.get(queue).is_some_and(|q| q.durable)
    }

    /// Messages waiting in `queue` with no consumer to take them.
    pub fn pending(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.messages.len())
    }

    /// Messages handed to consumers (and thereby acknowledged).
    pub fn delivered(&self) -> usize {
        self.lock().delivered
    }

    pub fn consumer_count(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.consumers.len())
    }
}

#[async_trait]
impl Transport for ChannelBroker {
    async fn open(&self) -> Result<Box<dyn BrokerChannel>> {
        let mut inner = self.lock();
        inner.connect_attempts += 1;

        if inner.failing_connects > 0 {
            inner.failing_connects -= 1;
            return Err(BusError::Connection("connection refused".to_string()));
        }

        let connection = inner.next_connection;
        inner.next_connection += 1;
        inner.open_connections.insert(connection);
        debug!(connection, "Channel broker connection opened");

        Ok(Box::new(ChannelBrokerChannel {
            broker: self.clone(),
            connection,
        }))
    }
}

/// A client channel on the in-process broker.
struct ChannelBrokerChannel {
    broker: ChannelBroker,
    connection: u64,
}

impl ChannelBrokerChannel {
    fn ensure_open(&self, inner: &Inner) -> Result<()> {
        if inner.open_connections.contains(&self.connection) {
            Ok(())
        } else {
            Err(BusError::BrokerDisconnected(format!(
                "connection {} is closed",
                self.connection
            )))
        }
    }
}

#[async_trait]
impl BrokerChannel for ChannelBrokerChannel {
    async fn declare_durable_queue(&self, queue: &str) -> Result<()> {
        let mut inner = self.broker.lock();
        self.ensure_open(&inner)?;
        inner.queues.entry(queue.to_string()).or_default().durable = true;
        Ok(())
    }

    async fn publish_persistent(&self, queue: &str, body: Vec<u8>) -> Result<()> {
        let mut inner = self.broker.lock();
        self.ensure_open(&inner)?;
        let delivered = match inner.queues.get_mut(queue) {
            Some(q) => q.deliver(body),
            None => {
                // Default exchange drops unroutable messages.
                debug!(queue = %queue, "No such queue, message dropped");
                false
            }
        };
        if delivered {
            inner.delivered += 1;
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
        let mut inner = self.broker.lock();
        self.ensure_open(&inner)?;

        if inner.failing_consumes > 0 {
            inner.failing_consumes -= 1;
            return Err(BusError::BrokerDisconnected(
                "channel closed during consume".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let drained = {
            let q = inner
                .queues
                .get_mut(queue)
                .ok_or_else(|| BusError::QueueMissing(queue.to_string()))?;

            let mut drained = 0;
            while let Some(body) = q.messages.pop_front() {
                if sender.send(Ok(body)).is_err() {
                    break;
                }
                drained += 1;
            }
            q.consumers.push(Consumer {
                connection: self.connection,
                sender,
            });
            drained
        };
        inner.delivered += drained;

        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.broker.lock();
        inner.open_connections.remove(&self.connection);
        for queue in inner.queues.values_mut() {
            queue.consumers.retain(|c| c.connection != self.connection);
        }
        debug!(connection = self.connection, "Channel broker connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
