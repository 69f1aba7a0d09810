//! Broker connection management.
//!
//! Establishes a connection with a bounded, fixed-interval retry budget and
//! hands out only fully open connections.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use tracing::{error, info, warn};

use super::{BrokerChannel, BusError, DeliveryStream, Result, Transport};

/// Default number of connection attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 12;
/// Default delay between connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Connection retry policy: `max_retries` attempts, `retry_interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_interval: Duration) -> Self {
        Self {
            max_retries,
            retry_interval,
        }
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delays between attempts. Yields one fewer delay than there are attempts.
    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.retry_interval)
            .with_max_times(self.max_retries.saturating_sub(1) as usize)
    }
}

/// Lifecycle of a broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Consuming,
}

/// An open broker connection with its channel.
///
/// Owned by exactly one component; closed explicitly on shutdown.
pub struct Connection {
    channel: Box<dyn BrokerChannel>,
    state: ConnectionState,
}

impl Connection {
    fn new(channel: Box<dyn BrokerChannel>) -> Self {
        Self {
            channel,
            state: ConnectionState::Open,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub async fn declare_durable_queue(&self, queue: &str) -> Result<()> {
        self.channel.declare_durable_queue(queue).await
    }

    pub async fn publish_persistent(&self, queue: &str, body: Vec<u8>) -> Result<()> {
        self.channel.publish_persistent(queue, body).await
    }

    /// Begin consuming `queue`; the connection moves to `Consuming`.
    pub async fn consume(&mut self, queue: &str) -> Result<DeliveryStream> {
        let deliveries = self.channel.consume(queue).await?;
        self.state = ConnectionState::Consuming;
        Ok(deliveries)
    }

    /// Close channel and connection.
    pub async fn close(mut self) -> Result<()> {
        self.state = ConnectionState::Disconnected;
        self.channel.close().await
    }
}

/// Connects to a broker under a retry policy.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Connect, retrying at a fixed interval.
    ///
    /// Fails with `BusError::BrokerUnreachable` once the budget is spent.
    pub async fn connect(&self) -> Result<Connection> {
        let max_retries = self.policy.max_retries.max(1);
        let mut delays = self.policy.backoff().build();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            info!(attempt, max_retries, "Connecting to broker");

            match self.transport.open().await {
                Ok(channel) => {
                    info!(attempt, "Connected to broker");
                    return Ok(Connection::new(channel));
                }
                Err(e) => match delays.next() {
                    Some(delay) => {
                        warn!(
                            attempt,
                            max_retries,
                            error = %e,
                            retry_in_ms = %delay.as_millis(),
                            "Failed to connect to broker, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(
                            attempts = attempt,
                            error = %e,
                            "Broker unreachable, retry budget exhausted"
                        );
                        return Err(BusError::BrokerUnreachable {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }
                },
            }
        }
    }
}
