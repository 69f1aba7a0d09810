//! Consumer Loop.
//!
//! Pulls events off a queue and hands each to an `EventHandler`:
//!
//! ```text
//! IDLE -> CONNECTING -> CONSUMING -(broker closed)-> CONNECTING -> CONSUMING ... -> STOPPED
//! ```
//!
//! Messages are acknowledged on receipt, so delivery is at most once per
//! attempt: a crash between receipt and handler completion loses the event.
//! A broker-initiated disconnect triggers a reconnect to the same queue.
//! A missing queue or an exhausted connect budget is fatal. A local stop
//! request closes the connection and returns `Ok(())`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use super::{BusError, ConnectionManager, Event, EventHandler, Result};

/// Observable state of the Consumer Loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Connecting,
    Consuming,
    Stopped,
}

/// Requests a graceful stop of a running `ConsumerLoop`.
#[derive(Clone)]
pub struct StopHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Signal the loop to stop. A stop requested before `run` is kept.
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }
}

/// Why an active consume session ended.
enum SessionEnd {
    Stopped,
    Disconnected(BusError),
    Fatal(BusError),
}

/// Single-worker consumer of one queue.
pub struct ConsumerLoop {
    manager: ConnectionManager,
    queue: String,
    handler: Arc<dyn EventHandler>,
    cancel: Arc<watch::Sender<bool>>,
    state: watch::Sender<ConsumerState>,
    reconnects: AtomicU64,
}

impl ConsumerLoop {
    pub fn new(
        manager: ConnectionManager,
        queue: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            manager,
            queue: queue.into(),
            handler,
            cancel: Arc::new(cancel),
            state,
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Number of reconnects after broker-initiated disconnects.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }

    /// Run until stopped. Returns `Err` only for fatal broker errors.
    pub async fn run(&self) -> Result<()> {
        let mut stop = self.cancel.subscribe();

        let result = self.run_sessions(&mut stop).await;
        self.set_state(ConsumerState::Stopped);

        match &result {
            Ok(()) => info!(queue = %self.queue, "Consumer stopped"),
            Err(e) => error!(queue = %self.queue, error = %e, "Consumer failed"),
        }
        result
    }

    async fn run_sessions(&self, stop: &mut watch::Receiver<bool>) -> Result<()> {
        loop {
            if *stop.borrow_and_update() {
                return Ok(());
            }

            self.set_state(ConsumerState::Connecting);
            let mut connection = tokio::select! {
                connected = self.manager.connect() => connected?,
                _ = stopped(stop) => return Ok(()),
            };

            let deliveries = match connection.consume(&self.queue).await {
                Ok(deliveries) => deliveries,
                Err(e) if e.is_fatal() => {
                    let _ = connection.close().await;
                    return Err(e);
                }
                Err(e) => {
                    warn!(queue = %self.queue, error = %e, "Failed to start consuming, reconnecting");
                    let _ = connection.close().await;
                    tokio::select! {
                        _ = tokio::time::sleep(self.manager.policy().retry_interval) => continue,
                        _ = stopped(stop) => return Ok(()),
                    }
                }
            };

            self.set_state(ConsumerState::Consuming);
            info!(queue = %self.queue, "Consuming from queue");

            match self.consume_session(deliveries, stop).await {
                SessionEnd::Stopped => {
                    if let Err(e) = connection.close().await {
                        warn!(error = %e, "Failed to close connection on stop");
                    }
                    return Ok(());
                }
                SessionEnd::Fatal(e) => {
                    let _ = connection.close().await;
                    return Err(e);
                }
                SessionEnd::Disconnected(e) => {
                    warn!(queue = %self.queue, error = %e, "Connection closed. Reconnecting...");
                    let _ = connection.close().await;
                    self.reconnects.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    async fn consume_session(
        &self,
        mut deliveries: super::DeliveryStream,
        stop: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                _ = stopped(stop) => return SessionEnd::Stopped,
                delivery = deliveries.next() => match delivery {
                    Some(Ok(body)) => self.dispatch(&body).await,
                    Some(Err(e)) if e.is_fatal() => return SessionEnd::Fatal(e),
                    Some(Err(e)) => return SessionEnd::Disconnected(e),
                    None => {
                        return SessionEnd::Disconnected(BusError::BrokerDisconnected(
                            "delivery stream ended".to_string(),
                        ))
                    }
                },
            }
        }
    }

    /// Decode one delivery and run the handler. Malformed bodies are dropped.
    async fn dispatch(&self, body: &[u8]) {
        let event = match Event::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    queue = %self.queue,
                    error = %e,
                    bytes = body.len(),
                    "Dropping malformed message"
                );
                return;
            }
        };

        debug!(event_type = %event.event_type, "Received event");
        let span = tracing::info_span!("bus.consume", event_type = %event.event_type);
        self.handler.handle(event).instrument(span).await;
    }
}

/// Resolves once a stop has been requested.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            // Sender gone: no stop can ever arrive.
            std::future::pending::<()>().await;
        }
    }
}
