//! tidings-listener: notification queue consumer
//!
//! Consumes the notification queue and forwards every event to the
//! configured webhook. Reconnects when the broker drops the connection and
//! exits non-zero when the broker stays unreachable or the queue is missing.
//!
//! ## Configuration
//! - AMQP_URL / TIDINGS__MESSAGING__URL: broker URL
//! - RABBITMQ_QUEUE / TIDINGS__MESSAGING__QUEUE: queue name
//! - NOTIFY_URL / TIDINGS__NOTIFY__WEBHOOK_URL: notification webhook
//! - TIDINGS_LOG: log filter (default "info")

use std::sync::Arc;

use tracing::{error, info};

use tidings::bus::{AmqpTransport, ConnectionManager, ConsumerLoop};
use tidings::config::Config;
use tidings::handlers::{ForwarderConfig, NotificationForwarder};
use tidings::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let forwarder = NotificationForwarder::new(ForwarderConfig::from(&config.notify))?;

    let messaging = &config.messaging;
    let manager = ConnectionManager::new(
        Arc::new(AmqpTransport::new(&messaging.url)),
        messaging.consumer_policy(),
    );
    let consumer = ConsumerLoop::new(manager, &messaging.queue, Arc::new(forwarder));

    let stop = consumer.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping listener");
            stop.stop();
        }
    });

    info!(queue = %messaging.queue, "Listener is running... waiting for messages");
    consumer.run().await?;

    Ok(())
}
