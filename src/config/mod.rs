//! Application configuration.
//!
//! Aggregates broker, webhook and storage settings into a single Config
//! struct that can be loaded from YAML files or environment variables.

use std::time::Duration;

use serde::Deserialize;

use crate::bus::RetryPolicy;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TIDINGS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TIDINGS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "TIDINGS_LOG";

/// Legacy environment variable for the broker URL.
pub const AMQP_URL_ENV_VAR: &str = "AMQP_URL";
/// Legacy environment variable for the notification queue name.
pub const QUEUE_ENV_VAR: &str = "RABBITMQ_QUEUE";
/// Legacy environment variable for the notification webhook.
pub const NOTIFY_URL_ENV_VAR: &str = "NOTIFY_URL";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker configuration.
    pub messaging: MessagingConfig,
    /// Outbound notification webhook.
    pub notify: NotifyConfig,
    /// Interaction store.
    pub storage: StorageConfig,
}

/// Broker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// AMQP connection URL.
    pub url: String,
    /// Durable queue carrying notification events.
    pub queue: String,
    /// Consumer connection attempts before giving up.
    pub max_retries: u32,
    /// Seconds between consumer connection attempts.
    pub retry_interval_secs: u64,
    /// Publisher connection attempts (request path).
    pub publish_max_retries: u32,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            queue: "notifications".to_string(),
            max_retries: 12,
            retry_interval_secs: 5,
            publish_max_retries: 1,
        }
    }
}

impl MessagingConfig {
    /// Retry policy for the Consumer Loop.
    pub fn consumer_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_secs(self.retry_interval_secs),
        )
    }

    /// Retry policy for the Publisher.
    pub fn publisher_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.publish_max_retries,
            Duration::from_secs(self.retry_interval_secs),
        )
    }
}

/// Outbound notification webhook configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook URL receiving `{"event_type", "data"}` POSTs.
    pub webhook_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type: "sqlite" or "memory".
    #[serde(rename = "type")]
    pub storage_type: String,
    /// Database path for sqlite.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: "sqlite".to_string(),
            path: "data/tidings.db".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Legacy variables `AMQP_URL`, `RABBITMQ_QUEUE`, `NOTIFY_URL`
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("messaging.url", std::env::var(AMQP_URL_ENV_VAR).ok())?
            .set_override_option("messaging.queue", std::env::var(QUEUE_ENV_VAR).ok())?
            .set_override_option("notify.webhook_url", std::env::var(NOTIFY_URL_ENV_VAR).ok())?
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig {
                storage_type: "memory".to_string(),
                path: String::new(),
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.messaging.url, "amqp://localhost:5672");
        assert_eq!(config.messaging.queue, "notifications");
        assert_eq!(config.messaging.max_retries, 12);
        assert_eq!(config.notify.timeout_secs, 30);
        assert_eq!(config.storage.storage_type, "sqlite");
    }

    #[test]
    fn test_policies() {
        let messaging = MessagingConfig::default();
        assert_eq!(messaging.consumer_policy(), RetryPolicy::default());
        assert_eq!(messaging.publisher_policy().max_retries, 1);
    }

    #[test]
    fn test_config_for_test() {
        let config = Config::for_test();
        assert_eq!(config.storage.storage_type, "memory");
    }

    #[test]
    #[serial]
    fn test_load_file_then_legacy_env() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "messaging:\n  url: amqp://file:5672\n  queue: from-file\nnotify:\n  webhook_url: http://file/notify\n  timeout_secs: 7"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.messaging.url, "amqp://file:5672");
        assert_eq!(config.messaging.queue, "from-file");
        assert_eq!(config.notify.timeout_secs, 7);

        std::env::set_var(AMQP_URL_ENV_VAR, "amqp://legacy:5672");
        let config = Config::load(Some(&path)).unwrap();
        std::env::remove_var(AMQP_URL_ENV_VAR);

        assert_eq!(config.messaging.url, "amqp://legacy:5672");
        assert_eq!(config.messaging.queue, "from-file");
    }
}
