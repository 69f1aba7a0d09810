//! Event handlers run by the Consumer Loop.

pub mod forwarder;

pub use forwarder::{ForwardError, ForwarderConfig, NotificationForwarder};
