//! Tidings - social interaction notification pipeline
//!
//! Records likes and comments, queues a notification event for each on a
//! durable broker queue, and forwards consumed events to an external
//! notification webhook. Also rebuilds flat comment logs into two-level
//! threads for display.

pub mod bus;
pub mod config;
pub mod handlers;
pub mod model;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
