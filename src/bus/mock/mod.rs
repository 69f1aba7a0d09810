//! Mock publisher for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, Event, EventKind, EventPublisher, Result};

/// Mock publisher that records events in memory.
#[derive(Default)]
pub struct MockPublisher {
    published: RwLock<Vec<Event>>,
    fail_on_publish: RwLock<bool>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<Event> {
        self.published.read().await.clone()
    }

    pub async fn published_of(&self, kind: EventKind) -> Vec<Event> {
        self.published
            .read()
            .await
            .iter()
            .filter(|e| e.is(kind))
            .cloned()
            .collect()
    }

    pub async fn take_published(&self) -> Vec<Event> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish(&self, event: &Event) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Connection("Mock publish failure".to_string()));
        }
        self.published.write().await.push(event.clone());
        Ok(())
    }
}
