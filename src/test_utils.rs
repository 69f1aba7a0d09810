//! Test utilities.
//!
//! Recording handlers and fixtures for exercising the pipeline without a
//! real broker, store or webhook endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{watch, Notify, RwLock};

use crate::bus::{ConsumerState, Event, EventHandler};
use crate::model::{Comment, CommentId};

/// How long helpers wait before failing a test.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Handler that records every event it receives.
#[derive(Default)]
pub struct RecordingHandler {
    events: RwLock<Vec<Event>>,
    notify: Notify,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    /// Wait until at least `count` events have been handled.
    pub async fn wait_for(&self, count: usize) {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.events.read().await.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(WAIT_TIMEOUT, wait).await.is_err() {
            panic!(
                "timed out waiting for {} events, got {}",
                count,
                self.events.read().await.len()
            );
        }
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: Event) {
        self.events.write().await.push(event);
        self.notify.notify_waiters();
    }
}

/// Wait for a consumer to reach `expected`.
pub async fn wait_for_state(state: &mut watch::Receiver<ConsumerState>, expected: ConsumerState) {
    let wait = state.wait_for(|s| *s == expected);
    match tokio::time::timeout(WAIT_TIMEOUT, wait).await {
        Ok(Ok(_)) => {}
        Ok(Err(_)) => panic!("consumer dropped before reaching {:?}", expected),
        Err(_) => panic!("timed out waiting for consumer state {:?}", expected),
    }
}

/// Fixed timestamp `minutes` after a base instant.
pub fn at_minute(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

/// Build a comment with the given id, parent and creation minute.
pub fn make_comment(
    id: CommentId,
    parent: Option<CommentId>,
    user_id: &str,
    minute: i64,
) -> Comment {
    Comment {
        id,
        post_id: 1,
        user_id: user_id.to_string(),
        username: format!("{}-name", user_id),
        comment_text: format!("comment {}", id),
        parent_comment_id: parent,
        reply_to_user_id: None,
        created_at: at_minute(minute),
    }
}
