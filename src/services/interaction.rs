//! Like toggling and comment creation with notification routing.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use super::threads::build_threads;
use super::{InteractionError, Result};
use crate::bus::{Event, EventKind, EventPublisher};
use crate::model::{
    Comment, CommentId, CommentReplyPayload, CommentRequest, Identity, Like, LikeOutcome,
    NewCommentPayload, NewLikePayload, Post, PostId, RootComment,
};
use crate::storage::{from_rows, to_row, Filter, Row, StorageError, Store, Table};

/// Records likes and comments, then publishes the matching notification.
///
/// Publishing happens after the store write has committed. A publish failure
/// is returned to the caller but does not roll the write back.
pub struct InteractionService {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
}

impl InteractionService {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Like the post, or remove an existing like. Only a new like is announced.
    #[tracing::instrument(name = "interaction.toggle_like", skip_all, fields(post_id = post_id, user_id = %identity.user_id))]
    pub async fn toggle_like(&self, post_id: PostId, identity: &Identity) -> Result<LikeOutcome> {
        let existing = Filter::new()
            .where_eq("post_id", post_id)
            .where_eq("liked_by_user_id", identity.user_id.as_str());

        if !self.store.get(Table::Likes, &existing).await?.is_empty() {
            self.store.delete(Table::Likes, &existing).await?;
            info!("Like removed");
            return Ok(LikeOutcome::Unliked);
        }

        let post = self.find_post(post_id).await?;
        let row = to_row(&json!({
            "post_id": post_id,
            "liked_by_user_id": identity.user_id,
            "liked_by_username": identity.username,
            "post_owner_id": post.user_id,
        }))?;
        let like: Like = single(self.store.insert(Table::Likes, row).await?)?;

        self.publish(EventKind::NewLike, &NewLikePayload::from(&like))
            .await?;
        info!("Like recorded");
        Ok(LikeOutcome::Liked)
    }

    /// Create a root comment or a reply and notify whoever it is addressed to.
    ///
    /// A parent must be a comment on the same post. When a parent is given
    /// without an explicit reply target, the target is the parent's author
    /// (not the thread root's).
    #[tracing::instrument(name = "interaction.add_comment", skip_all, fields(post_id = ?request.post_id, user_id = %identity.user_id))]
    pub async fn add_comment(&self, identity: &Identity, request: CommentRequest) -> Result<Comment> {
        let post_id = request
            .post_id
            .ok_or_else(|| InteractionError::InvalidRequest("post_id is required".to_string()))?;
        let text = request
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| InteractionError::InvalidRequest("comment text is required".to_string()))?;

        let post = self.find_post(post_id).await?;

        let reply_to_user_id = match request.parent_comment_id {
            Some(parent_id) => {
                let parent = self.find_comment(post_id, parent_id).await?;
                request.reply_to_user_id.or(Some(parent.user_id))
            }
            None => request.reply_to_user_id,
        };

        let row = to_row(&json!({
            "post_id": post_id,
            "user_id": identity.user_id,
            "username": identity.username,
            "comment_text": text,
            "parent_comment_id": request.parent_comment_id,
            "reply_to_user_id": reply_to_user_id,
        }))?;
        let comment: Comment = single(self.store.insert(Table::Comments, row).await?)?;

        match (comment.parent_comment_id, comment.reply_to_user_id.as_deref()) {
            (Some(parent_comment_id), Some(target)) if target != identity.user_id => {
                let payload = CommentReplyPayload {
                    post_id,
                    comment_id: comment.id,
                    parent_comment_id,
                    comment: comment.comment_text.clone(),
                    replied_by_user_id: identity.user_id.clone(),
                    replied_by_username: identity.username.clone(),
                    replied_to_user_id: target.to_string(),
                    created_at: comment.created_at,
                };
                self.publish(EventKind::CommentReply, &payload).await?;
            }
            (None, _) if post.user_id != identity.user_id => {
                let payload = NewCommentPayload {
                    post_id,
                    comment_id: comment.id,
                    comment: comment.comment_text.clone(),
                    commented_by_user_id: identity.user_id.clone(),
                    commented_by_username: identity.username.clone(),
                    post_owner_id: post.user_id.clone(),
                    created_at: comment.created_at,
                };
                self.publish(EventKind::NewComment, &payload).await?;
            }
            _ => debug!(comment_id = comment.id, "Comment addressed to its author, not notifying"),
        }

        info!(comment_id = comment.id, "Comment recorded");
        Ok(comment)
    }

    /// Threads for a post, newest root first.
    pub async fn comments_for_post(&self, post_id: PostId) -> Result<Vec<RootComment>> {
        let rows = self
            .store
            .get(Table::Comments, &Filter::new().where_eq("post_id", post_id))
            .await?;
        let mut comments: Vec<Comment> = from_rows(rows)?;
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(build_threads(comments))
    }

    pub async fn likes_for_post(&self, post_id: PostId) -> Result<Vec<Like>> {
        let rows = self
            .store
            .get(Table::Likes, &Filter::new().where_eq("post_id", post_id))
            .await?;
        Ok(from_rows(rows)?)
    }

    async fn find_post(&self, post_id: PostId) -> Result<Post> {
        let rows = self
            .store
            .get(Table::Posts, &Filter::new().where_eq("id", post_id))
            .await?;
        from_rows::<Post>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| InteractionError::NotFound(format!("post {}", post_id)))
    }

    async fn find_comment(&self, post_id: PostId, comment_id: CommentId) -> Result<Comment> {
        let filter = Filter::new()
            .where_eq("id", comment_id)
            .where_eq("post_id", post_id);
        let rows = self.store.get(Table::Comments, &filter).await?;
        from_rows::<Comment>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                InteractionError::NotFound(format!("comment {} on post {}", comment_id, post_id))
            })
    }

    async fn publish<T: Serialize>(&self, kind: EventKind, payload: &T) -> Result<()> {
        let event = Event::from_payload(kind, payload)?;
        self.publisher.publish(&event).await?;
        Ok(())
    }
}

/// The row an insert handed back.
fn single<T: DeserializeOwned>(rows: Vec<Row>) -> Result<T> {
    from_rows::<T>(rows)?
        .into_iter()
        .next()
        .ok_or_else(|| StorageError::InvalidRow("insert returned no row".to_string()).into())
}
