//! Domain records for posts, likes and comments, plus the notification
//! payloads published when an interaction happens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned post identifier.
pub type PostId = i64;
/// Store-assigned comment identifier.
pub type CommentId = i64;

/// Verified caller identity, taken from an already-validated bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// The slice of a post the interaction pipeline reads: who owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub user_id: String,
}

/// A like row. Presence of the row for `(post_id, liked_by_user_id)` is the
/// toggle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub post_id: PostId,
    pub liked_by_user_id: String,
    pub liked_by_username: String,
    pub post_owner_id: String,
    pub created_at: DateTime<Utc>,
}

/// A comment row. `parent_comment_id` is `None` for root comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub user_id: String,
    pub username: String,
    pub comment_text: String,
    pub parent_comment_id: Option<CommentId>,
    pub reply_to_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_comment_id.is_none()
    }
}

/// A root comment with every reply in its subtree flattened beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

impl RootComment {
    pub fn new(comment: Comment) -> Self {
        Self {
            comment,
            replies: Vec::new(),
        }
    }
}

/// Incoming comment creation request.
///
/// Fields are optional so that missing input surfaces as a validation error
/// rather than a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommentRequest {
    pub post_id: Option<PostId>,
    #[serde(alias = "comment")]
    pub text: Option<String>,
    pub parent_comment_id: Option<CommentId>,
    pub reply_to_user_id: Option<String>,
}

impl CommentRequest {
    /// Root comment on a post.
    pub fn root(post_id: PostId, text: impl Into<String>) -> Self {
        Self {
            post_id: Some(post_id),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Reply to an existing comment; the reply target is resolved from the parent.
    pub fn reply(post_id: PostId, parent_comment_id: CommentId, text: impl Into<String>) -> Self {
        Self {
            post_id: Some(post_id),
            text: Some(text.into()),
            parent_comment_id: Some(parent_comment_id),
            reply_to_user_id: None,
        }
    }

    /// Set an explicit reply target.
    pub fn with_reply_to(mut self, user_id: impl Into<String>) -> Self {
        self.reply_to_user_id = Some(user_id.into());
        self
    }
}

/// Result of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeOutcome {
    Liked,
    Unliked,
}

// ============================================================================
// Notification payloads
// ============================================================================

/// `new_like` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLikePayload {
    pub post_id: PostId,
    pub liked_by_user_id: String,
    pub liked_by_username: String,
    pub post_owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Like> for NewLikePayload {
    fn from(like: &Like) -> Self {
        Self {
            post_id: like.post_id,
            liked_by_user_id: like.liked_by_user_id.clone(),
            liked_by_username: like.liked_by_username.clone(),
            post_owner_id: like.post_owner_id.clone(),
            created_at: like.created_at,
        }
    }
}

/// `new_comment` payload, addressed to the post owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommentPayload {
    pub post_id: PostId,
    pub comment_id: CommentId,
    pub comment: String,
    pub commented_by_user_id: String,
    pub commented_by_username: String,
    pub post_owner_id: String,
    pub created_at: DateTime<Utc>,
}

/// `comment_reply` payload, addressed to the author being replied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentReplyPayload {
    pub post_id: PostId,
    pub comment_id: CommentId,
    pub parent_comment_id: CommentId,
    pub comment: String,
    pub replied_by_user_id: String,
    pub replied_by_username: String,
    pub replied_to_user_id: String,
    pub created_at: DateTime<Utc>,
}
