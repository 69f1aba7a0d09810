//! Database schema for the interaction tables.
//!
//! Store-assigned columns: `id` (autoincrement) and `created_at`
//! (RFC 3339 UTC with milliseconds, so text order is time order).

/// SQL for creating the post table (owned by the post service; only
/// ownership is read here).
pub const CREATE_POST_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS post (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
"#;

/// SQL for creating the likes table. One like per (post, user).
pub const CREATE_LIKES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS likes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id INTEGER NOT NULL,
    liked_by_user_id TEXT NOT NULL,
    liked_by_username TEXT NOT NULL,
    post_owner_id TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE (post_id, liked_by_user_id)
);

CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id);
"#;

/// SQL for creating the comments table.
pub const CREATE_COMMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    username TEXT NOT NULL,
    comment_text TEXT NOT NULL,
    parent_comment_id INTEGER,
    reply_to_user_id TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
"#;
