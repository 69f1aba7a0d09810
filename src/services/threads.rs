//! Comment thread reconstruction.
//!
//! Collapses an arbitrarily nested reply forest into two levels: each root
//! comment carries every reply in its subtree, oldest first.

use std::collections::HashMap;

use tracing::debug;

use crate::model::{Comment, CommentId, RootComment};

/// Group `comments` into threads.
///
/// Roots keep their input order. Replies are attributed to their
/// root ancestor and sorted ascending by `created_at` (ties keep input
/// order). Replies whose parent chain is dangling or cyclic are dropped.
pub fn build_threads(comments: Vec<Comment>) -> Vec<RootComment> {
    let parents: HashMap<CommentId, Option<CommentId>> = comments
        .iter()
        .map(|c| (c.id, c.parent_comment_id))
        .collect();

    let (roots, replies): (Vec<Comment>, Vec<Comment>) =
        comments.into_iter().partition(Comment::is_root);

    let mut threads: Vec<RootComment> = roots.into_iter().map(RootComment::new).collect();
    let mut positions: HashMap<CommentId, usize> = HashMap::with_capacity(threads.len());
    for (position, thread) in threads.iter().enumerate() {
        positions.entry(thread.comment.id).or_insert(position);
    }

    for reply in replies {
        let thread = resolve_root(&parents, &reply).and_then(|root| positions.get(&root));
        match thread {
            Some(&position) => threads[position].replies.push(reply),
            None => debug!(
                comment_id = reply.id,
                parent_comment_id = ?reply.parent_comment_id,
                "Dropping reply without a reachable root"
            ),
        }
    }

    for thread in &mut threads {
        thread.replies.sort_by_key(|c| c.created_at);
    }

    threads
}

/// Walk parent links up to the root. A chain longer than the comment set
/// must revisit a comment, so the walk is bounded by its size.
fn resolve_root(
    parents: &HashMap<CommentId, Option<CommentId>>,
    reply: &Comment,
) -> Option<CommentId> {
    let mut current = reply.parent_comment_id?;
    for _ in 0..parents.len() {
        match parents.get(&current)? {
            None => return Some(current),
            Some(next) => current = *next,
        }
    }
    None
}
