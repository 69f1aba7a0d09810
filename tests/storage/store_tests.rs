//! Store interface tests.
//!
//! These tests verify the contract of the Store trait the interaction
//! service relies on. Each storage implementation should run these tests.

use serde_json::{json, Value};

use tidings::model::{Comment, Like, Post};
use tidings::storage::{from_rows, to_row, Filter, Row, Store, Table};

pub fn row(value: Value) -> Row {
    to_row(&value).expect("fixture must be an object")
}

/// Like row for `user` on `post_id`.
pub fn like_row(post_id: i64, user: &str) -> Row {
    row(json!({
        "post_id": post_id,
        "liked_by_user_id": user,
        "liked_by_username": format!("{}-name", user),
        "post_owner_id": "owner"
    }))
}

pub fn comment_row(post_id: i64, user: &str, parent: Option<i64>) -> Row {
    row(json!({
        "post_id": post_id,
        "user_id": user,
        "username": format!("{}-name", user),
        "comment_text": format!("from {}", user),
        "parent_comment_id": parent,
        "reply_to_user_id": Value::Null,
    }))
}

// =============================================================================
// insert tests
// =============================================================================

pub async fn test_insert_returns_assigned_row<S: Store + ?Sized>(store: &S) {
    let rows = store
        .insert(Table::Posts, row(json!({"user_id": "owner"})))
        .await
        .expect("insert should succeed");

    assert_eq!(rows.len(), 1, "insert returns the inserted row");
    let posts: Vec<Post> = from_rows(rows).expect("row should decode as a post");
    assert!(posts[0].id > 0, "store assigns the id");
    assert_eq!(posts[0].user_id, "owner");
}

pub async fn test_insert_assigns_distinct_ids<S: Store + ?Sized>(store: &S) {
    let first = store
        .insert(Table::Comments, comment_row(100, "a", None))
        .await
        .expect("insert should succeed");
    let second = store
        .insert(Table::Comments, comment_row(100, "b", None))
        .await
        .expect("insert should succeed");

    assert_ne!(first[0]["id"], second[0]["id"]);
}

pub async fn test_insert_assigns_created_at<S: Store + ?Sized>(store: &S) {
    let rows = store
        .insert(Table::Likes, like_row(200, "u1"))
        .await
        .expect("insert should succeed");

    // The fixture has no created_at; decoding a Like requires one.
    let likes: Vec<Like> = from_rows(rows).expect("row should decode as a like");
    assert_eq!(likes[0].liked_by_username, "u1-name");
}

pub async fn test_insert_duplicate_like_rejected<S: Store + ?Sized>(store: &S) {
    store
        .insert(Table::Likes, like_row(201, "u1"))
        .await
        .expect("first like should succeed");

    let duplicate = store.insert(Table::Likes, like_row(201, "u1")).await;
    assert!(duplicate.is_err(), "one like per (post, user)");
}

// =============================================================================
// get tests
// =============================================================================

pub async fn test_get_filters_by_every_condition<S: Store + ?Sized>(store: &S) {
    store.insert(Table::Likes, like_row(300, "u1")).await.unwrap();
    store.insert(Table::Likes, like_row(300, "u2")).await.unwrap();
    store.insert(Table::Likes, like_row(301, "u1")).await.unwrap();

    let on_post = store
        .get(Table::Likes, &Filter::new().where_eq("post_id", 300))
        .await
        .expect("get should succeed");
    assert_eq!(on_post.len(), 2);

    let exact = store
        .get(
            Table::Likes,
            &Filter::new()
                .where_eq("post_id", 300)
                .where_eq("liked_by_user_id", "u2"),
        )
        .await
        .expect("get should succeed");
    assert_eq!(exact.len(), 1);
}

pub async fn test_get_no_match_is_empty<S: Store + ?Sized>(store: &S) {
    let rows = store
        .get(Table::Posts, &Filter::new().where_eq("id", 987_654))
        .await
        .expect("get should succeed");
    assert!(rows.is_empty());
}

pub async fn test_get_null_condition<S: Store + ?Sized>(store: &S) {
    let root = store
        .insert(Table::Comments, comment_row(400, "a", None))
        .await
        .unwrap();
    let root_id = root[0]["id"].as_i64().unwrap();
    store
        .insert(Table::Comments, comment_row(400, "b", Some(root_id)))
        .await
        .unwrap();

    let roots = store
        .get(
            Table::Comments,
            &Filter::new()
                .where_eq("post_id", 400)
                .where_eq("parent_comment_id", Value::Null),
        )
        .await
        .expect("get should succeed");
    assert_eq!(roots.len(), 1);

    let all: Vec<Comment> = from_rows(
        store
            .get(Table::Comments, &Filter::new().where_eq("post_id", 400))
            .await
            .unwrap(),
    )
    .expect("rows should decode as comments");
    assert_eq!(all.len(), 2);
    assert_eq!(all.iter().filter(|c| c.is_root()).count(), 1);
}

// =============================================================================
// update / delete tests
// =============================================================================

pub async fn test_update_returns_patched_rows<S: Store + ?Sized>(store: &S) {
    let inserted = store
        .insert(Table::Posts, row(json!({"user_id": "before"})))
        .await
        .unwrap();
    let filter = Filter::new().where_eq("id", inserted[0]["id"].clone());

    let updated = store
        .update(Table::Posts, &filter, row(json!({"user_id": "after"})))
        .await
        .expect("update should succeed");

    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0]["user_id"], "after");
}

pub async fn test_delete_returns_removed_rows<S: Store + ?Sized>(store: &S) {
    store.insert(Table::Likes, like_row(500, "u1")).await.unwrap();
    let filter = Filter::new()
        .where_eq("post_id", 500)
        .where_eq("liked_by_user_id", "u1");

    let deleted = store
        .delete(Table::Likes, &filter)
        .await
        .expect("delete should succeed");
    assert_eq!(deleted.len(), 1);

    assert!(store.get(Table::Likes, &filter).await.unwrap().is_empty());
    assert!(store.delete(Table::Likes, &filter).await.unwrap().is_empty());

    // The slot is free again once the like is gone.
    store
        .insert(Table::Likes, like_row(500, "u1"))
        .await
        .expect("re-like should succeed");
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all Store interface tests against a store implementation.
#[macro_export]
macro_rules! run_store_tests {
    ($store:expr) => {
        use $crate::storage::store_tests::*;

        // insert tests
        test_insert_returns_assigned_row($store).await;
        println!("  test_insert_returns_assigned_row: PASSED");

        test_insert_assigns_distinct_ids($store).await;
        println!("  test_insert_assigns_distinct_ids: PASSED");

        test_insert_assigns_created_at($store).await;
        println!("  test_insert_assigns_created_at: PASSED");

        test_insert_duplicate_like_rejected($store).await;
        println!("  test_insert_duplicate_like_rejected: PASSED");

        // get tests
        test_get_filters_by_every_condition($store).await;
        println!("  test_get_filters_by_every_condition: PASSED");

        test_get_no_match_is_empty($store).await;
        println!("  test_get_no_match_is_empty: PASSED");

        test_get_null_condition($store).await;
        println!("  test_get_null_condition: PASSED");

        // update / delete tests
        test_update_returns_patched_rows($store).await;
        println!("  test_update_returns_patched_rows: PASSED");

        test_delete_returns_removed_rows($store).await;
        println!("  test_delete_returns_removed_rows: PASSED");
    };
}
