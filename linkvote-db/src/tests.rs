//! Behaviour every [`ContentStore`] implementation has to share.

use crate::client::{ContentStore, DbError};
use linkvote_common::{
    model::{Id, post::Post},
    page::{PAGE_SIZE, Page},
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime, macros::datetime};

const BASE_TIME: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

fn post(title: &str, created_at: OffsetDateTime) -> Post {
    Post {
        id: Id::generate(),
        creator: Id::new("creator"),
        vote_count: 0,
        title: title.to_owned(),
        url: format!("https://example.com/{title}"),
        created_at,
    }
}

/// Expects an empty store.
pub(crate) async fn conformance(store: Arc<dyn ContentStore>) {
    pagination(&*store).await;
    insert_and_fetch(&*store).await;
    duplicate_insert(&*store).await;
    delete_is_idempotent(&*store).await;
    vote_deltas(&*store).await;
    vote_count_overflow(&*store).await;
    concurrent_vote_deltas(store).await;
}

async fn pagination(store: &dyn ContentStore) {
    assert!(store.fetch_posts(0, PAGE_SIZE).await.unwrap().is_empty());

    // Inserted oldest first, so index 24 is the newest.
    let mut posts = Vec::new();
    for i in 0..25 {
        let post = post(&format!("post-{i}"), BASE_TIME + Duration::minutes(i));
        store.insert_post(&post).await.unwrap();
        posts.push(post);
    }
    posts.reverse();

    let fetch = async |page: u64| {
        let page = Page::new(page);
        store.fetch_posts(page.offset(), page.limit()).await.unwrap()
    };

    assert_eq!(fetch(1).await, posts[..10]);
    assert_eq!(fetch(2).await, posts[10..20]);
    assert_eq!(fetch(3).await, posts[20..]);
    assert!(fetch(4).await.is_empty());

    for post in posts {
        store.delete_post(&post.id).await.unwrap();
    }
}

async fn insert_and_fetch(store: &dyn ContentStore) {
    let post = post("fetched", BASE_TIME);
    assert_eq!(store.fetch_post(&post.id).await.unwrap(), None);

    store.insert_post(&post).await.unwrap();
    assert_eq!(store.fetch_post(&post.id).await.unwrap(), Some(post.clone()));

    store.delete_post(&post.id).await.unwrap();
}

async fn duplicate_insert(store: &dyn ContentStore) {
    let original = post("original", BASE_TIME);
    store.insert_post(&original).await.unwrap();

    let duplicate = Post {
        title: "duplicate".to_owned(),
        ..original.clone()
    };
    let result = store.insert_post(&duplicate).await;
    assert!(matches!(result, Err(DbError::Conflict(id)) if id == original.id));
    assert_eq!(
        store.fetch_post(&original.id).await.unwrap(),
        Some(original.clone())
    );

    store.delete_post(&original.id).await.unwrap();
}

async fn delete_is_idempotent(store: &dyn ContentStore) {
    let post = post("deleted", BASE_TIME);
    store.insert_post(&post).await.unwrap();

    store.delete_post(&post.id).await.unwrap();
    store.delete_post(&post.id).await.unwrap();
    assert_eq!(store.fetch_post(&post.id).await.unwrap(), None);

    store.delete_post(&Id::new("never-existed")).await.unwrap();
}

async fn vote_deltas(store: &dyn ContentStore) {
    let post = post("voted", BASE_TIME);
    store.insert_post(&post).await.unwrap();

    store.update_vote_count(&post.id, 1).await.unwrap();
    store.update_vote_count(&post.id, -1).await.unwrap();
    store.update_vote_count(&post.id, -1).await.unwrap();
    let fetched = store.fetch_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.vote_count, -1);

    let unknown = Id::new("no-such-post");
    store.update_vote_count(&unknown, 1).await.unwrap();
    assert_eq!(store.fetch_post(&unknown).await.unwrap(), None);

    store.delete_post(&post.id).await.unwrap();
}

async fn vote_count_overflow(store: &dyn ContentStore) {
    let post = Post {
        vote_count: i64::MAX,
        ..post("maxed", BASE_TIME)
    };
    store.insert_post(&post).await.unwrap();

    assert!(store.update_vote_count(&post.id, 1).await.is_err());
    let fetched = store.fetch_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.vote_count, i64::MAX);

    store.update_vote_count(&post.id, -1).await.unwrap();
    let fetched = store.fetch_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.vote_count, i64::MAX - 1);

    store.delete_post(&post.id).await.unwrap();
}

async fn concurrent_vote_deltas(store: Arc<dyn ContentStore>) {
    let post = post("contested", BASE_TIME);
    store.insert_post(&post).await.unwrap();

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let store = Arc::clone(&store);
            let id = post.id.clone();
            let delta = if i % 4 == 0 { -1 } else { 1 };
            tokio::spawn(async move { store.update_vote_count(&id, delta).await })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // 75 upvotes, 25 downvotes
    let fetched = store.fetch_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.vote_count, 50);

    store.delete_post(&post.id).await.unwrap();
}
