use crate::client::{ContentStore, DbError, Result};
use async_trait::async_trait;
use linkvote_common::model::{
    Id,
    post::{Post, PostMarker},
};
use parking_lot::Mutex;
use std::{cmp::Reverse, collections::HashMap};

/// A [`ContentStore`] that keeps everything in process memory and forgets it on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    posts: Mutex<HashMap<Id<PostMarker>, Post>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_post(&self, post: &Post) -> Result<()> {
        let mut posts = self.posts.lock();
        if posts.contains_key(&post.id) {
            return Err(DbError::Conflict(post.id.clone()));
        }

        posts.insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn fetch_post(&self, id: &Id<PostMarker>) -> Result<Option<Post>> {
        Ok(self.posts.lock().get(id).cloned())
    }

    async fn delete_post(&self, id: &Id<PostMarker>) -> Result<()> {
        self.posts.lock().remove(id);
        Ok(())
    }

    async fn update_vote_count(&self, id: &Id<PostMarker>, delta: i64) -> Result<()> {
        if let Some(post) = self.posts.lock().get_mut(id) {
            post.vote_count = post
                .vote_count
                .checked_add(delta)
                .ok_or_else(|| DbError::VoteCountOverflow(id.clone()))?;
        }
        Ok(())
    }

    async fn fetch_posts(&self, offset: u64, limit: u64) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self.posts.lock().values().cloned().collect();
        posts.sort_by_key(|post| Reverse((post.created_at, post.id.clone())));

        Ok(posts
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }
}
