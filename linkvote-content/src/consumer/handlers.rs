use crate::consumer::{EventHandler, HandlerRegistry};
use async_trait::async_trait;
use linkvote_common::model::{
    Id, ValidationError,
    event::{EventKind, PostEvent, VoteEvent},
};
use linkvote_db::{ContentStore, DbError};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Event could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid event: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] DbError),
}

impl HandlerError {
    /// Whether handling the same message again could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::Decode(_)
            | HandlerError::Validation(_)
            | HandlerError::Store(DbError::VoteCountOverflow(_)) => false,
            HandlerError::Store(_) => true,
        }
    }
}

/// Handlers for every event kind, all writing to `store`.
pub fn registry(store: &Arc<dyn ContentStore>) -> HandlerRegistry {
    let votes = Arc::new(VoteHandler::new(Arc::clone(store)));
    let posts = Arc::new(PostHandler::new(Arc::clone(store)));

    HandlerRegistry::new()
        .with(EventKind::Upvote, Arc::clone(&votes))
        .with(EventKind::Downvote, votes)
        .with(EventKind::Link, posts)
}

/// Applies votes to a post's vote count.
///
/// Who voted is not recorded, so the same voter can move a count any number of times. Votes for
/// posts that do not exist change nothing and are not an error.
pub struct VoteHandler {
    store: Arc<dyn ContentStore>,
}

impl VoteHandler {
    #[must_use]
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for VoteHandler {
    type Event = VoteEvent;

    async fn handle(&self, event: VoteEvent) -> Result<(), HandlerError> {
        let vote = event.validate()?;

        self.store
            .update_vote_count(&vote.post, vote.kind.magnitude())
            .await?;

        info!(post_id = %vote.post, voter_id = %vote.voter, kind = vote.kind.as_str(), "Applied vote");
        Ok(())
    }
}

pub struct PostHandler {
    store: Arc<dyn ContentStore>,
}

impl PostHandler {
    #[must_use]
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for PostHandler {
    type Event = PostEvent;

    async fn handle(&self, event: PostEvent) -> Result<(), HandlerError> {
        let new_post = event.validate()?;
        let post = new_post.into_post(Id::generate(), OffsetDateTime::now_utc());

        self.store.insert_post(&post).await?;

        info!(post_id = %post.id, creator_id = %post.creator, "Created post");
        Ok(())
    }
}
