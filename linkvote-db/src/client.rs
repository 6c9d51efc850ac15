use crate::record::PostRecord;
use async_trait::async_trait;
use linkvote_common::model::{
    Id,
    post::{Post, PostMarker},
};
use sqlx::{PgPool, postgres::PgPoolOptions, query, query_as};
use thiserror::Error;
use tracing::debug;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Post with id {0} already exists")]
    Conflict(Id<PostMarker>),
    #[error("Vote count of post {0} is out of range")]
    VoteCountOverflow(Id<PostMarker>),
    #[error("Running database migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Durable storage of posts.
///
/// Absent posts are never an error: lookups return `None`, and deletes and vote updates on
/// unknown ids succeed without changing anything.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fails with [`DbError::Conflict`] if a post with the same id exists.
    async fn insert_post(&self, post: &Post) -> Result<()>;

    async fn fetch_post(&self, id: &Id<PostMarker>) -> Result<Option<Post>>;

    async fn delete_post(&self, id: &Id<PostMarker>) -> Result<()>;

    /// Adds `delta` to the vote count atomically with respect to other updates of the same post.
    async fn update_vote_count(&self, id: &Id<PostMarker>, delta: i64) -> Result<()>;

    /// Posts ordered newest first.
    async fn fetch_posts(&self, offset: u64, limit: u64) -> Result<Vec<Post>>;
}

/// Postgres `numeric_value_out_of_range`.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for DbClient {
    async fn insert_post(&self, post: &Post) -> Result<()> {
        query(
            "
            INSERT INTO posts (post_uuid, creator_uuid, vote_count, title, url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(post.id.get())
        .bind(post.creator.get())
        .bind(post.vote_count)
        .bind(&post.title)
        .bind(&post.url)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(post.id.clone())
            }
            err => DbError::Sqlx(err),
        })?;

        debug!(post_id = %post.id, "Inserted post");
        Ok(())
    }

    async fn fetch_post(&self, id: &Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            SELECT post_uuid, creator_uuid, vote_count, title, url, created_at
            FROM posts
            WHERE post_uuid = $1
            ",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Post::from))
    }

    async fn delete_post(&self, id: &Id<PostMarker>) -> Result<()> {
        query("DELETE FROM posts WHERE post_uuid = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_vote_count(&self, id: &Id<PostMarker>, delta: i64) -> Result<()> {
        let result = query("UPDATE posts SET vote_count = vote_count + $1 WHERE post_uuid = $2")
            .bind(delta)
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(ref db_err)
                    if db_err.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE) =>
                {
                    DbError::VoteCountOverflow(id.clone())
                }
                err => DbError::Sqlx(err),
            })?;

        if result.rows_affected() == 0 {
            debug!(post_id = %id, "Vote for unknown post ignored");
        }
        Ok(())
    }

    async fn fetch_posts(&self, offset: u64, limit: u64) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(
            "
            SELECT post_uuid, creator_uuid, vote_count, title, url, created_at
            FROM posts
            ORDER BY created_at DESC, post_uuid DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Post::from).collect())
    }
}
