use linkvote_common::model::post::Post;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, sqlx::FromRow)]
pub(crate) struct PostRecord {
    pub post_uuid: String,
    pub creator_uuid: String,
    pub vote_count: i64,
    pub title: String,
    pub url: String,
    pub created_at: OffsetDateTime,
}

impl From<PostRecord> for Post {
    fn from(value: PostRecord) -> Self {
        Self {
            id: value.post_uuid.into(),
            creator: value.creator_uuid.into(),
            vote_count: value.vote_count,
            title: value.title,
            url: value.url,
            created_at: value.created_at,
        }
    }
}
