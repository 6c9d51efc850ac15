use crate::model::{Id, user::UserMarker};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    #[serde(rename = "post_uuid")]
    pub id: Id<PostMarker>,
    #[serde(rename = "creator_uuid")]
    pub creator: Id<UserMarker>,
    pub vote_count: i64,
    pub title: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub enum PostKind {
    #[default]
    Link,
}

impl PostKind {
    pub const LINK: &'static str = "link";

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PostKind::Link => Self::LINK,
        }
    }
}

/// A validated request to create a post. Id, vote count and timestamp are assigned on insert.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewPost {
    pub creator: Id<UserMarker>,
    pub title: String,
    pub url: String,
    pub kind: PostKind,
}

impl NewPost {
    #[must_use]
    pub fn into_post(self, id: Id<PostMarker>, created_at: OffsetDateTime) -> Post {
        Post {
            id,
            creator: self.creator,
            vote_count: 0,
            title: self.title,
            url: self.url,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn post_wire_format() {
        let post = Post {
            id: Id::new("p1"),
            creator: Id::new("u1"),
            vote_count: -3,
            title: "t".to_owned(),
            url: "x".to_owned(),
            created_at: datetime!(2025-03-01 12:30:00 UTC),
        };

        assert_eq!(
            serde_json::to_value(&post).unwrap(),
            json!({
                "post_uuid": "p1",
                "creator_uuid": "u1",
                "vote_count": -3,
                "title": "t",
                "url": "x",
                "created_at": "2025-03-01T12:30:00Z",
            })
        );
    }

    #[test]
    fn new_posts_start_without_votes() {
        let new_post = NewPost {
            creator: Id::new("u1"),
            title: "t".to_owned(),
            url: "x".to_owned(),
            kind: PostKind::Link,
        };
        let created_at = datetime!(2025-03-01 0:00 UTC);

        let post = new_post.into_post(Id::new("p1"), created_at);

        assert_eq!(post.vote_count, 0);
        assert_eq!(post.created_at, created_at);
        assert_eq!(post.creator.get(), "u1");
    }
}
