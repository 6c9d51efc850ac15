//! Commands as they travel over the queue.
//!
//! Every message is a flat JSON object whose `type` field selects how the rest of it is read:
//!
//! ```json
//! {"type": "upvote", "post_uuid": "...", "voter_uuid": "..."}
//! {"type": "link", "creator_uuid": "...", "title": "...", "url": "..."}
//! ```
//!
//! The wire shapes keep every field as a plain string so that a message with a bad value still
//! decodes and can be rejected with a precise [`ValidationError`]. They only decode from JSON
//! objects: missing fields read as empty, fields that are not strings are an error.

use crate::model::{
    Id, ValidationError,
    post::{NewPost, PostKind, PostMarker},
    user::UserMarker,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum EventKind {
    Upvote,
    Downvote,
    Link,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
#[error("Unknown event type: {0:?}")]
pub struct UnknownEventKind(pub String);

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Upvote, EventKind::Downvote, EventKind::Link];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Upvote => VoteKind::Upvote.as_str(),
            EventKind::Downvote => VoteKind::Downvote.as_str(),
            EventKind::Link => PostKind::Link.as_str(),
        }
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_owned()))
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only the discriminator of a queue message.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Envelope {
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn event_kind(&self) -> Result<EventKind, UnknownEventKind> {
        self.kind.parse()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum VoteKind {
    Upvote,
    Downvote,
}

impl VoteKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VoteKind::Upvote => "upvote",
            VoteKind::Downvote => "downvote",
        }
    }

    /// The change this vote applies to a post's vote count.
    #[must_use]
    pub fn magnitude(self) -> i64 {
        match self {
            VoteKind::Upvote => 1,
            VoteKind::Downvote => -1,
        }
    }
}

impl FromStr for VoteKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(VoteKind::Upvote),
            "downvote" => Ok(VoteKind::Downvote),
            other => Err(ValidationError::UnknownVoteKind(other.to_owned())),
        }
    }
}

type Object = serde_json::Map<String, Value>;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
#[error("Field {0:?} is not a string")]
pub struct NotAString(&'static str);

fn take_string(object: &mut Object, field: &'static str) -> Result<Option<String>, NotAString> {
    match object.remove(field) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(NotAString(field)),
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
#[serde(try_from = "Object")]
pub struct VoteEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub post_uuid: String,
    pub voter_uuid: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Vote {
    pub post: Id<PostMarker>,
    pub voter: Id<UserMarker>,
    pub kind: VoteKind,
}

impl TryFrom<Object> for VoteEvent {
    type Error = NotAString;

    fn try_from(mut object: Object) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: take_string(&mut object, "type")?.unwrap_or_default(),
            post_uuid: take_string(&mut object, "post_uuid")?.unwrap_or_default(),
            voter_uuid: take_string(&mut object, "voter_uuid")?.unwrap_or_default(),
        })
    }
}

impl VoteEvent {
    pub fn validate(self) -> Result<Vote, ValidationError> {
        Ok(Vote {
            post: Id::non_empty(self.post_uuid, "post_uuid")?,
            voter: Id::non_empty(self.voter_uuid, "voter_uuid")?,
            kind: self.kind.parse()?,
        })
    }
}

impl From<Vote> for VoteEvent {
    fn from(value: Vote) -> Self {
        Self {
            kind: value.kind.as_str().to_owned(),
            post_uuid: value.post.into_inner(),
            voter_uuid: value.voter.into_inner(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(try_from = "Object")]
pub struct PostEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub creator_uuid: String,
    pub title: String,
    pub url: String,
}

impl Default for PostEvent {
    fn default() -> Self {
        Self {
            kind: PostKind::LINK.to_owned(),
            creator_uuid: String::new(),
            title: String::new(),
            url: String::new(),
        }
    }
}

impl TryFrom<Object> for PostEvent {
    type Error = NotAString;

    fn try_from(mut object: Object) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: take_string(&mut object, "type")?
                .unwrap_or_else(|| PostKind::LINK.to_owned()),
            creator_uuid: take_string(&mut object, "creator_uuid")?.unwrap_or_default(),
            title: take_string(&mut object, "title")?.unwrap_or_default(),
            url: take_string(&mut object, "url")?.unwrap_or_default(),
        })
    }
}

impl PostEvent {
    pub fn validate(self) -> Result<NewPost, ValidationError> {
        if self.kind != PostKind::LINK {
            return Err(ValidationError::UnknownPostKind(self.kind));
        }

        Ok(NewPost {
            creator: Id::non_empty(self.creator_uuid, "creator_uuid")?,
            title: non_empty(self.title, "title")?,
            url: non_empty(self.url, "url")?,
            kind: PostKind::Link,
        })
    }
}

impl From<NewPost> for PostEvent {
    fn from(value: NewPost) -> Self {
        Self {
            kind: value.kind.as_str().to_owned(),
            creator_uuid: value.creator.into_inner(),
            title: value.title,
            url: value.url,
        }
    }
}

fn non_empty(value: String, field: &'static str) -> Result<String, ValidationError> {
    if value.is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vote_event(kind: &str, post: &str, voter: &str) -> VoteEvent {
        VoteEvent {
            kind: kind.to_owned(),
            post_uuid: post.to_owned(),
            voter_uuid: voter.to_owned(),
        }
    }

    #[test]
    fn envelope_reads_only_the_discriminator() {
        let envelope =
            Envelope::decode(br#"{"type":"downvote","post_uuid":1,"extra":[true]}"#).unwrap();
        assert_eq!(envelope.event_kind(), Ok(EventKind::Downvote));
    }

    #[test]
    fn envelope_without_type_does_not_decode() {
        assert!(Envelope::decode(br#"{"post_uuid":"p"}"#).is_err());
        assert!(Envelope::decode(b"not json").is_err());
    }

    #[test]
    fn unknown_discriminator_is_reported() {
        let envelope = Envelope::decode(br#"{"type":"repost"}"#).unwrap();
        assert_eq!(
            envelope.event_kind(),
            Err(UnknownEventKind("repost".to_owned()))
        );
    }

    #[test]
    fn event_kinds_round_trip_through_their_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
    }

    #[test]
    fn valid_votes() {
        let vote = vote_event("upvote", "p1", "u1").validate().unwrap();
        assert_eq!(vote.kind, VoteKind::Upvote);
        assert_eq!(vote.kind.magnitude(), 1);
        assert_eq!(vote.post.get(), "p1");
        assert_eq!(vote.voter.get(), "u1");

        let vote = vote_event("downvote", "p1", "u1").validate().unwrap();
        assert_eq!(vote.kind.magnitude(), -1);
    }

    #[test]
    fn malformed_votes() {
        assert_eq!(
            vote_event("upvote", "", "u1").validate(),
            Err(ValidationError::EmptyField("post_uuid"))
        );
        assert_eq!(
            vote_event("upvote", "p1", "").validate(),
            Err(ValidationError::EmptyField("voter_uuid"))
        );
        assert_eq!(
            vote_event("sidevote", "p1", "u1").validate(),
            Err(ValidationError::UnknownVoteKind("sidevote".to_owned()))
        );
    }

    #[test]
    fn missing_vote_fields_decode_as_empty() {
        let event: VoteEvent = serde_json::from_value(json!({"type": "upvote"})).unwrap();
        assert_eq!(
            event.validate(),
            Err(ValidationError::EmptyField("post_uuid"))
        );
    }

    #[test]
    fn post_event_defaults_to_link() {
        let event: PostEvent =
            serde_json::from_value(json!({"creator_uuid": "u1", "title": "t", "url": "x"}))
                .unwrap();
        assert_eq!(event.kind, "link");

        let new_post = event.validate().unwrap();
        assert_eq!(new_post.kind, PostKind::Link);
        assert_eq!(new_post.title, "t");
    }

    #[test]
    fn events_only_decode_from_objects() {
        assert!(serde_json::from_str::<PostEvent>(r#"["link","u1","t","x"]"#).is_err());
        assert!(serde_json::from_str::<VoteEvent>(r#"["upvote","p1","u1"]"#).is_err());
        assert!(serde_json::from_str::<VoteEvent>(r#""upvote""#).is_err());
    }

    #[test]
    fn non_string_fields_do_not_decode() {
        let err = serde_json::from_value::<PostEvent>(
            json!({"creator_uuid": 1, "title": "t", "url": "x"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("creator_uuid"), "{err}");

        assert!(
            serde_json::from_value::<VoteEvent>(json!({"type": null, "post_uuid": "p1"})).is_err()
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let event: VoteEvent = serde_json::from_value(
            json!({"type": "upvote", "post_uuid": "p1", "voter_uuid": "u1", "weight": 3}),
        )
        .unwrap();
        assert_eq!(event.validate().unwrap().kind, VoteKind::Upvote);
    }

    #[test]
    fn malformed_posts() {
        let valid = PostEvent {
            creator_uuid: "u1".to_owned(),
            title: "t".to_owned(),
            url: "x".to_owned(),
            ..PostEvent::default()
        };

        for (event, field) in [
            (
                PostEvent {
                    creator_uuid: String::new(),
                    ..valid.clone()
                },
                "creator_uuid",
            ),
            (
                PostEvent {
                    title: String::new(),
                    ..valid.clone()
                },
                "title",
            ),
            (
                PostEvent {
                    url: String::new(),
                    ..valid.clone()
                },
                "url",
            ),
        ] {
            assert_eq!(event.validate(), Err(ValidationError::EmptyField(field)));
        }

        let text_post = PostEvent {
            kind: "text".to_owned(),
            ..valid
        };
        assert_eq!(
            text_post.validate(),
            Err(ValidationError::UnknownPostKind("text".to_owned()))
        );
    }

    #[test]
    fn validated_events_serialize_with_their_discriminator() {
        let vote = vote_event("downvote", "p1", "u1").validate().unwrap();
        assert_eq!(
            serde_json::to_value(VoteEvent::from(vote)).unwrap(),
            json!({"type": "downvote", "post_uuid": "p1", "voter_uuid": "u1"})
        );

        let new_post = PostEvent {
            creator_uuid: "u1".to_owned(),
            title: "t".to_owned(),
            url: "x".to_owned(),
            ..PostEvent::default()
        }
        .validate()
        .unwrap();
        assert_eq!(
            serde_json::to_value(PostEvent::from(new_post)).unwrap(),
            json!({"type": "link", "creator_uuid": "u1", "title": "t", "url": "x"})
        );
    }
}
