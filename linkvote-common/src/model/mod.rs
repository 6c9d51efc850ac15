pub mod event;
pub mod post;
pub mod user;

use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use uuid::Uuid;

/// Rejection of a wire event that is structurally valid JSON but not a usable command.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ValidationError {
    #[error("Field `{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("Unknown vote kind: {0:?}")]
    UnknownVoteKind(String),
    #[error("Unknown post kind: {0:?}")]
    UnknownPostKind(String),
}

/// An opaque identifier, tagged with the kind of entity it refers to.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<Marker>(String, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into(), PhantomData)
    }

    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Wraps `id`, rejecting the empty string.
    pub fn non_empty(id: String, field: &'static str) -> Result<Self, ValidationError> {
        if id.is_empty() {
            Err(ValidationError::EmptyField(field))
        } else {
            Ok(Self::new(id))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<String> for Id<Marker> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for String {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}
