use crate::{
    authority::{AuthError, IdentityAuthority},
    publisher::{EventPublisher, PublishError},
};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use linkvote_common::model::{Id, ValidationError, post::PostMarker};
use proxy::Upstreams;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

pub mod auth;
mod json;
pub mod proxy;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub authority: Arc<dyn IdentityAuthority>,
    pub publisher: EventPublisher,
    pub upstreams: Arc<Upstreams>,
}

/// All gateway routes with `state` applied.
pub fn app(state: ServerState) -> Router {
    routes::routes(&state).fallback(fallback).with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("Token was not accepted: {0}")]
    InvalidToken(#[from] AuthError),
    #[error("Invalid event: {0}")]
    Validation(#[from] ValidationError),
    #[error("Vote for post {body} sent to the path of post {path}")]
    PostIdMismatch {
        path: Id<PostMarker>,
        body: Id<PostMarker>,
    },
    #[error("Publishing event failed: {0}")]
    Publish(#[from] PublishError),
    #[error("Request body could not be read: {0}")]
    RequestBody(axum::Error),
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_) | ServerError::PathRejection(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(_) | ServerError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::JsonRejection(_)
            | ServerError::Validation(_)
            | ServerError::PostIdMismatch { .. }
            | ServerError::RequestBody(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_) | ServerError::Publish(_) | ServerError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
            error: status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_owned(),
        };
        (status, Json(error_response)).into_response()
    }
}
