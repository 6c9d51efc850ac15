use crate::{
    publisher::EventPublisher,
    server::{
        Result, ServerError, ServerRouter,
        json::{Json, JsonBody},
        proxy::Upstreams,
    },
};
use axum::{
    Router,
    extract::{Request, State},
    response::Response,
};
use axum_extra::routing::{RouterExt, TypedPath};
use linkvote_common::model::{
    Id,
    event::{PostEvent, VoteEvent},
    post::PostMarker,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    Router::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_patch(cast_vote)
}

#[derive(TypedPath)]
#[typed_path("/posts")]
struct PostsPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{post_id}", rejection(ServerError))]
struct PostPath {
    post_id: Id<PostMarker>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct Accepted {
    message: &'static str,
}

/// Served by the content service, query string included.
#[axum::debug_handler(state = crate::server::ServerState)]
async fn list_posts(
    _: PostsPath,
    State(upstreams): State<Arc<Upstreams>>,
    request: Request,
) -> Result<Response> {
    upstreams.content.forward(request).await
}

/// Queues the post for creation. It shows up in listings once the content service has
/// processed it.
#[axum::debug_handler(state = crate::server::ServerState)]
async fn create_post(
    _: PostsPath,
    State(publisher): State<EventPublisher>,
    JsonBody(event): JsonBody<PostEvent>,
) -> Result<Json<Accepted>> {
    let new_post = event.validate()?;
    let creator = new_post.creator.clone();

    publisher.publish(&PostEvent::from(new_post)).await?;

    info!(creator_id = %creator, "Queued post creation");
    Ok(Json(Accepted {
        message: "post creation in progress",
    }))
}

#[axum::debug_handler(state = crate::server::ServerState)]
async fn cast_vote(
    PostPath { post_id }: PostPath,
    State(publisher): State<EventPublisher>,
    JsonBody(event): JsonBody<VoteEvent>,
) -> Result<Json<Accepted>> {
    let vote = event.validate()?;
    if vote.post != post_id {
        return Err(ServerError::PostIdMismatch {
            path: post_id,
            body: vote.post,
        });
    }

    info!(post_id = %vote.post, voter_id = %vote.voter, kind = vote.kind.as_str(), "Queued vote");
    publisher.publish(&VoteEvent::from(vote)).await?;

    Ok(Json(Accepted {
        message: "vote processed",
    }))
}
