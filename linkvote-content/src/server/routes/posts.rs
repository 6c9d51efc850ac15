use crate::server::{Result, ServerRouter, json::Json};
use axum::{
    Router,
    extract::{Query, State},
};
use axum_extra::routing::{RouterExt, TypedPath};
use linkvote_common::{model::post::Post, page::Page};
use linkvote_db::ContentStore;
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    Router::new().typed_get(list_posts)
}

#[derive(TypedPath)]
#[typed_path("/posts")]
struct ListPostsPath;

/// Newest posts first, [`linkvote_common::page::PAGE_SIZE`] at a time. The first `page`
/// parameter picks the page; a missing or unusable one means the first page.
#[axum::debug_handler(state = crate::server::ServerState)]
async fn list_posts(
    _: ListPostsPath,
    Query(params): Query<Vec<(String, String)>>,
    State(store): State<Arc<dyn ContentStore>>,
) -> Result<Json<Vec<Post>>> {
    let page = Page::from_query(
        params
            .iter()
            .find(|(key, _)| key == "page")
            .map(|(_, value)| value.as_str()),
    );

    let posts = store.fetch_posts(page.offset(), page.limit()).await?;

    debug!(page = page.number(), count = posts.len(), "Listed posts");
    Ok(Json(posts))
}
