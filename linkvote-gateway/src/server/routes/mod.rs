use crate::server::{ServerRouter, ServerState, auth::Authenticated};
use axum::{Router, middleware};

mod auth;
mod posts;

/// `/register` and `/token` are open. Everything else needs an [`Authenticated`] request.
pub fn routes(state: &ServerState) -> ServerRouter {
    let protected = Router::new()
        .merge(posts::routes())
        .route_layer(middleware::from_extractor_with_state::<
            Authenticated,
            ServerState,
        >(state.clone()));

    Router::new().merge(auth::routes()).merge(protected)
}
