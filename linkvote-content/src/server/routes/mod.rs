use crate::server::ServerRouter;
use axum::Router;

mod health;
mod posts;

pub fn routes() -> ServerRouter {
    Router::new().merge(posts::routes()).merge(health::routes())
}
