use crate::server::{Result, ServerRouter, proxy::Upstreams};
use axum::{
    Router,
    extract::{Request, State},
    response::Response,
};
use axum_extra::routing::{RouterExt, TypedPath};
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    Router::new().typed_post(register).typed_post(token)
}

#[derive(TypedPath)]
#[typed_path("/register")]
struct RegisterPath;

#[derive(TypedPath)]
#[typed_path("/token")]
struct TokenPath;

#[axum::debug_handler(state = crate::server::ServerState)]
async fn register(
    _: RegisterPath,
    State(upstreams): State<Arc<Upstreams>>,
    request: Request,
) -> Result<Response> {
    upstreams.auth.forward(request).await
}

#[axum::debug_handler(state = crate::server::ServerState)]
async fn token(
    _: TokenPath,
    State(upstreams): State<Arc<Upstreams>>,
    request: Request,
) -> Result<Response> {
    upstreams.auth.forward(request).await
}
