use crate::{authority::IdentityAuthority, server::ServerError};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use std::sync::Arc;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// Proof that the request carried a bearer token the identity authority accepted.
///
/// Requests without a bearer token are turned away before the authority is asked.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Authenticated;

impl<S> FromRequestParts<S> for Authenticated
where
    Arc<dyn IdentityAuthority>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            AuthorizationHeader::from_request_parts(parts, state)
                .await
                .map_err(ServerError::InvalidAuthorizationHeader)?;

        Arc::<dyn IdentityAuthority>::from_ref(state)
            .verify(bearer.token())
            .await?;

        Ok(Self)
    }
}
