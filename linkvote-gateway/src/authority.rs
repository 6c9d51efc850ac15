//! The external service that issues and checks bearer tokens.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("The identity authority rejected the token with status {0}")]
    Rejected(StatusCode),
    #[error("The identity authority could not be reached: {0}")]
    Unreachable(#[from] reqwest::Error),
}

#[async_trait]
pub trait IdentityAuthority: Send + Sync {
    /// Succeeds only if the authority accepts `token` as belonging to a known user.
    async fn verify(&self, token: &str) -> Result<(), AuthError>;
}

/// Asks the auth service's `GET /user-identity` endpoint about each token.
#[derive(Clone, Debug)]
pub struct HttpAuthority {
    client: Client,
    identity_url: String,
}

impl HttpAuthority {
    #[must_use]
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            identity_url: format!("{base_url}/user-identity"),
        }
    }
}

#[async_trait]
impl IdentityAuthority for HttpAuthority {
    async fn verify(&self, token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .get(&self.identity_url)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                debug!("Token accepted");
                Ok(())
            }
            status => Err(AuthError::Rejected(status)),
        }
    }
}
