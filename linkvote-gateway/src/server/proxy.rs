//! Plain HTTP pass-through to the services behind the gateway.

use crate::server::{Result, ServerError};
use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{
        HeaderMap, HeaderName,
        header::{CONNECTION, HOST},
        uri::PathAndQuery,
    },
    response::Response,
};
use reqwest::Client;
use tracing::debug;

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Meaningful for a single connection only, so never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone, Debug)]
pub struct Upstreams {
    /// Registration and token issuance.
    pub auth: Upstream,
    pub content: Upstream,
}

#[derive(Clone, Debug)]
pub struct Upstream {
    client: Client,
    base_url: String,
}

impl Upstream {
    #[must_use]
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Replays `request` against the same path and query upstream and relays the answer.
    pub async fn forward(&self, request: Request) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or("/", PathAndQuery::as_str);
        let url = format!("{}{path_and_query}", self.base_url);

        let body = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(ServerError::RequestBody)?;
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(HOST);

        debug!(method = %parts.method, %url, "Forwarding request");

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        let body = upstream.bytes().await?;

        debug!(%url, %status, "Relaying upstream response");

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Removes the standard hop-by-hop headers and any header the `Connection` header names.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
