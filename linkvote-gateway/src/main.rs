use crate::{
    authority::HttpAuthority,
    publisher::EventPublisher,
    server::{
        ServerState,
        proxy::{Upstream, Upstreams},
    },
};
use linkvote_broker::{Broker, BrokerConfig, BrokerError, RedisBroker};
use linkvote_common::service::{self, LogFormat};
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

mod authority;
mod publisher;
mod server;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error building the HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Error setting up the broker: {0}")]
    Broker(#[from] BrokerError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    auth_service_host: String,
    auth_service_port: u16,
    content_service_host: String,
    content_service_port: u16,
    #[serde(default)]
    log_format: LogFormat,
}

fn base_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    let dotenv_found = service::load_dotenv()?;
    let env: Env = envy::from_env()?;
    service::install_tracing(
        "linkvote_gateway=debug,\
        linkvote_broker=debug,\
        tower_http=debug,axum::rejection=trace",
        env.log_format,
    );
    if !dotenv_found {
        debug!("No .env file found");
    }
    let broker_config: BrokerConfig = envy::prefixed("BROKER_").from_env()?;
    debug!(?broker_config, "Read broker configuration");

    let broker = RedisBroker::connect_with_retry(&broker_config).await?;
    broker.declare_queue(&broker_config.queue).await?;

    let client = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()?;
    let auth_url = base_url(&env.auth_service_host, env.auth_service_port);
    let content_url = base_url(&env.content_service_host, env.content_service_port);

    let state = ServerState {
        authority: Arc::new(HttpAuthority::new(client.clone(), &auth_url)),
        publisher: EventPublisher::new(Arc::new(broker), broker_config.queue),
        upstreams: Arc::new(Upstreams {
            auth: Upstream::new(client.clone(), &auth_url),
            content: Upstream::new(client, &content_url),
        }),
    };
    let app = server::app(state).layer(TraceLayer::new_for_http());

    let shutdown = CancellationToken::new();
    tokio::spawn(service::cancel_on_signal(shutdown.clone()));

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, %auth_url, %content_url, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    info!("Shut down");
    Ok(())
}
