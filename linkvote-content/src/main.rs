use crate::{
    consumer::{ConsumerSupervisor, Dispatcher},
    server::{Readiness, ServerState},
};
use linkvote_broker::{
    Broker, BrokerConfig, BrokerError, RedisBroker, RetryPolicy, retry::Exhausted,
};
use linkvote_common::service::{self, LogFormat};
use linkvote_db::{ContentStore, DbClient, DbError, MemoryStore};
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;
use tokio::{sync::watch, task::JoinError};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

mod consumer;
mod server;

const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Gave up connecting to the database after {attempts} attempts: {last}")]
    DatabaseUnreachable { attempts: u32, last: DbError },
    #[error("Error consuming from the broker: {0}")]
    Broker(#[from] BrokerError),
    #[error("Consumer task failed: {0}")]
    ConsumerTask(JoinError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    /// A Postgres connection string, or `memory` for a store that lives only as long as the
    /// process.
    database_url: String,
    #[serde(default)]
    log_format: LogFormat,
}

async fn open_store(database_url: &str) -> Result<Arc<dyn ContentStore>, InitError> {
    if database_url == MEMORY_DATABASE {
        warn!("Using the in-memory store, nothing will be persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let client = RetryPolicy::default()
        .run("Connecting to database", || DbClient::connect(database_url))
        .await
        .map_err(|Exhausted { attempts, last_error }| InitError::DatabaseUnreachable {
            attempts,
            last: last_error,
        })?;
    client.migrate().await?;

    info!("Connected to database");
    Ok(Arc::new(client))
}

/// Joins the outcomes of the server and the consumer. When both failed, the server's error is
/// logged and the consumer's returned.
fn settle(
    served: Result<(), InitError>,
    consumed: Result<(), InitError>,
) -> Result<(), InitError> {
    if let (Err(err), Err(_)) = (&served, &consumed) {
        error!(error = %err, "Serving failed");
    }
    consumed?;
    served
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    let dotenv_found = service::load_dotenv()?;
    let env: Env = envy::from_env()?;
    service::install_tracing(
        "linkvote_content=debug,\
        linkvote_db=debug,\
        linkvote_broker=debug,\
        tower_http=debug,axum::rejection=trace,sqlx=warn",
        env.log_format,
    );
    if !dotenv_found {
        debug!("No .env file found");
    }
    let broker_config: BrokerConfig = envy::prefixed("BROKER_").from_env()?;
    debug!(?broker_config, "Read broker configuration");

    let store = open_store(&env.database_url).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(service::cancel_on_signal(shutdown.clone()));

    let (ready_tx, ready_rx) = watch::channel(false);
    let supervisor = ConsumerSupervisor::new(
        broker_config.queue.clone(),
        Dispatcher::new(consumer::handlers::registry(&store)),
        ready_tx,
        shutdown.clone(),
    );
    let consumer = tokio::spawn(supervisor.run(move || {
        let config = broker_config.clone();
        async move {
            RedisBroker::connect_with_retry(&config)
                .await
                .map(|broker| Arc::new(broker) as Arc<dyn Broker>)
        }
    }));

    let state = ServerState {
        store,
        readiness: Readiness(ready_rx),
    };
    let app = server::routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .map_err(InitError::TcpServe);

    shutdown.cancel();
    let consumed = match consumer.await {
        Ok(result) => result.map_err(InitError::from),
        Err(err) => Err(InitError::ConsumerTask(err)),
    };
    settle(served, consumed)?;

    info!("Shut down");
    Ok(())
}
