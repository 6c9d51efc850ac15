//! Process plumbing shared by the gateway and the content service.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `default_directives` applies when `RUST_LOG` is unset or unparsable.
pub fn install_tracing(default_directives: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init(),
    }
}

/// Loads `.env` if there is one. Returns whether a file was found.
pub fn load_dotenv() -> Result<bool, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Cancels `shutdown` on SIGINT or SIGTERM. Returns early if `shutdown` is cancelled elsewhere.
pub async fn cancel_on_signal(shutdown: CancellationToken) {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            debug!(error = %err, "Could not listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        #[cfg(unix)]
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                debug!(error = %err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
        #[cfg(not(unix))]
        std::future::pending::<()>().await;
    };

    tokio::select! {
        () = interrupt => info!(signal = "SIGINT", "Shutting down"),
        () = terminate => info!(signal = "SIGTERM", "Shutting down"),
        () = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}
