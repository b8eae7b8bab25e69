//! Eventide admin entry point.
//!
//! `eventide-admin [init|check]` connects to `DATABASE_URL`, creates the
//! event and snapshot tables (`init`, the default) and checks that they are
//! usable.

use std::process::ExitCode;

use eventide_admin::error::AdminError;
use eventide_admin::setup::{self, Mode};
use eventide_event_store::{PgEventStore, PgSnapshotStore, StoreConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "eventide-admin failed");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), AdminError> {
    let arg = std::env::args().nth(1);
    let mode = Mode::parse(arg.as_deref())?;
    let config = StoreConfig::from_env()?;

    tracing::info!(
        ?mode,
        max_connections = config.max_connections,
        aggregate_types = ?config.aggregate_types,
        "Starting eventide-admin"
    );

    let pool = config.connect().await?;
    let events = PgEventStore::new(pool.clone());
    let snapshots = PgSnapshotStore::new(pool);
    let aggregate_types: Vec<&str> = config.aggregate_types.iter().map(String::as_str).collect();

    setup::prepare(mode, &events, &snapshots, &aggregate_types).await
}
