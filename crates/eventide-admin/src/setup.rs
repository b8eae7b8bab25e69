//! Store setup and configuration checks.

use eventide_core::snapshot::SnapshotStore;
use eventide_core::store::EventStore;
use tracing::info;

use crate::error::AdminError;

/// What the admin tool was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Create missing tables, then check them.
    Init,
    /// Only check; never writes.
    Check,
}

impl Mode {
    /// Parses the first command-line argument. No argument means `Init`.
    ///
    /// # Errors
    ///
    /// `AdminError::Config` for anything other than `init` or `check`.
    pub fn parse(arg: Option<&str>) -> Result<Self, AdminError> {
        match arg {
            None | Some("init") => Ok(Self::Init),
            Some("check") => Ok(Self::Check),
            Some(other) => Err(AdminError::Config(format!(
                "unknown command {other:?}; expected \"init\" or \"check\""
            ))),
        }
    }
}

/// Runs `mode` against both stores, event store first.
///
/// # Errors
///
/// `AdminError::Setup` naming the first store that failed.
pub async fn prepare(
    mode: Mode,
    events: &dyn EventStore,
    snapshots: &dyn SnapshotStore,
    aggregate_types: &[&str],
) -> Result<(), AdminError> {
    if mode == Mode::Init {
        events
            .initialize(aggregate_types)
            .await
            .map_err(|source| AdminError::Setup { store: "event", source })?;
        snapshots
            .initialize(aggregate_types)
            .await
            .map_err(|source| AdminError::Setup { store: "snapshot", source })?;
    }

    events
        .validate_configuration()
        .await
        .map_err(|source| AdminError::Setup { store: "event", source })?;
    snapshots
        .validate_configuration()
        .await
        .map_err(|source| AdminError::Setup { store: "snapshot", source })?;

    info!(?mode, ?aggregate_types, "stores ready");
    Ok(())
}
