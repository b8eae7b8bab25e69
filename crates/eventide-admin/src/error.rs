//! Eventide admin error types.

use eventide_core::error::DomainError;
use eventide_event_store::StoreError;
use thiserror::Error;

/// Startup and setup errors for the admin tool.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Bad command line or environment.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connecting to the database failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A store rejected `initialize` or `validate_configuration`.
    #[error("{store} store: {source}")]
    Setup {
        store: &'static str,
        #[source]
        source: DomainError,
    },
}

impl AdminError {
    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Store(_) => 3,
            Self::Setup { .. } => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_names_the_store() {
        let err = AdminError::Setup {
            store: "snapshot",
            source: DomainError::Configuration("missing table: aggregate_snapshots".into()),
        };

        assert_eq!(
            err.to_string(),
            "snapshot store: configuration error: missing table: aggregate_snapshots"
        );
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_store_config_error_converts() {
        let err: AdminError =
            StoreError::Config("DATABASE_URL environment variable must be set".into()).into();

        assert!(matches!(err, AdminError::Store(_)));
        assert_eq!(err.exit_code(), 3);
    }
}
