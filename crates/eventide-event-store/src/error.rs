//! Error types for the storage adapters.
//!
//! Adapter failures are converted into [`DomainError`] at the trait boundary
//! so callers only ever see the core taxonomy.

use eventide_core::error::DomainError;

use crate::schema::STREAM_VERSION_CONSTRAINT;

/// SQLSTATE for `unique_violation`.
pub(crate) const UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur in the storage adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// An expected table is missing.
    #[error("missing table: {0}")]
    MissingTable(String),
}

impl StoreError {
    /// Returns whether this is a unique-constraint violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Postgres(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some(UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }

    /// Returns whether this is a collision on a stream version, as opposed
    /// to any other unique key such as a reused event id.
    #[must_use]
    pub fn is_stream_version_violation(&self) -> bool {
        match self {
            Self::Postgres(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some(UNIQUE_VIOLATION)
                    && db.constraint() == Some(STREAM_VERSION_CONSTRAINT)
            }
            _ => false,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Postgres(
                e @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)),
            ) => Self::Serialization(e.to_string()),
            ref e if e.is_unique_violation() => Self::Validation(e.to_string()),
            StoreError::Postgres(e @ sqlx::Error::Configuration(_)) => {
                Self::Configuration(e.to_string())
            }
            StoreError::Postgres(e) => Self::StorageUnavailable(e.to_string()),
            StoreError::Config(msg) => Self::Configuration(msg),
            e @ StoreError::MissingTable(_) => Self::Configuration(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_maps_to_storage_unavailable() {
        let err: DomainError = StoreError::Postgres(sqlx::Error::PoolTimedOut).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_config_maps_to_configuration() {
        let err: DomainError = StoreError::Config("DATABASE_URL must be set".into()).into();
        assert!(matches!(err, DomainError::Configuration(msg) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn test_missing_table_maps_to_configuration() {
        let err: DomainError = StoreError::MissingTable("domain_events".into()).into();
        assert!(matches!(err, DomainError::Configuration(msg) if msg.contains("domain_events")));
    }

    #[test]
    fn test_non_database_error_is_not_unique_violation() {
        assert!(!StoreError::Postgres(sqlx::Error::RowNotFound).is_unique_violation());
    }

    #[test]
    fn test_non_database_error_is_not_stream_version_violation() {
        let err = StoreError::Postgres(sqlx::Error::RowNotFound);

        assert!(!err.is_stream_version_violation());
    }
}
