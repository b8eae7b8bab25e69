//! Store configuration read from the environment.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::StoreError;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Connection and setup settings for the PostgreSQL stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Pool size.
    pub max_connections: u32,
    /// Aggregate types passed to `initialize`.
    pub aggregate_types: Vec<String>,
}

impl StoreConfig {
    /// Reads `DATABASE_URL`, `EVENTIDE_MAX_CONNECTIONS` and
    /// `EVENTIDE_AGGREGATE_TYPES` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` if a value is missing or malformed.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` if a value is missing or malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StoreError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                StoreError::Config("DATABASE_URL environment variable must be set".into())
            })?;

        let max_connections = match lookup("EVENTIDE_MAX_CONNECTIONS") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| {
                StoreError::Config(format!("EVENTIDE_MAX_CONNECTIONS must be a valid u32: {e}"))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err(StoreError::Config(
                "EVENTIDE_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }

        let aggregate_types = lookup("EVENTIDE_AGGREGATE_TYPES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            max_connections,
            aggregate_types,
        })
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Postgres` if the database is unreachable.
    pub async fn connect(&self) -> Result<PgPool, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await?;
        Ok(pool)
    }
}
