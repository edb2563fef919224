//! Error types for each stage of a run: provisioning, migration, persistence.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// The ephemeral database could not be started or never became reachable.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to start database instance: {0}")]
    Start(String),
    #[error("database environment has not been started")]
    NotStarted,
    #[error("database not ready after {waited:?}: {source}")]
    NotReady {
        waited: Duration,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to open connection: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("failed to stop database instance: {0}")]
    Stop(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A schema script could not be discovered or applied. The database must be
/// discarded after any of these.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to read migrations directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read migration {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed migration {id}: {reason}")]
    Malformed { id: String, reason: String },
    #[error("migration {0} is recorded as applied but has no script on disk")]
    UnknownApplied(String),
    #[error("migration ledger error: {0}")]
    Ledger(#[source] sqlx::Error),
    #[error("migration {id} failed: {source}")]
    Apply {
        id: String,
        #[source]
        source: sqlx::Error,
    },
}

/// An entity operation was rejected by the backing store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("store returned an invalid identifier {value:?}: {source}")]
    InvalidId {
        value: String,
        #[source]
        source: uuid::Error,
    },
    #[error("store returned an invalid price {value:?}: {source}")]
    InvalidPrice {
        value: String,
        #[source]
        source: rust_decimal::Error,
    },
}

/// Top-level error that names the stage a run failed in.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration failed: {0}")]
    Config(#[from] ConfigError),
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
    #[error("migration failed: {0}")]
    Migration(#[from] MigrationError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl Error {
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration",
            Error::Provision(_) => "provisioning",
            Error::Migration(_) => "migration",
            Error::Persistence(_) => "persistence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let err = Error::from(ProvisionError::NotStarted);
        assert_eq!(err.stage(), "provisioning");
        assert_eq!(
            err.to_string(),
            "provisioning failed: database environment has not been started"
        );

        let err = Error::from(MigrationError::UnknownApplied("002_gone.sql".to_string()));
        assert_eq!(err.stage(), "migration");
        assert!(err.to_string().contains("002_gone.sql"));

        let err = Error::from(PersistenceError::Database(sqlx::Error::PoolClosed));
        assert_eq!(err.stage(), "persistence");
    }

    #[test]
    fn test_persistence_error_surfaces_store_message_verbatim() {
        let err = PersistenceError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.to_string(), sqlx::Error::PoolClosed.to_string());
    }
}
