//! Disposable databases for isolated test runs.
//!
//! A [`TestEnvironment`] knows how to bring one database instance up and tear
//! it down again. The [`Provisioner`] starts an environment, waits until the
//! database answers queries, and hands back a [`ProvisionedDatabase`] that owns
//! both the environment and the open connection.
//!
//! Teardown happens in [`ProvisionedDatabase::dispose`]. If a run panics before
//! getting there, the environments release their resources on drop: the
//! container is removed and the temp directory deleted.

pub mod container;
pub mod sqlite;

pub use container::PostgresContainer;
pub use sqlite::SqliteEnvironment;

use crate::config::ProvisionConfig;
use crate::db::{Backend, ConnectionInfo, Database};
use crate::error::ProvisionError;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// One disposable database instance.
#[async_trait]
pub trait TestEnvironment: Send + Sync {
    /// Bring the instance up. Calling it again while running is a no-op.
    async fn start(&mut self) -> Result<(), ProvisionError>;

    /// Coordinates of the running instance.
    ///
    /// # Errors
    /// Returns `ProvisionError::NotStarted` before `start` has succeeded.
    fn connection_info(&self) -> Result<ConnectionInfo, ProvisionError>;

    /// Tear the instance down and release everything it holds.
    ///
    /// Must succeed as a no-op when the instance never started or was
    /// already stopped.
    async fn stop(&mut self) -> Result<(), ProvisionError>;
}

/// Creates ready-to-use databases from a [`ProvisionConfig`].
#[derive(Debug, Clone)]
pub struct Provisioner {
    config: ProvisionConfig,
}

impl Provisioner {
    pub fn new(config: ProvisionConfig) -> Self {
        Self { config }
    }

    /// A fresh, unstarted environment for the configured backend.
    pub fn environment(&self) -> Box<dyn TestEnvironment> {
        match self.config.backend {
            Backend::Postgres => Box::new(PostgresContainer::from_config(&self.config)),
            Backend::Sqlite => Box::new(SqliteEnvironment::new()),
        }
    }

    /// Start the configured backend and connect once it is ready.
    pub async fn provision(&self) -> Result<ProvisionedDatabase, ProvisionError> {
        self.provision_with(self.environment()).await
    }

    /// Start `env` and connect once it is ready.
    ///
    /// # Errors
    /// Returns an error if the instance cannot be started, does not accept
    /// queries within the configured readiness timeout, or rejects the
    /// connection outright. The environment is stopped before returning.
    pub async fn provision_with(
        &self,
        mut env: Box<dyn TestEnvironment>,
    ) -> Result<ProvisionedDatabase, ProvisionError> {
        match self.start_and_connect(env.as_mut()).await {
            Ok((db, info)) => {
                info!(%info, "Database provisioned");
                Ok(ProvisionedDatabase { env, db, info })
            }
            Err(err) => {
                if let Err(stop_err) = env.stop().await {
                    warn!(error = %stop_err, "Failed to stop environment after provisioning error");
                }
                Err(err)
            }
        }
    }

    async fn start_and_connect(
        &self,
        env: &mut dyn TestEnvironment,
    ) -> Result<(Database, ConnectionInfo), ProvisionError> {
        env.start().await?;
        let info = env.connection_info()?;
        let db = connect_when_ready(&info, self.config.ready_timeout).await?;
        Ok((db, info))
    }
}

/// Poll `info` until a connection succeeds and answers `SELECT 1`, or until
/// `timeout` has elapsed.
///
/// Each attempt is cut off at the time left before the deadline, so a slow
/// connect cannot stretch the wait past `timeout`.
///
/// # Errors
/// Returns `ProvisionError::NotReady` with the last failure once the bound is
/// exhausted, or `ProvisionError::Connect` immediately for a malformed
/// connection configuration.
pub async fn connect_when_ready(
    info: &ConnectionInfo,
    timeout: Duration,
) -> Result<Database, ProvisionError> {
    let backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(100),
        max_interval: Duration::from_secs(2),
        max_elapsed_time: Some(timeout),
        ..Default::default()
    };

    let deadline = Instant::now() + timeout;

    retry(backoff, move || async move {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, connect_and_ping(info)).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(classify(sqlx::Error::PoolTimedOut)),
        }
    })
    .await
    .map_err(|source| match source {
        sqlx::Error::Configuration(_) => ProvisionError::Connect(source),
        source => ProvisionError::NotReady {
            waited: timeout,
            source,
        },
    })
}

async fn connect_and_ping(info: &ConnectionInfo) -> Result<Database, sqlx::Error> {
    let db = Database::connect(info).await?;
    if let Err(err) = db.ping().await {
        db.close().await;
        return Err(err);
    }
    Ok(db)
}

fn classify(err: sqlx::Error) -> backoff::Error<sqlx::Error> {
    match err {
        sqlx::Error::Configuration(_) => backoff::Error::permanent(err),
        err => {
            debug!(error = %err, "Database not ready yet");
            backoff::Error::transient(err)
        }
    }
}

/// A started environment together with its open connection.
pub struct ProvisionedDatabase {
    env: Box<dyn TestEnvironment>,
    db: Database,
    info: ConnectionInfo,
}

impl ProvisionedDatabase {
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Close the connection and destroy the instance with all its data.
    ///
    /// # Errors
    /// Returns an error if the environment fails to tear down.
    pub async fn dispose(mut self) -> Result<(), ProvisionError> {
        self.db.close().await;
        self.env.stop().await?;
        info!(info = %self.info, "Database disposed");
        Ok(())
    }
}
