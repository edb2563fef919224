//! Connection coordinates and the shared database handle.

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// SQL dialect behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Postgres => "postgres",
            Backend::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            "sqlite" => Ok(Backend::Sqlite),
            other => Err(other.to_string()),
        }
    }
}

/// Postgres `sslmode` connection parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
        }
    }
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            other => Err(other.to_string()),
        }
    }
}

/// Where a provisioned database can be reached.
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionInfo {
    Postgres {
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
        ssl_mode: SslMode,
    },
    Sqlite {
        path: PathBuf,
    },
}

impl ConnectionInfo {
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        ConnectionInfo::Sqlite {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            ConnectionInfo::Postgres { .. } => Backend::Postgres,
            ConnectionInfo::Sqlite { .. } => Backend::Sqlite,
        }
    }

    /// URL understood by sqlx, including credentials.
    pub fn url(&self) -> String {
        match self {
            ConnectionInfo::Postgres {
                host,
                port,
                user,
                password,
                database,
                ssl_mode,
            } => format!(
                "postgres://{}:{}@{}:{}/{}?sslmode={}",
                user,
                password,
                host,
                port,
                database,
                ssl_mode.as_str()
            ),
            ConnectionInfo::Sqlite { path } => format!("sqlite:{}?mode=rwc", path.display()),
        }
    }

    /// Same as [`ConnectionInfo::url`] with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        match self {
            ConnectionInfo::Postgres {
                host,
                port,
                user,
                database,
                ssl_mode,
                ..
            } => format!(
                "postgres://{}:***@{}:{}/{}?sslmode={}",
                user,
                host,
                port,
                database,
                ssl_mode.as_str()
            ),
            ConnectionInfo::Sqlite { .. } => self.url(),
        }
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionInfo")
            .field(&self.redacted_url())
            .finish()
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_url())
    }
}

/// Live connection handle: a pool plus the dialect its SQL must be written in.
///
/// Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    backend: Backend,
}

impl Database {
    pub fn new(pool: AnyPool, backend: Backend) -> Self {
        Database { pool, backend }
    }

    /// Open a pool against `info` without any readiness probing.
    pub async fn connect(info: &ConnectionInfo) -> Result<Self, sqlx::Error> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&info.url())
            .await?;

        Ok(Database::new(pool, info.backend()))
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Round-trip a trivial statement.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
