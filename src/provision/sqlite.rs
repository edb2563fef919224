//! SQLite file in a temporary directory. Needs no external services.

use super::TestEnvironment;
use crate::db::ConnectionInfo;
use crate::error::ProvisionError;
use async_trait::async_trait;
use std::path::Path;
use tempfile::TempDir;
use tracing::info;

const DB_FILE: &str = "books.db";

#[derive(Debug, Default)]
pub struct SqliteEnvironment {
    dir: Option<TempDir>,
}

impl SqliteEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding the database file, while running.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }
}

#[async_trait]
impl TestEnvironment for SqliteEnvironment {
    async fn start(&mut self) -> Result<(), ProvisionError> {
        if self.dir.is_none() {
            let dir = TempDir::new()?;
            info!(dir = %dir.path().display(), "Created sqlite environment");
            self.dir = Some(dir);
        }
        Ok(())
    }

    fn connection_info(&self) -> Result<ConnectionInfo, ProvisionError> {
        self.dir()
            .map(|dir| ConnectionInfo::sqlite(dir.join(DB_FILE)))
            .ok_or(ProvisionError::NotStarted)
    }

    async fn stop(&mut self) -> Result<(), ProvisionError> {
        if let Some(dir) = self.dir.take() {
            dir.close()?;
        }
        Ok(())
    }
}
