//! Postgres running in a throwaway Docker container.

use super::TestEnvironment;
use crate::config::ProvisionConfig;
use crate::db::{ConnectionInfo, SslMode};
use crate::error::ProvisionError;
use async_trait::async_trait;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tracing::info;

/// Logged by the postgres entrypoint once the server is up. The init phase
/// logs it too, so the provisioner still probes with real queries afterwards.
const READY_MESSAGE: &str = "database system is ready to accept connections";

/// A Postgres server in a container that is removed on `stop` (or on drop).
pub struct PostgresContainer {
    image: String,
    tag: String,
    port: u16,
    user: String,
    password: String,
    database: String,
    ssl_mode: SslMode,
    running: Option<Running>,
}

struct Running {
    container: ContainerAsync<GenericImage>,
    info: ConnectionInfo,
}

impl PostgresContainer {
    pub fn from_config(config: &ProvisionConfig) -> Self {
        Self {
            image: config.image.clone(),
            tag: config.image_tag.clone(),
            port: config.port,
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            ssl_mode: config.ssl_mode,
            running: None,
        }
    }

    /// Docker id of the running container.
    pub fn container_id(&self) -> Option<&str> {
        self.running.as_ref().map(|r| r.container.id())
    }
}

#[async_trait]
impl TestEnvironment for PostgresContainer {
    async fn start(&mut self) -> Result<(), ProvisionError> {
        if self.running.is_some() {
            return Ok(());
        }

        info!(image = %self.image, tag = %self.tag, "Starting database container");

        let container = GenericImage::new(self.image.clone(), self.tag.clone())
            .with_exposed_port(self.port.tcp())
            .with_wait_for(WaitFor::message_on_stderr(READY_MESSAGE))
            .with_env_var("POSTGRES_USER", self.user.clone())
            .with_env_var("POSTGRES_PASSWORD", self.password.clone())
            .with_env_var("POSTGRES_DB", self.database.clone())
            .start()
            .await
            .map_err(|e| ProvisionError::Start(e.to_string()))?;

        // The container is removed on drop if either lookup fails.
        let host = container
            .get_host()
            .await
            .map_err(|e| ProvisionError::Start(e.to_string()))?;
        let host_port = container
            .get_host_port_ipv4(self.port.tcp())
            .await
            .map_err(|e| ProvisionError::Start(e.to_string()))?;

        let info = ConnectionInfo::Postgres {
            host: host.to_string(),
            port: host_port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            ssl_mode: self.ssl_mode,
        };

        info!(id = container.id(), %info, "Database container started");
        self.running = Some(Running { container, info });
        Ok(())
    }

    fn connection_info(&self) -> Result<ConnectionInfo, ProvisionError> {
        self.running
            .as_ref()
            .map(|r| r.info.clone())
            .ok_or(ProvisionError::NotStarted)
    }

    async fn stop(&mut self) -> Result<(), ProvisionError> {
        if let Some(running) = self.running.take() {
            info!(id = running.container.id(), "Removing database container");
            running
                .container
                .rm()
                .await
                .map_err(|e| ProvisionError::Stop(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unstarted_container_has_no_coordinates() {
        let mut env = PostgresContainer::from_config(&ProvisionConfig::default());

        assert!(env.container_id().is_none());
        assert!(matches!(
            env.connection_info(),
            Err(ProvisionError::NotStarted)
        ));
        // Stopping something that never ran is a no-op.
        env.stop().await.expect("stop should be a no-op");
    }
}
