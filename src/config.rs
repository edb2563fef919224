use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::db::{Backend, SslMode};

/// Settings for provisioning a disposable database.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub backend: Backend,
    pub image: String,
    pub image_tag: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: SslMode,
    pub ready_timeout: Duration,
    pub migrations_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Postgres,
            image: "postgres".to_string(),
            image_tag: "latest".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "testdb".to_string(),
            ssl_mode: SslMode::Disable,
            ready_timeout: Duration::from_secs(60),
            migrations_dir: PathBuf::from("migrations"),
        }
    }
}

impl ProvisionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| env_map.get(key).map(|s| s.trim()).filter(|s| !s.is_empty());

        let backend = match get("DB_BACKEND") {
            None => defaults.backend,
            Some(value) => value.parse::<Backend>().map_err(|_| {
                ConfigError::InvalidValue(
                    "DB_BACKEND".to_string(),
                    format!("must be postgres or sqlite, got {}", value),
                )
            })?,
        };

        let port = match get("DB_PORT") {
            None => defaults.port,
            Some(value) => value.parse::<u16>().map_err(|_| {
                ConfigError::InvalidValue("DB_PORT".to_string(), "must be a valid u16".to_string())
            })?,
        };

        let ssl_mode = match get("DB_SSL_MODE") {
            None => defaults.ssl_mode,
            Some(value) => value.parse::<SslMode>().map_err(|_| {
                ConfigError::InvalidValue(
                    "DB_SSL_MODE".to_string(),
                    format!("must be disable, allow, prefer, or require, got {}", value),
                )
            })?,
        };

        let ready_timeout = match get("DB_READY_TIMEOUT_MS") {
            None => defaults.ready_timeout,
            Some(value) => match value.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::InvalidValue(
                        "DB_READY_TIMEOUT_MS".to_string(),
                        "must be a positive integer".to_string(),
                    ))
                }
            },
        };

        let string_or = |key: &str, default: String| get(key).map(str::to_string).unwrap_or(default);

        Ok(ProvisionConfig {
            backend,
            image: string_or("DB_IMAGE", defaults.image),
            image_tag: string_or("DB_IMAGE_TAG", defaults.image_tag),
            port,
            user: string_or("DB_USER", defaults.user),
            password: string_or("DB_PASSWORD", defaults.password),
            database: string_or("DB_NAME", defaults.database),
            ssl_mode,
            ready_timeout,
            migrations_dir: get("MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.migrations_dir),
        })
    }

    /// Directory holding the scripts for the configured backend.
    pub fn backend_migrations_dir(&self) -> PathBuf {
        self.migrations_dir.join(self.backend.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_env() {
        let config = ProvisionConfig::from_env_map(HashMap::new()).unwrap();
        assert_eq!(config.backend, Backend::Postgres);
        assert_eq!(config.image, "postgres");
        assert_eq!(config.image_tag, "latest");
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, "testdb");
        assert_eq!(config.ssl_mode, SslMode::Disable);
        assert_eq!(config.ready_timeout, Duration::from_secs(60));
        assert_eq!(
            config.backend_migrations_dir(),
            PathBuf::from("migrations/postgres")
        );
    }

    #[test]
    fn test_overrides() {
        let mut env_map = HashMap::new();
        env_map.insert("DB_BACKEND".to_string(), "sqlite".to_string());
        env_map.insert("DB_IMAGE_TAG".to_string(), "16-alpine".to_string());
        env_map.insert("DB_READY_TIMEOUT_MS".to_string(), "1500".to_string());
        env_map.insert("MIGRATIONS_DIR".to_string(), "/srv/scripts".to_string());

        let config = ProvisionConfig::from_env_map(env_map).unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.image_tag, "16-alpine");
        assert_eq!(config.ready_timeout, Duration::from_millis(1500));
        assert_eq!(
            config.backend_migrations_dir(),
            PathBuf::from("/srv/scripts/sqlite")
        );
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let mut env_map = HashMap::new();
        env_map.insert("DB_NAME".to_string(), "   ".to_string());
        let config = ProvisionConfig::from_env_map(env_map).unwrap();
        assert_eq!(config.database, "testdb");
    }

    #[test]
    fn test_invalid_backend() {
        let mut env_map = HashMap::new();
        env_map.insert("DB_BACKEND".to_string(), "mysql".to_string());
        match ProvisionConfig::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DB_BACKEND"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = HashMap::new();
        env_map.insert("DB_PORT".to_string(), "not_a_number".to_string());
        match ProvisionConfig::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DB_PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut env_map = HashMap::new();
        env_map.insert("DB_SSL_MODE".to_string(), "verify-everything".to_string());
        match ProvisionConfig::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DB_SSL_MODE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_ready_timeout_rejected() {
        let mut env_map = HashMap::new();
        env_map.insert("DB_READY_TIMEOUT_MS".to_string(), "0".to_string());
        match ProvisionConfig::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DB_READY_TIMEOUT_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
