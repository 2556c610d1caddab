//! Configuration Loader
//!
//! Environment-aware configuration loading. Discovers the configuration file,
//! layers `VENUE__*` environment variables over it with the `config` crate,
//! deserializes into [`ServiceConfig`] and validates the result.

use super::error::{ConfigResult, ConfigurationError};
use super::ServiceConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "VENUE_CONFIG_PATH";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "VENUE";

/// File stems probed in the configuration directory
const CONFIG_FILE_CANDIDATES: [&str; 4] = [
    "configuration.json",
    "configuration.yaml",
    "configuration.yml",
    "configuration.toml",
];

/// Get current environment from environment variables
pub fn detect_environment() -> String {
    env::var("VENUE_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Loaded and validated configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: ServiceConfig,
    environment: String,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let path = Self::discover_config_path(None)?;
        Self::load_from_path_with_env(&path, &detect_environment())
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: &Path) -> ConfigResult<Arc<ConfigManager>> {
        let path = Self::discover_config_path(Some(config_dir))?;
        Self::load_from_path_with_env(&path, &detect_environment())
    }

    /// Load configuration from an explicit file with an explicit environment name
    pub fn load_from_path_with_env(
        path: &Path,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        debug!(
            "Loading configuration for environment '{}' from {}",
            environment,
            path.display()
        );

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("message.topics"),
            )
            .build()
            .map_err(|e| ConfigurationError::parse_error(path.display().to_string(), e))?;

        let config: ServiceConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::parse_error(path.display().to_string(), e))?;

        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = environment,
            gateway = %config.message.gateway,
            inbox = %config.message.inbox,
            topics = config.message.topics.len(),
            broker = %config.message.options.redacted_uri(),
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_path: path.to_path_buf(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Configuration as JSON with credentials masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Resolve the configuration file: explicit env var, then the directory candidates
    fn discover_config_path(config_dir: Option<&Path>) -> ConfigResult<PathBuf> {
        if let Ok(explicit) = env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(explicit);
            if path.is_file() {
                return Ok(path);
            }
            return Err(ConfigurationError::config_file_not_found(vec![path]));
        }

        let directory = config_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("config"));

        let searched: Vec<PathBuf> = CONFIG_FILE_CANDIDATES
            .iter()
            .map(|candidate| directory.join(candidate))
            .collect();

        searched
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| ConfigurationError::config_file_not_found(searched.clone()))
    }

    fn sanitize_config_for_logging(config: &ServiceConfig) -> serde_json::Value {
        let mut value = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);

        for pointer in [
            "/message/options/password",
            "/message/options/uri",
            "/database/password",
            "/database/url",
        ] {
            if let Some(field) = value.pointer_mut(pointer) {
                if !field.is_null() {
                    *field = serde_json::Value::String("***".to_string());
                }
            }
        }

        value
    }
}
