//! Configuration Loader
//!
//! Environment-aware loading: discovers `fleet.*` files in a directory,
//! applies the environment overlay and `FLEET__*` variables on top of the
//! built-in defaults.

use super::error::{ConfigResult, ConfigurationError};
use super::FleetConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix for environment overrides, `FLEET__SCHEDULER__MAX_CONCURRENCY=8`
pub const ENV_PREFIX: &str = "FLEET";
const ENV_SEPARATOR: &str = "__";
const BASE_FILE_STEM: &str = "fleet";

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: FleetConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(config_dir, environment, None)
    }

    /// Same as [`Self::load_from_directory_with_env`] but reads variable
    /// overrides from `overrides` instead of the process environment.
    ///
    /// Useful for testing without modifying global environment variables.
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment, overrides)?;
        config.validate()?;

        info!(
            environment = %environment,
            max_concurrency = config.scheduler.max_concurrency,
            proxy_timeout_secs = config.execution.proxy_timeout_secs,
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already built configuration
    pub fn from_config(config: FleetConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Environment name from `FLEET_ENV` or `APP_ENV`, default `development`
    pub fn detect_environment() -> String {
        env::var("FLEET_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<FleetConfig> {
        let defaults = Config::try_from(&FleetConfig::default())
            .map_err(|e| ConfigurationError::source_error("defaults", e))?;

        let base = config_directory.join(BASE_FILE_STEM);
        let overlay = config_directory.join(format!("{BASE_FILE_STEM}.{environment}"));

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name(&base.to_string_lossy()).required(false))
            .add_source(File::with_name(&overlay.to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(overrides),
            )
            .build()
            .map_err(|e| ConfigurationError::EnvironmentConfigError {
                environment: environment.to_string(),
                error: e.to_string(),
            })?;

        Ok(merged.try_deserialize::<FleetConfig>()?)
    }
}
