//! # Fleet Configuration System
//!
//! Layered configuration for the deployment engine. Every value has a
//! default; files and environment variables only override.
//!
//! ## Sources (later wins)
//!
//! 1. built-in defaults ([`FleetConfig::default`])
//! 2. `<dir>/fleet.{toml,yaml,json}`
//! 3. `<dir>/fleet.<environment>.{toml,yaml,json}`
//! 4. `FLEET__<SECTION>__<KEY>` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fleet_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let concurrency = manager.config().scheduler.max_concurrency;
//! let proxy_timeout = manager.config().execution.proxy_timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::system;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Task scheduler sizing
    pub scheduler: SchedulerConfig,

    /// Command execution defaults
    pub execution: ExecutionConfig,

    /// Logging output
    pub logging: LoggingConfig,

    /// Lifecycle event broadcasting
    pub events: EventsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tasks allowed to run at once
    pub max_concurrency: usize,
    /// Backlog bound; `None` is unbounded
    pub maxsize_pending: Option<usize>,
    /// Upper bound for a composite waiting on one level
    pub wait_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: system::DEFAULT_MAX_CONCURRENCY,
            maxsize_pending: None,
            wait_timeout_secs: system::DEFAULT_WAIT_TIMEOUT_SECS,
        }
    }
}

impl SchedulerConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Timeout for operations that declare none
    pub default_operation_timeout_secs: u64,
    /// How long a proxy waits for the remote completion
    pub proxy_timeout_secs: u64,
    /// Keep going after failing steps
    pub force_all: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_operation_timeout_secs: system::DEFAULT_OPERATION_TIMEOUT_SECS,
            proxy_timeout_secs: system::DEFAULT_PROXY_TIMEOUT_SECS,
            force_all: false,
        }
    }
}

impl ExecutionConfig {
    pub fn default_operation_timeout(&self) -> Duration {
        Duration::from_secs(self.default_operation_timeout_secs)
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` wins when set
    pub level: Option<String>,
    /// Emit JSON lines instead of the console format
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

impl FleetConfig {
    /// Validate configuration for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduler.max_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_concurrency",
                "0",
                "at least one task must be allowed to run",
            ));
        }

        if self.scheduler.maxsize_pending == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "scheduler.maxsize_pending",
                "0",
                "omit the value for an unbounded backlog",
            ));
        }

        if self.execution.default_operation_timeout_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.default_operation_timeout_secs",
                "0",
                "timeout must be greater than 0",
            ));
        }

        if self.execution.proxy_timeout_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.proxy_timeout_secs",
                "0",
                "timeout must be greater than 0",
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "0",
                "broadcast channel needs capacity",
            ));
        }

        Ok(())
    }
}
