//! Engine configuration.
//!
//! Stored as TOML. Every section and field is optional; missing values take
//! their defaults.
//!
//! ```toml
//! [runtime]
//! idle_wait_ms = 100
//! default_max_frequency = 30.0
//!
//! [manager]
//! transport = "local"      # or "tcp"
//! ping_timeout_ms = 1000
//! shutdown_grace_ms = 1000
//!
//! [logging]
//! filter = "info,pipegraph=debug"
//! ```

use crate::error::{EngineError, Result};
use crate::node::params::{MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};
use crate::node::RuntimeOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default wait of an idle node runtime, in milliseconds
pub const DEFAULT_IDLE_WAIT_MS: u64 = 100;

/// Default autotrigger rate in Hz
pub const DEFAULT_MAX_FREQUENCY: f64 = 30.0;

/// Default timeout for PING/PONG health checks in milliseconds
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 1000;

/// Default time a terminated node gets to exit, in milliseconds
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 1000;

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "info,pipegraph=debug";

/// How the manager connects to its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// In-process channel pairs
    #[default]
    Local,
    /// Loopback TCP sockets
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Local => write!(f, "local"),
            Transport::Tcp => write!(f, "tcp"),
        }
    }
}

/// Settings for node runtimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub idle_wait_ms: u64,
    pub default_max_frequency: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: DEFAULT_IDLE_WAIT_MS,
            default_max_frequency: DEFAULT_MAX_FREQUENCY,
        }
    }
}

/// Settings for the manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub transport: Transport,
    pub ping_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub runtime: RuntimeConfig,
    pub manager: ManagerConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| e.with_context(format!("loading {}", path.display())))
    }

    /// Save as TOML, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            EngineError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.runtime.idle_wait_ms == 0 {
            return Err(EngineError::Config(
                "runtime.idle_wait_ms must be positive".into(),
            ));
        }
        let freq = self.runtime.default_max_frequency;
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&freq) {
            return Err(EngineError::Config(format!(
                "runtime.default_max_frequency must be within [{}, {}], got {}",
                MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ, freq
            )));
        }
        if self.manager.ping_timeout_ms == 0 {
            return Err(EngineError::Config(
                "manager.ping_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            idle_wait: Duration::from_millis(self.runtime.idle_wait_ms),
            default_max_frequency: self.runtime.default_max_frequency,
        }
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.manager.ping_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.manager.shutdown_grace_ms)
    }
}
