//! Runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings of a [`GameRuntime`](crate::runtime::GameRuntime).
///
/// Deserializable so an outer layer can load it from any format; missing
/// fields take their defaults.
///
/// # Example
///
/// ```rust,ignore
/// let config = RuntimeConfig::builder()
///     .server_id(1001)
///     .save_interval(Duration::from_secs(60))
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Server id, used to address global actors.
    pub server_id: i32,
    /// Period of the background save of every actor's dirty state.
    pub save_interval: Duration,
    /// Offline actors idle longer than this are evicted.
    pub idle_timeout: Duration,
    /// Period of the idle actor scan.
    pub idle_check_interval: Duration,
    /// Default caller-side timeout of dispatched handlers. `None` waits
    /// forever.
    pub send_timeout: Option<Duration>,
    /// Actors flushed concurrently by one save batch.
    pub save_batch_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            server_id: 1,
            save_interval: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(900),
            idle_check_interval: Duration::from_secs(60),
            send_timeout: Some(Duration::from_secs(10)),
            save_batch_size: 1000,
        }
    }
}

impl RuntimeConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_id <= 0 {
            return Err(ConfigError::InvalidConfig(format!(
                "server_id must be positive, got {}",
                self.server_id
            )));
        }
        if self.save_interval.is_zero() {
            return Err(ConfigError::InvalidConfig("save_interval must be non-zero".into()));
        }
        if self.idle_check_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "idle_check_interval must be non-zero".into(),
            ));
        }
        if self.save_batch_size == 0 {
            return Err(ConfigError::InvalidConfig("save_batch_size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Set the server id.
    pub fn server_id(mut self, server_id: i32) -> Self {
        self.config.server_id = server_id;
        self
    }

    /// Set the background save period.
    pub fn save_interval(mut self, interval: Duration) -> Self {
        self.config.save_interval = interval;
        self
    }

    /// Set the idle eviction threshold.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the idle scan period.
    pub fn idle_check_interval(mut self, interval: Duration) -> Self {
        self.config.idle_check_interval = interval;
        self
    }

    /// Set the default handler timeout.
    pub fn send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.send_timeout = timeout;
        self
    }

    /// Set the save batch size.
    pub fn save_batch_size(mut self, size: usize) -> Self {
        self.config.save_batch_size = size;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
