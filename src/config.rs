//! Configuration management for Windowguard.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, WindowGuardError};
use crate::ratelimit::{default_policies, LimiterOptions, DEFAULT_SWEEP_INTERVAL};

/// Prefix for environment overrides, e.g. `WINDOWGUARD__SERVER__LISTEN_ADDR`.
pub const ENV_PREFIX: &str = "WINDOWGUARD";

/// Main configuration for the Windowguard service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowGuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Policy applied per client to every request the server handles
    #[serde(default)]
    pub guard_policy: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            guard_policy: None,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Interval between sweeps of expired windows, in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Policy name to window and quota
    #[serde(default = "default_policies")]
    pub policies: BTreeMap<String, LimiterOptions>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            policies: default_policies(),
        }
    }
}

fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_millis() as u64
}

impl RateLimitingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl WindowGuardConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WindowGuardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| WindowGuardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file layered under
    /// `WINDOWGUARD__*` environment variables.
    ///
    /// The file is read with `serde_yaml` so policy names keep their case;
    /// the environment can only override scalar settings.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, env_source())
    }

    /// Like `load`, with an explicit environment source.
    pub fn load_with_env(path: Option<&Path>, env: ::config::Environment) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                let contents = std::fs::read_to_string(path)?;
                serde_yaml::from_str(&contents)
                    .map_err(|e| WindowGuardError::Config(e.to_string()))?
            }
            None => WindowGuardConfig::default(),
        };

        let overrides: EnvOverrides = ::config::Config::builder()
            .add_source(env)
            .build()?
            .try_deserialize()?;
        overrides.apply(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.sweep_interval_ms == 0 {
            return Err(WindowGuardError::Config(
                "sweep_interval_ms must be greater than zero".to_string(),
            ));
        }
        for (name, options) in &self.rate_limiting.policies {
            if name.is_empty() {
                return Err(WindowGuardError::Config("policy name must not be empty".to_string()));
            }
            if options.window_ms == 0 {
                return Err(WindowGuardError::Config(format!(
                    "policy {}: window_ms must be greater than zero",
                    name
                )));
            }
        }
        if let Some(guard) = &self.server.guard_policy {
            if !self.rate_limiting.policies.contains_key(guard) {
                return Err(WindowGuardError::Config(format!(
                    "guard_policy {} is not a configured policy",
                    guard
                )));
            }
        }
        Ok(())
    }
}

/// The `WINDOWGUARD__*` environment source.
pub fn env_source() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Settings the environment may override.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    #[serde(default)]
    server: ServerOverrides,
    #[serde(default)]
    rate_limiting: RateLimitingOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct ServerOverrides {
    listen_addr: Option<SocketAddr>,
    guard_policy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitingOverrides {
    sweep_interval_ms: Option<u64>,
}

impl EnvOverrides {
    fn apply(self, config: &mut WindowGuardConfig) {
        if let Some(addr) = self.server.listen_addr {
            config.server.listen_addr = addr;
        }
        if let Some(policy) = self.server.guard_policy {
            config.server.guard_policy = Some(policy);
        }
        if let Some(interval) = self.rate_limiting.sweep_interval_ms {
            config.rate_limiting.sweep_interval_ms = interval;
        }
    }
}
