//! Engine configuration
//!
//! Every section carries `#[serde(default)]`, so a config file only needs the
//! keys it changes.

use std::path::{Path, PathBuf};

use action_flow::RetryPolicy;
use action_primitives::WaitConfig;
use anyhow::{Context, Result};
use network_tap_light::TapConfig;
use serde::{Deserialize, Serialize};
use soulflow_scheduler::EngineConfig;
use tokio::fs;
use tracing::{info, warn};

pub const LOCAL_CONFIG: &str = "config/soulflow.yaml";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub wait: WaitConfig,
    pub retry: RetryPolicy,
    pub network: NetworkSection,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Completed requests kept by the monitor
    pub capacity: usize,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            capacity: TapConfig::default().capacity,
        }
    }
}

impl NetworkSection {
    /// Monitor settings, with the idle window shared with the waiter.
    pub fn tap_config(&self, wait: &WaitConfig) -> TapConfig {
        TapConfig {
            capacity: self.capacity.max(1),
            idle_window_ms: wait.idle_window_ms,
            ..TapConfig::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of the human format
    pub json: bool,
    /// Directory for a daily rolling log file, in addition to stderr
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

impl Config {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse config file")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to render configuration")
    }
}

pub struct LoadedConfig {
    pub config: Config,
    /// File the config came from, or the path that was looked for
    pub path: PathBuf,
    pub from_file: bool,
}

/// Default lookup location when no path is given:
/// `./config/soulflow.yaml`, then the user config dir.
pub fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|mut path| {
        path.push("soulflow");
        path.push("config.yaml");
        path
    })
}

pub async fn load_config(config_path: Option<&Path>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => {
                warn!("No config directory available, using defaults");
                return Ok(LoadedConfig {
                    config: Config::default(),
                    path: PathBuf::from(LOCAL_CONFIG),
                    from_file: false,
                });
            }
        },
    };

    if fs::try_exists(&path).await.unwrap_or(false) {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Config::from_yaml(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!("Loaded configuration from: {}", path.display());
        Ok(LoadedConfig {
            config,
            path,
            from_file: true,
        })
    } else if config_path.is_some() {
        anyhow::bail!("Config file not found: {}", path.display())
    } else {
        warn!("Config file not found, using defaults: {}", path.display());
        Ok(LoadedConfig {
            config: Config::default(),
            path,
            from_file: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = Config::from_yaml(
            "retry:\n  max_attempts: 5\nwait:\n  poll_interval_ms: 20\nengine:\n  max_concurrent: 2\n",
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.wait.poll_interval_ms, 20);
        assert_eq!(config.wait.timeout_ms, 30_000);
        assert_eq!(config.engine.max_concurrent, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rendered_yaml_parses_back() {
        let config = Config::default();
        let parsed = Config::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn tap_config_follows_wait_window() {
        let wait = WaitConfig {
            idle_window_ms: 250,
            ..WaitConfig::default()
        };
        let tap = NetworkSection { capacity: 0 }.tap_config(&wait);
        assert_eq!(tap.capacity, 1);
        assert_eq!(tap.idle_window_ms, 250);
    }
}
