use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::loss::DEFAULT_LOSS_WINDOW;
use crate::store::{ViewState, DEFAULT_PLAYER_COUNT};

pub const ENV_ADDR: &str = "MMR_WATCH_ADDR";
pub const ENV_LOSS_WINDOW: &str = "MMR_WATCH_LOSS_WINDOW";

/// Monitor configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// WebSocket URL of the training host, e.g. `ws://localhost:5001`.
    #[serde(default)]
    pub address: Option<String>,

    /// Epochs per window when summarising the loss history.
    #[serde(default = "default_loss_window")]
    pub loss_window: usize,

    /// Player count shown before the host announces one.
    #[serde(default = "default_player_count")]
    pub initial_player_count: u32,
}

fn default_loss_window() -> usize {
    DEFAULT_LOSS_WINDOW
}

fn default_player_count() -> u32 {
    DEFAULT_PLAYER_COUNT
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            address: None,
            loss_window: default_loss_window(),
            initial_player_count: default_player_count(),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: MonitorConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_ADDR) {
            let addr = addr.trim();
            self.address = if addr.is_empty() {
                None
            } else {
                Some(addr.to_string())
            };
        }
        if let Some(window) = lookup(ENV_LOSS_WINDOW) {
            self.loss_window = window
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_LOSS_WINDOW,
                    value: window.clone(),
                })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loss_window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "loss_window",
                value: "0".to_string(),
            });
        }
        if let Some(addr) = &self.address {
            if !(addr.starts_with("ws://") || addr.starts_with("wss://")) {
                return Err(ConfigError::InvalidValue {
                    key: "address",
                    value: addr.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn view_state(&self) -> ViewState {
        ViewState::new(self.initial_player_count, self.loss_window)
    }
}
