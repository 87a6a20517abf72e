// SPDX-License-Identifier: GPL-3.0-only
//! Transaction timing configuration
//!
//! Timing defaults follow the DDC/CI recommendations (40 ms before reading a
//! reply, 50 ms after a write). Individual monitors can override them in
//! `~/.config/monitor-ddc/config.kdl`:
//!
//! ```kdl
//! reply-delay-ms 40
//! max-retries 3
//! monitor "/dev/i2c-4" {
//!     max-retries 5
//!     settle-delay-ms 100
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocols::ddc_ci::VCP_REPLY_LEN;
use crate::session::DisplayId;

pub const CONFIG_DIR: &str = "monitor-ddc";
pub const CONFIG_FILE: &str = "config.kdl";

/// Largest reply buffer worth reading; no VCP reply comes close
pub const MAX_REPLY_CAPACITY: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't parse config: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Delays and retry policy for one display
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Wait between sending a read request and fetching the reply
    pub reply_delay_ms: u64,
    /// Wait after a write before the session is released
    pub settle_delay_ms: u64,
    /// Upper bound for fetching one reply
    pub reply_timeout_ms: u64,
    /// Additional attempts after the first failed read
    pub max_retries: u8,
    /// Bytes fetched per reply
    pub reply_capacity: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            reply_delay_ms: 40,
            settle_delay_ms: 50,
            reply_timeout_ms: 200,
            max_retries: 3,
            reply_capacity: crate::protocols::ddc_ci::VCP_REPLY_LEN,
        }
    }
}

impl TransactionConfig {
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// Per-monitor overrides; unset fields fall back to the global values
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub reply_delay_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub reply_timeout_ms: Option<u64>,
    pub max_retries: Option<u8>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct Config {
    pub transaction: TransactionConfig,
    pub monitors: HashMap<DisplayId, MonitorConfig>,
}

impl Config {
    /// `$XDG_CONFIG_HOME/monitor-ddc/config.kdl`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "Loading config");
                Self::from_kdl(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io { path: path.to_path_buf(), source }),
        }
    }

    pub fn from_kdl(text: &str) -> Result<Self, ConfigError> {
        let doc: KdlDocument = text.parse()?;
        let mut config = Self::default();

        for node in doc.nodes() {
            match node.name().value() {
                "monitor" => {
                    let id = string_arg(node)?;
                    let mut monitor = MonitorConfig::default();
                    if let Some(children) = node.children() {
                        for child in children.nodes() {
                            match child.name().value() {
                                "reply-delay-ms" => monitor.reply_delay_ms = Some(int_arg(child)?),
                                "settle-delay-ms" => monitor.settle_delay_ms = Some(int_arg(child)?),
                                "reply-timeout-ms" => {
                                    monitor.reply_timeout_ms = Some(int_arg(child)?)
                                }
                                "max-retries" => monitor.max_retries = Some(int_arg(child)?),
                                other => warn!("Ignoring unknown monitor setting '{}'", other),
                            }
                        }
                    }
                    config.monitors.insert(id, monitor);
                }
                "reply-delay-ms" => config.transaction.reply_delay_ms = int_arg(node)?,
                "settle-delay-ms" => config.transaction.settle_delay_ms = int_arg(node)?,
                "reply-timeout-ms" => config.transaction.reply_timeout_ms = int_arg(node)?,
                "max-retries" => config.transaction.max_retries = int_arg(node)?,
                "reply-capacity" => config.transaction.reply_capacity = reply_capacity_arg(node)?,
                other => warn!("Ignoring unknown config key '{}'", other),
            }
        }

        Ok(config)
    }

    /// Effective timing for one display
    pub fn transaction_for(&self, id: &str) -> TransactionConfig {
        let mut timing = self.transaction.clone();
        if let Some(monitor) = self.monitors.get(id) {
            if let Some(v) = monitor.reply_delay_ms {
                timing.reply_delay_ms = v;
            }
            if let Some(v) = monitor.settle_delay_ms {
                timing.settle_delay_ms = v;
            }
            if let Some(v) = monitor.reply_timeout_ms {
                timing.reply_timeout_ms = v;
            }
            if let Some(v) = monitor.max_retries {
                timing.max_retries = v;
            }
        }
        timing
    }
}

fn reply_capacity_arg(node: &KdlNode) -> Result<usize, ConfigError> {
    let capacity: usize = int_arg(node)?;
    if !(VCP_REPLY_LEN..=MAX_REPLY_CAPACITY).contains(&capacity) {
        return Err(ConfigError::InvalidValue {
            key: node.name().value().to_string(),
            reason: format!(
                "{} is outside {}..={}",
                capacity, VCP_REPLY_LEN, MAX_REPLY_CAPACITY
            ),
        });
    }
    Ok(capacity)
}

fn int_arg<T: TryFrom<i128>>(node: &KdlNode) -> Result<T, ConfigError> {
    let key = node.name().value().to_string();
    let value = node
        .entries()
        .first()
        .and_then(|entry| entry.value().as_integer())
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.clone(),
            reason: "expected an integer".to_string(),
        })?;
    T::try_from(value).map_err(|_| ConfigError::InvalidValue {
        key,
        reason: format!("{} is out of range", value),
    })
}

fn string_arg(node: &KdlNode) -> Result<String, ConfigError> {
    node.entries()
        .first()
        .and_then(|entry| entry.value().as_string())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: node.name().value().to_string(),
            reason: "expected a display id string".to_string(),
        })
}
