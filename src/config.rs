//! Monitor configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid configuration.
//! Files are read as TOML or JSON depending on their extension.
//!
//! ```toml
//! slots = 2
//! poll_timeout_ms = 50
//! identity = "stable_alias"
//! alias_dirs = ["/dev/input/by-id", "/dev/input/by-path"]
//! ```

use crate::device::DeviceIdentity;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on player slots.
pub const MAX_SLOTS: usize = 16;

/// How a device's stable identity is derived.
///
/// This decides what happens when a device is unplugged and plugged back in while
/// registration is still running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Use the first persistent alias that resolves to the node (falling back to the node
    /// itself when there is none). A reconnected device keeps its identity, so an
    /// already-assigned keyboard stays excluded.
    #[default]
    StableAlias,

    /// Use the event node path. The kernel may hand a reconnected device a new node, in
    /// which case it is treated as a new device.
    DeviceNode,
}

impl IdentityPolicy {
    /// Derive the identity of `node`, reached through `alias` if one was found.
    pub fn identity(self, node: &Path, alias: Option<&Path>) -> DeviceIdentity {
        match (self, alias) {
            (IdentityPolicy::StableAlias, Some(alias)) => DeviceIdentity::from_path(alias),
            _ => DeviceIdentity::from_path(node),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Number of player slots to fill.
    pub slots: usize,
    /// Upper bound on a single multiplexed wait.
    pub poll_timeout_ms: u64,
    /// Pause before rescanning when no candidate keyboard is open.
    pub idle_backoff_ms: u64,
    /// Pause after a multiplexer failure before the forced rescan.
    pub error_backoff_ms: u64,
    /// Minimum time between rescans while the working set is healthy. `0` rescans every
    /// cycle.
    pub rescan_interval_ms: u64,
    /// Persistent alias directories, searched in order.
    pub alias_dirs: Vec<PathBuf>,
    /// Directory holding the raw `event*` nodes.
    pub device_dir: PathBuf,
    /// Identity derivation policy.
    pub identity: IdentityPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            slots: 2,
            poll_timeout_ms: 50,
            idle_backoff_ms: 500,
            error_backoff_ms: 100,
            rescan_interval_ms: 250,
            alias_dirs: vec![
                PathBuf::from("/dev/input/by-id"),
                PathBuf::from("/dev/input/by-path"),
            ],
            device_dir: PathBuf::from("/dev/input"),
            identity: IdentityPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Default configuration with `slots` player slots.
    pub fn with_slots(slots: usize) -> Self {
        Self {
            slots,
            ..Self::default()
        }
    }

    /// Load a `.toml` or `.json` file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)?,
            Some("json") => serde_json::from_str(&text)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slots == 0 || self.slots > MAX_SLOTS {
            return Err(ConfigError::Invalid(format!(
                "slots must be between 1 and {MAX_SLOTS}, got {}",
                self.slots
            )));
        }
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms)
    }
}
