//! Error types.
//!
//! Per-device and per-wait failures are **recoverable**: the monitor logs them, releases
//! whatever handle they concern, and carries on with the next scan cycle. Only
//! configuration and thread-management failures surface to the caller as [`Error`].

use crate::device::DeviceIdentity;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure on a single device handle.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The node could not be opened (permission denied, vanished before open, ...).
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading pending events failed mid-session (disconnect, I/O fault).
    #[error("failed to read from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `O_NONBLOCK` could not be set on a freshly opened handle.
    #[error("failed to make {} non-blocking: {source}", .path.display())]
    NonBlocking {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeviceError {
    /// The underlying OS error.
    pub fn io(&self) -> &io::Error {
        match self {
            DeviceError::Open { source, .. }
            | DeviceError::Read { source, .. }
            | DeviceError::NonBlocking { source, .. } => source,
        }
    }

    /// `true` when the device is gone rather than merely misbehaving.
    pub fn is_vanished(&self) -> bool {
        let err = self.io();
        err.kind() == io::ErrorKind::NotFound
            || err.raw_os_error() == Some(libc::ENODEV)
            || err.raw_os_error() == Some(libc::ENXIO)
    }
}

/// Failure of a multiplexed wait. Either variant discards the whole working set.
#[derive(Debug, Error)]
pub enum MultiplexError {
    /// A handle in the wait set was no longer valid when the wait ran.
    #[error("handle {handle} became invalid during wait")]
    Invalidated { handle: u64 },

    /// The wait primitive itself failed.
    #[error("wait failed: {0}")]
    Os(#[from] io::Error),
}

/// Rejected ledger write. The arbitrator guards against all of these before writing;
/// the ledger enforces them again on its own.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger is full ({slots} slots)")]
    Frozen { slots: usize },

    #[error("slot {got} written out of order (next open slot is {expected})")]
    OutOfOrder { expected: usize, got: usize },

    #[error("{0} is already assigned")]
    Duplicate(DeviceIdentity),

    #[error("a device on {} is already assigned", .0.display())]
    NodeHeld(PathBuf),
}

/// Configuration loading / validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Crate-level error returned by [`Monitor`](crate::monitor::Monitor) and friends.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn monitor thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("monitor thread panicked")]
    MonitorPanicked,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
