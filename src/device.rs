//! Device handles and identities.
//!
//! A [`Device`] is one open, readable handle on an input node. Backends implement it;
//! the rest of the crate only ever sees `Box<dyn Device>`.
//!
//! ## Identity
//! Two identifiers travel with every monitored device:
//! - [`DeviceIdentity`] is **stable**: derived from the persistent alias namespace
//!   (e.g. `/dev/input/by-id/usb-...-event-kbd`) or from the event node, depending on
//!   [`IdentityPolicy`](crate::config::IdentityPolicy). The ledger and the scanner's
//!   exclusion list are keyed by it.
//! - [`HandleId`] is **transient**: one per successful open, never reused within a
//!   process. The working set is keyed by it, so a closed-then-reopened descriptor
//!   number can never alias an older entry.

use crate::classifier::Capabilities;
use crate::error::DeviceError;
use crate::event::InputEvent;
use crate::metadata::DeviceMeta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// One open handle on an input node.
pub trait Device: Send {
    /// Human-readable name reported by the device.
    fn name(&self) -> &str;

    /// Event node this handle was opened on (e.g. `/dev/input/event5`).
    fn node(&self) -> &Path;

    /// Event types and key codes the device advertises.
    fn capabilities(&self) -> Capabilities;

    /// Switch the handle to non-blocking reads.
    fn set_nonblocking(&mut self) -> Result<(), DeviceError>;

    /// Append every pending event to `out`. "Nothing pending" is `Ok`, not an error.
    fn fetch(&mut self, out: &mut Vec<InputEvent>) -> Result<(), DeviceError>;

    /// OS descriptor to wait on, if the handle has one.
    fn raw_fd(&self) -> Option<RawFd>;

    /// Best-effort metadata for display and logging.
    fn metadata(&self) -> DeviceMeta {
        DeviceMeta {
            node: Some(self.node().display().to_string()),
            ..DeviceMeta::default()
        }
    }
}

/// Stable, hardware-derived device identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transient per-open handle identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    /// Allocate a fresh id. Ids increase monotonically for the life of the process.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HandleId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// An open, classified, non-blocking device that is not (yet) assigned to a slot.
pub struct MonitoredDevice {
    pub handle: HandleId,
    pub identity: DeviceIdentity,
    pub device: Box<dyn Device>,
}

impl MonitoredDevice {
    pub fn name(&self) -> &str {
        self.device.name()
    }
}

impl fmt::Debug for MonitoredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredDevice")
            .field("handle", &self.handle)
            .field("identity", &self.identity)
            .field("name", &self.device.name())
            .field("node", &self.device.node())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_ids_are_never_reused() {
        let a = HandleId::next();
        let b = HandleId::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn identity_displays_its_path() {
        let id = DeviceIdentity::from_path(Path::new("/dev/input/by-id/usb-kbd-event-kbd"));
        assert_eq!(id.to_string(), "/dev/input/by-id/usb-kbd-event-kbd");
    }
}
