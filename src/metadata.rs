//! Device metadata snapshot.
//!
//! [`DeviceMeta`] is a lightweight, cloneable description of a device suitable for UI
//! display and logging. Backends populate what they know; unknown fields stay `None`.
//!
//! # Conventions
//! - `bus` is the Linux `BUS_*` code (`0x03` USB, `0x05` Bluetooth, `0x11` i8042, ...).
//! - `phys` is the kernel's physical topology path (`usb-0000:00:14.0-2/input0`).
//! - `uniq` is the device's unique string (often a serial or Bluetooth MAC), when set.
//! - `node` is the event node the handle was opened on.
//!
//! ## Identity notes
//! `vendor`/`product` pairs are shared by every unit of a model, and `node` changes across
//! reconnects. Neither is a stable identity on its own; the alias namespace is.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of metadata describing a single device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMeta {
    /// Linux bus type code, if known.
    pub bus: Option<u16>,

    /// Vendor ID, if known.
    pub vendor: Option<u16>,

    /// Product ID, if known.
    pub product: Option<u16>,

    /// Firmware/driver version, if known.
    pub version: Option<u16>,

    /// Physical topology path reported by the driver.
    pub phys: Option<String>,

    /// Unique identifier string reported by the driver.
    pub uniq: Option<String>,

    /// Event node path.
    pub node: Option<String>,
}

impl fmt::Display for DeviceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.vendor, self.product) {
            (Some(v), Some(p)) => write!(f, "{v:04x}:{p:04x}")?,
            _ => f.write_str("????:????")?,
        }
        if let Some(phys) = &self.phys {
            write!(f, " phys={phys}")?;
        }
        if let Some(node) = &self.node {
            write!(f, " node={node}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_ids_and_node() {
        let meta = DeviceMeta {
            vendor: Some(0x046d),
            product: Some(0xc31c),
            node: Some("/dev/input/event3".into()),
            ..DeviceMeta::default()
        };
        assert_eq!(meta.to_string(), "046d:c31c node=/dev/input/event3");
    }
}
