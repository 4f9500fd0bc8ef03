//! Slot → device assignments.
//!
//! The ledger is append-only: slot `n + 1` can only be written after slot `n`, an identity
//! can only appear once, an event node can only appear once, and a full ledger refuses
//! every further write.
//!
//! Nodes are tracked next to identities because the identity of one node can change
//! between scans (a `by-id` link that appears late, or fails to resolve once). The node
//! a ledger-held handle was opened on stays excluded regardless. The arbitrator
//! checks all of this before writing; the ledger enforces it again so no caller can break
//! it.

use crate::device::{Device, DeviceIdentity, MonitoredDevice};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Display record for one filled slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 1-based player slot.
    pub slot: usize,
    /// Device name as reported by the driver.
    pub name: String,
    /// Stable identity the slot is bound to.
    pub identity: DeviceIdentity,
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {}: {} ({})", self.slot, self.name, self.identity)
    }
}

/// A filled slot together with its open device handle, handed to the caller once
/// registration has finished.
pub struct AssignedDevice {
    pub entry: LedgerEntry,
    pub device: Box<dyn Device>,
}

impl fmt::Debug for AssignedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssignedDevice")
            .field("entry", &self.entry)
            .field("node", &self.device.node())
            .finish()
    }
}

/// What a scan must skip: identities and event nodes already held by the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Exclusions {
    pub identities: HashSet<DeviceIdentity>,
    pub nodes: HashSet<PathBuf>,
}

impl Exclusions {
    /// `true` if either the identity or the node is taken.
    pub fn excludes(&self, identity: &DeviceIdentity, node: &Path) -> bool {
        self.identities.contains(identity) || self.nodes.contains(node)
    }
}

/// Ordered slot → device mapping with a fixed number of slots.
pub struct AssignmentLedger {
    slots: usize,
    entries: Vec<LedgerEntry>,
    nodes: Vec<PathBuf>,
    devices: BTreeMap<usize, Box<dyn Device>>,
}

impl AssignmentLedger {
    pub fn new(slots: usize) -> Self {
        Self {
            slots,
            entries: Vec::with_capacity(slots),
            nodes: Vec::with_capacity(slots),
            devices: BTreeMap::new(),
        }
    }

    /// Total number of slots.
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.slots
    }

    /// Next slot to fill, `None` once full.
    pub fn next_slot(&self) -> Option<usize> {
        (!self.is_full()).then(|| self.entries.len() + 1)
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.entries.iter().any(|e| &e.identity == identity)
    }

    /// `true` if a device opened on `node` holds a slot.
    pub fn holds_node(&self, node: &Path) -> bool {
        self.nodes.iter().any(|n| n == node)
    }

    /// Identities of every assigned device.
    pub fn identities(&self) -> HashSet<DeviceIdentity> {
        self.entries.iter().map(|e| e.identity.clone()).collect()
    }

    pub fn exclusions(&self) -> Exclusions {
        Exclusions {
            identities: self.identities(),
            nodes: self.nodes.iter().cloned().collect(),
        }
    }

    pub fn get(&self, slot: usize) -> Option<&LedgerEntry> {
        self.entries.get(slot.checked_sub(1)?)
    }

    /// Filled slots in slot order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Bind `device` to `slot`. On rejection the device is handed back untouched.
    pub fn assign(
        &mut self,
        slot: usize,
        device: MonitoredDevice,
    ) -> Result<LedgerEntry, (LedgerError, MonitoredDevice)> {
        let Some(expected) = self.next_slot() else {
            return Err((LedgerError::Frozen { slots: self.slots }, device));
        };
        if slot != expected {
            return Err((LedgerError::OutOfOrder { expected, got: slot }, device));
        }
        if self.contains(&device.identity) {
            return Err((LedgerError::Duplicate(device.identity.clone()), device));
        }
        let node = device.device.node().to_path_buf();
        if self.holds_node(&node) {
            return Err((LedgerError::NodeHeld(node), device));
        }

        let entry = LedgerEntry {
            slot,
            name: device.name().to_string(),
            identity: device.identity,
        };
        self.entries.push(entry.clone());
        self.nodes.push(node);
        self.devices.insert(slot, device.device);
        Ok(entry)
    }

    /// Move the open handles out, leaving the display records in place.
    pub fn take_devices(&mut self) -> Vec<AssignedDevice> {
        let devices = std::mem::take(&mut self.devices);
        devices
            .into_iter()
            .filter_map(|(slot, device)| {
                let entry = self.get(slot)?.clone();
                Some(AssignedDevice { entry, device })
            })
            .collect()
    }
}

impl fmt::Debug for AssignmentLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssignmentLedger")
            .field("slots", &self.slots)
            .field("entries", &self.entries)
            .field("nodes", &self.nodes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::VirtualController;

    fn monitored(ctl: &VirtualController, node: &str) -> MonitoredDevice {
        ctl.monitored(node)
    }

    #[test]
    fn fills_slots_in_order_then_freezes() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");
        ctl.add_keyboard("/dev/input/event2", "Keyboard B");
        ctl.add_keyboard("/dev/input/event3", "Keyboard C");

        let mut ledger = AssignmentLedger::new(2);
        assert_eq!(ledger.next_slot(), Some(1));

        let a = ledger.assign(1, monitored(&ctl, "/dev/input/event1")).unwrap();
        assert_eq!(a.slot, 1);
        assert_eq!(a.name, "Keyboard A");
        ledger.assign(2, monitored(&ctl, "/dev/input/event2")).unwrap();
        assert!(ledger.is_full());
        assert_eq!(ledger.next_slot(), None);

        let (err, back) = ledger
            .assign(3, monitored(&ctl, "/dev/input/event3"))
            .unwrap_err();
        assert_eq!(err, LedgerError::Frozen { slots: 2 });
        assert_eq!(back.identity.as_str(), "/dev/input/event3");
    }

    #[test]
    fn rejects_out_of_order_slots() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");

        let mut ledger = AssignmentLedger::new(2);
        let (err, _) = ledger
            .assign(2, monitored(&ctl, "/dev/input/event1"))
            .unwrap_err();
        assert_eq!(err, LedgerError::OutOfOrder { expected: 1, got: 2 });
        assert!(ledger.is_empty());
    }

    #[test]
    fn rejects_a_second_slot_for_the_same_identity() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");

        let mut ledger = AssignmentLedger::new(3);
        ledger.assign(1, monitored(&ctl, "/dev/input/event1")).unwrap();
        let (err, _) = ledger
            .assign(2, monitored(&ctl, "/dev/input/event1"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn rejects_a_second_slot_for_the_same_node_under_another_identity() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");

        let mut ledger = AssignmentLedger::new(2);
        ledger.assign(1, monitored(&ctl, "/dev/input/event1")).unwrap();

        let mut renamed = monitored(&ctl, "/dev/input/event1");
        renamed.identity = DeviceIdentity::new("/dev/input/by-id/usb-Acme-event-kbd");
        let (err, _) = ledger.assign(2, renamed).unwrap_err();
        assert_eq!(err, LedgerError::NodeHeld(PathBuf::from("/dev/input/event1")));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn exclusions_cover_identities_and_nodes() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");

        let mut ledger = AssignmentLedger::new(2);
        ledger.assign(1, monitored(&ctl, "/dev/input/event1")).unwrap();
        let exclusions = ledger.exclusions();

        let node = Path::new("/dev/input/event1");
        assert!(exclusions.excludes(
            &DeviceIdentity::new("/dev/input/event1"),
            Path::new("/dev/input/event9")
        ));
        assert!(exclusions.excludes(
            &DeviceIdentity::new("/dev/input/by-id/usb-Acme-event-kbd"),
            node
        ));
        assert!(!exclusions.excludes(
            &DeviceIdentity::new("/dev/input/event2"),
            Path::new("/dev/input/event2")
        ));
    }

    #[test]
    fn take_devices_keeps_entries_and_hands_out_handles() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");

        let mut ledger = AssignmentLedger::new(1);
        ledger.assign(1, monitored(&ctl, "/dev/input/event1")).unwrap();

        let devices = ledger.take_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].entry.slot, 1);
        assert_eq!(devices[0].device.name(), "Keyboard A");
        assert_eq!(ledger.entries().len(), 1);
        assert!(ledger.take_devices().is_empty());
    }

    #[test]
    fn get_is_one_based() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");

        let mut ledger = AssignmentLedger::new(2);
        ledger.assign(1, monitored(&ctl, "/dev/input/event1")).unwrap();
        assert!(ledger.get(0).is_none());
        assert_eq!(ledger.get(1).unwrap().name, "Keyboard A");
        assert!(ledger.get(2).is_none());
    }
}
