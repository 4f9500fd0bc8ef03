//! Working-set ownership and handle release.
//!
//! [`MonitoredSet`] owns every open, unassigned keyboard handle. It is keyed by the
//! transient [`HandleId`] with a secondary index by [`DeviceIdentity`]; all closing of
//! handles in the crate goes through [`close`] so it is logged with a reason.
//!
//! Dropping a `MonitoredSet` releases whatever it still holds, so the monitor thread gives
//! its handles back on every exit path, unwinding included.

use crate::device::{Device, DeviceIdentity, HandleId, MonitoredDevice};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Why a handle was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// A rescan no longer offered the identity (assigned, reclassified, or gone).
    Absent,
    /// A rescan opened an identity that was already being watched.
    Duplicate,
    /// Reading from the handle failed.
    ReadError,
    /// The multiplexer reported a stale handle; the whole set was discarded.
    MultiplexReset,
    /// The monitor loop exited.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CloseReason::Absent => "no longer offered by scan",
            CloseReason::Duplicate => "duplicate of a watched handle",
            CloseReason::ReadError => "read error",
            CloseReason::MultiplexReset => "working set reset",
            CloseReason::Shutdown => "shutdown",
        })
    }
}

/// Close one handle.
pub fn close(device: MonitoredDevice, reason: CloseReason) {
    debug!(
        "closing {} {} ({}): {reason}",
        device.handle,
        device.name(),
        device.identity
    );
    drop(device);
}

/// Counts from one [`MonitoredSet::reconcile`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// New identities now being watched.
    pub adopted: usize,
    /// Identities watched before and after; the older handle was kept.
    pub kept: usize,
    /// Previously watched handles closed because their identity disappeared.
    pub closed: usize,
}

/// Open, unassigned keyboards owned by the monitor thread.
#[derive(Debug, Default)]
pub struct MonitoredSet {
    devices: HashMap<HandleId, MonitoredDevice>,
    by_identity: HashMap<DeviceIdentity, HandleId>,
}

impl MonitoredSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn handle_of(&self, identity: &DeviceIdentity) -> Option<HandleId> {
        self.by_identity.get(identity).copied()
    }

    pub fn get(&self, handle: HandleId) -> Option<&MonitoredDevice> {
        self.devices.get(&handle)
    }

    /// Merge a fresh scan into the set.
    ///
    /// Watched identities missing from `fresh` are closed. Identities present in both keep
    /// the older handle (it may already hold unread events) and the fresh one is closed.
    /// New identities are adopted.
    pub fn reconcile(&mut self, fresh: Vec<MonitoredDevice>) -> Reconciled {
        let mut summary = Reconciled::default();
        let offered: HashSet<&DeviceIdentity> = fresh.iter().map(|d| &d.identity).collect();

        let stale: Vec<HandleId> = self
            .devices
            .values()
            .filter(|d| !offered.contains(&d.identity))
            .map(|d| d.handle)
            .collect();
        for handle in stale {
            if self.close(handle, CloseReason::Absent) {
                summary.closed += 1;
            }
        }

        for device in fresh {
            if self.by_identity.contains_key(&device.identity) {
                close(device, CloseReason::Duplicate);
                summary.kept += 1;
            } else {
                self.restore(device);
                summary.adopted += 1;
            }
        }
        summary
    }

    /// Remove a device for reading or assignment.
    pub fn take(&mut self, handle: HandleId) -> Option<MonitoredDevice> {
        let device = self.devices.remove(&handle)?;
        self.by_identity.remove(&device.identity);
        Some(device)
    }

    /// Put a device (back) into the set. An existing entry for the same identity is
    /// closed as a duplicate.
    pub fn restore(&mut self, device: MonitoredDevice) {
        if let Some(previous) = self.by_identity.insert(device.identity.clone(), device.handle) {
            if previous != device.handle {
                if let Some(old) = self.devices.remove(&previous) {
                    close(old, CloseReason::Duplicate);
                }
            }
        }
        self.devices.insert(device.handle, device);
    }

    /// Close one handle. Returns `false` if it was not in the set.
    pub fn close(&mut self, handle: HandleId, reason: CloseReason) -> bool {
        match self.take(handle) {
            Some(device) => {
                close(device, reason);
                true
            }
            None => false,
        }
    }

    /// Close every handle. Returns how many were closed.
    pub fn clear(&mut self, reason: CloseReason) -> usize {
        let count = self.devices.len();
        self.by_identity.clear();
        for (_, device) in self.devices.drain() {
            close(device, reason);
        }
        count
    }

    /// Close every handle at loop exit.
    pub fn release_all(&mut self) -> usize {
        self.clear(CloseReason::Shutdown)
    }

    /// Handles to pass to a multiplexed wait.
    pub fn wait_targets(&self) -> Vec<(HandleId, &dyn Device)> {
        self.devices
            .values()
            .map(|d| (d.handle, d.device.as_ref()))
            .collect()
    }
}

impl Drop for MonitoredSet {
    fn drop(&mut self) {
        if !self.devices.is_empty() {
            self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::VirtualController;

    fn controller(n: usize) -> VirtualController {
        let ctl = VirtualController::new();
        for i in 1..=n {
            ctl.add_keyboard(&format!("/dev/input/event{i}"), &format!("Keyboard {i}"));
        }
        ctl
    }

    #[test]
    fn reconcile_adopts_new_identities() {
        let ctl = controller(2);
        let mut set = MonitoredSet::new();
        let summary = set.reconcile(vec![
            ctl.monitored("/dev/input/event1"),
            ctl.monitored("/dev/input/event2"),
        ]);
        assert_eq!(summary.adopted, 2);
        assert_eq!(set.len(), 2);
        assert_eq!(ctl.live_handles(), 2);
    }

    #[test]
    fn reconcile_keeps_the_older_handle_and_closes_the_duplicate() {
        let ctl = controller(1);
        let mut set = MonitoredSet::new();
        let first = ctl.monitored("/dev/input/event1");
        let original = first.handle;
        set.reconcile(vec![first]);

        let summary = set.reconcile(vec![ctl.monitored("/dev/input/event1")]);
        assert_eq!(summary.kept, 1);
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.handle_of(&DeviceIdentity::new("/dev/input/event1")),
            Some(original)
        );
        assert_eq!(ctl.live_handles(), 1);
    }

    #[test]
    fn reconcile_closes_identities_that_disappeared() {
        let ctl = controller(2);
        let mut set = MonitoredSet::new();
        set.reconcile(vec![
            ctl.monitored("/dev/input/event1"),
            ctl.monitored("/dev/input/event2"),
        ]);

        let summary = set.reconcile(vec![ctl.monitored("/dev/input/event2")]);
        assert_eq!(summary.closed, 1);
        assert_eq!(summary.kept, 1);
        assert!(set
            .handle_of(&DeviceIdentity::new("/dev/input/event1"))
            .is_none());
        assert_eq!(ctl.live_handles(), 1);
    }

    #[test]
    fn take_and_restore_round_trip_keeps_indexes_in_sync() {
        let ctl = controller(1);
        let mut set = MonitoredSet::new();
        let device = ctl.monitored("/dev/input/event1");
        let handle = device.handle;
        set.restore(device);

        let taken = set.take(handle).unwrap();
        assert!(set.is_empty());
        assert!(set.handle_of(&taken.identity).is_none());

        set.restore(taken);
        assert_eq!(set.get(handle).unwrap().name(), "Keyboard 1");
    }

    #[test]
    fn clear_and_drop_release_every_handle() {
        let ctl = controller(3);
        let mut set = MonitoredSet::new();
        set.reconcile(vec![
            ctl.monitored("/dev/input/event1"),
            ctl.monitored("/dev/input/event2"),
        ]);
        assert_eq!(set.clear(CloseReason::MultiplexReset), 2);
        assert_eq!(ctl.live_handles(), 0);

        set.restore(ctl.monitored("/dev/input/event3"));
        drop(set);
        assert_eq!(ctl.live_handles(), 0);
    }

    #[test]
    fn wait_targets_cover_the_set() {
        let ctl = controller(2);
        let mut set = MonitoredSet::new();
        set.reconcile(vec![
            ctl.monitored("/dev/input/event1"),
            ctl.monitored("/dev/input/event2"),
        ]);
        let mut handles: Vec<HandleId> = set.wait_targets().into_iter().map(|(h, _)| h).collect();
        handles.sort();
        assert_eq!(handles.len(), 2);
        assert!(set.get(handles[0]).is_some());
    }
}
