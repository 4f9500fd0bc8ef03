//! Shared registration state.
//!
//! [`RegistrationState`] is the single unit of mutual exclusion between the monitor thread
//! and presentation: the phase, the ledger and the running flag live behind one `Mutex`,
//! and [`SharedRegistration`] is the only way to reach them. There is exactly one running
//! flag per registration; `stop()` and the monitor loop observe the same cell.
//!
//! Critical sections are pure state mutation. Nothing in this module does I/O.

use crate::device::MonitoredDevice;
use crate::ledger::{AssignedDevice, AssignmentLedger, Exclusions, LedgerEntry};
use crate::snapshot::{Phase, RegistrationSnapshot, RegistrationUpdate};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Phase, ledger and running flag.
#[derive(Debug)]
pub struct RegistrationState {
    phase: Phase,
    ledger: AssignmentLedger,
    running: bool,
}

impl RegistrationState {
    pub fn new(slots: usize) -> Self {
        Self {
            phase: Phase::Registering { slot: 1 },
            ledger: AssignmentLedger::new(slots),
            running: true,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ledger(&self) -> &AssignmentLedger {
        &self.ledger
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// `true` while the monitor should keep scanning and polling.
    pub fn should_continue(&self) -> bool {
        self.running && !self.phase.is_complete()
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Transition guard plus transition: bind `device` to the current slot unless its
    /// identity or its event node is already in the ledger, or registration is complete.
    /// On rejection the device is handed back.
    pub fn register(
        &mut self,
        device: MonitoredDevice,
    ) -> Result<RegistrationUpdate, MonitoredDevice> {
        let Phase::Registering { slot } = self.phase else {
            return Err(device);
        };
        if self.ledger.contains(&device.identity) || self.ledger.holds_node(device.device.node())
        {
            return Err(device);
        }

        let assigned: LedgerEntry = match self.ledger.assign(slot, device) {
            Ok(entry) => entry,
            Err((_, device)) => return Err(device),
        };

        if slot + 1 > self.ledger.slots() {
            self.phase = Phase::Complete;
            self.running = false;
        } else {
            self.phase = Phase::Registering { slot: slot + 1 };
        }

        Ok(RegistrationUpdate {
            assigned,
            snapshot: self.snapshot(),
        })
    }

    pub fn snapshot(&self) -> RegistrationSnapshot {
        RegistrationSnapshot {
            phase: self.phase,
            slots: self.ledger.slots(),
            entries: self.ledger.entries().to_vec(),
            running: self.running,
        }
    }
}

/// Cloneable handle to one [`RegistrationState`].
#[derive(Clone, Debug)]
pub struct SharedRegistration(Arc<Mutex<RegistrationState>>);

impl SharedRegistration {
    pub fn new(slots: usize) -> Self {
        Self(Arc::new(Mutex::new(RegistrationState::new(slots))))
    }

    /// Lock the state. A poisoned lock is recovered: every mutation is a single step that
    /// leaves the state consistent.
    pub fn lock(&self) -> MutexGuard<'_, RegistrationState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> RegistrationSnapshot {
        self.lock().snapshot()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase()
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_running()
    }

    pub fn should_continue(&self) -> bool {
        self.lock().should_continue()
    }

    /// Signal the monitor to stop. Idempotent.
    pub fn stop(&self) {
        self.lock().stop();
    }

    /// Identities and nodes the scanner must skip.
    pub fn exclusions(&self) -> Exclusions {
        self.lock().ledger().exclusions()
    }

    /// Move the assigned device handles out of the shared state.
    pub fn take_devices(&self) -> Vec<AssignedDevice> {
        self.lock().ledger.take_devices()
    }

    /// `true` if both handles refer to the same state cell.
    pub fn same_as(&self, other: &SharedRegistration) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::VirtualController;
    use crate::device::DeviceIdentity;
    use std::path::Path;

    fn controller() -> VirtualController {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");
        ctl.add_keyboard("/dev/input/event2", "Keyboard B");
        ctl.add_keyboard("/dev/input/event3", "Keyboard C");
        ctl
    }

    #[test]
    fn starts_registering_slot_one() {
        let state = RegistrationState::new(2);
        assert_eq!(state.phase(), Phase::Registering { slot: 1 });
        assert!(state.should_continue());
    }

    #[test]
    fn register_advances_then_completes() {
        let ctl = controller();
        let mut state = RegistrationState::new(2);

        let first = state.register(ctl.monitored("/dev/input/event1")).unwrap();
        assert_eq!(first.assigned.slot, 1);
        assert_eq!(first.snapshot.phase, Phase::Registering { slot: 2 });
        assert!(state.is_running());

        let second = state.register(ctl.monitored("/dev/input/event2")).unwrap();
        assert_eq!(second.assigned.slot, 2);
        assert!(second.is_complete());
        assert!(!state.is_running());
        assert!(!state.should_continue());
    }

    #[test]
    fn complete_state_rejects_further_devices() {
        let ctl = controller();
        let mut state = RegistrationState::new(1);
        state.register(ctl.monitored("/dev/input/event1")).unwrap();

        let back = state.register(ctl.monitored("/dev/input/event2")).unwrap_err();
        assert_eq!(back.identity.as_str(), "/dev/input/event2");
        assert_eq!(state.ledger().len(), 1);
    }

    #[test]
    fn assigned_identity_is_rejected_without_advancing() {
        let ctl = controller();
        let mut state = RegistrationState::new(3);
        state.register(ctl.monitored("/dev/input/event1")).unwrap();

        assert!(state.register(ctl.monitored("/dev/input/event1")).is_err());
        assert_eq!(state.phase(), Phase::Registering { slot: 2 });
        assert_eq!(state.ledger().len(), 1);
    }

    #[test]
    fn node_held_under_another_identity_is_rejected() {
        let ctl = controller();
        let mut state = RegistrationState::new(3);
        state.register(ctl.monitored("/dev/input/event1")).unwrap();

        let mut aliased = ctl.monitored("/dev/input/event1");
        aliased.identity = DeviceIdentity::new("/dev/input/by-id/usb-Acme-event-kbd");
        assert!(state.register(aliased).is_err());
        assert_eq!(state.phase(), Phase::Registering { slot: 2 });

        let shared = SharedRegistration(Arc::new(Mutex::new(state)));
        assert!(shared
            .exclusions()
            .nodes
            .contains(Path::new("/dev/input/event1")));
    }

    #[test]
    fn stop_is_visible_through_every_clone() {
        let shared = SharedRegistration::new(2);
        let other = shared.clone();
        assert!(shared.same_as(&other));

        other.stop();
        assert!(!shared.is_running());
        assert!(!shared.should_continue());
        // Stopping does not touch the phase.
        assert_eq!(shared.phase(), Phase::Registering { slot: 1 });
    }

    #[test]
    fn stop_is_visible_across_threads() {
        let shared = SharedRegistration::new(2);
        let remote = shared.clone();
        std::thread::spawn(move || remote.stop()).join().unwrap();
        assert!(!shared.is_running());
    }
}
