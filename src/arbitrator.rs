//! First-press arbitration.
//!
//! The monitor hands every batch of events read from one keyboard to
//! [`Arbitrator::arbitrate`]. The first key-down from an unassigned keyboard claims the
//! current slot; releases, auto-repeats and non-key events never do. The state lock is
//! held only for the guard-plus-transition, and the [`Dispatcher`] runs after it has been
//! released.

use crate::device::MonitoredDevice;
use crate::event::{InputEvent, InputKind, KeyState};
use crate::notify::Dispatcher;
use crate::state::SharedRegistration;
use log::{debug, info};

/// What happened to a device after its events were arbitrated.
#[derive(Debug)]
pub enum Verdict {
    /// No assignment; the device goes back into the working set.
    Retained(MonitoredDevice),
    /// The device now belongs to the ledger.
    Assigned { slot: usize, complete: bool },
}

pub struct Arbitrator {
    shared: SharedRegistration,
    dispatcher: Box<dyn Dispatcher>,
}

impl Arbitrator {
    pub fn new(shared: SharedRegistration, dispatcher: impl Dispatcher) -> Self {
        Self {
            shared,
            dispatcher: Box::new(dispatcher),
        }
    }

    pub fn registration(&self) -> &SharedRegistration {
        &self.shared
    }

    /// Arbitrate one batch read from `device`.
    ///
    /// At most one assignment happens per batch: once the device is in the ledger it is no
    /// longer ours to offer again.
    pub fn arbitrate(&self, device: MonitoredDevice, events: &[InputEvent]) -> Verdict {
        let mut device = device;
        for event in events {
            let InputKind::Key {
                code,
                state: KeyState::Pressed,
            } = event.kind
            else {
                continue;
            };
            debug!(
                "Key press detected on {} ({}): code {code}",
                device.name(),
                device.identity
            );

            let result = self.shared.lock().register(device);
            match result {
                Ok(update) => {
                    let slot = update.assigned.slot;
                    let complete = update.is_complete();
                    info!("Assigned {}", update.assigned);
                    if complete {
                        info!(
                            "Registration complete: {} slot(s) filled",
                            update.snapshot.slots
                        );
                    }
                    self.dispatcher.schedule(update);
                    return Verdict::Assigned { slot, complete };
                }
                Err(back) => {
                    debug!("{} ({}) not eligible for a slot", back.name(), back.identity);
                    device = back;
                }
            }
        }
        Verdict::Retained(device)
    }
}
