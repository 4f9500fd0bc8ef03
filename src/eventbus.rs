use crate::snapshot::RegistrationUpdate;
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Trait for reacting to registration updates on the presentation thread.
pub trait UpdateListener {
    fn on_update(&mut self, update: &RegistrationUpdate);
}

/// Determines which updates a listener wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateFilter {
    All,
    /// Only updates that leave registration in progress.
    SlotFilled,
    /// Only the update that completes registration.
    Completion,
    Custom(fn(&RegistrationUpdate) -> bool),
}

/// Metadata-wrapped listener with filters and control flags.
struct ListenerEntry {
    listener: Box<dyn UpdateListener>,
    enabled: bool,
    filter: UpdateFilter,
    slot: Option<usize>, // only updates assigning this slot
}

/// Presentation-side end of a [`channel`](crate::notify::channel).
///
/// Updates queue up until the owning loop calls [`pump`](Self::pump) or
/// [`pump_timeout`](Self::pump_timeout); listeners always run on that loop's thread.
pub struct UpdateBus {
    rx: Receiver<RegistrationUpdate>,
    next_id: u64,
    listeners: HashMap<u64, ListenerEntry>,
    last: Option<RegistrationUpdate>,
    disconnected: bool,
}

impl UpdateBus {
    pub(crate) fn new(rx: Receiver<RegistrationUpdate>) -> Self {
        Self {
            rx,
            next_id: 0,
            listeners: HashMap::new(),
            last: None,
            disconnected: false,
        }
    }

    /// Registers a listener with optional filtering and slot tag.
    pub fn add_listener(
        &mut self,
        listener: impl UpdateListener + 'static,
        filter: UpdateFilter,
        slot: Option<usize>,
    ) -> u64 {
        let id = self.next_id;
        self.listeners.insert(
            id,
            ListenerEntry {
                listener: Box::new(listener),
                enabled: true,
                filter,
                slot,
            },
        );
        self.next_id += 1;
        id
    }

    /// Enables a previously registered listener.
    pub fn enable(&mut self, id: u64) {
        if let Some(entry) = self.listeners.get_mut(&id) {
            entry.enabled = true;
        }
    }

    /// Disables (mutes) a listener without removing it.
    pub fn disable(&mut self, id: u64) {
        if let Some(entry) = self.listeners.get_mut(&id) {
            entry.enabled = false;
        }
    }

    /// Unregisters a listener entirely.
    pub fn remove_listener(&mut self, id: u64) {
        self.listeners.remove(&id);
    }

    /// Most recent update delivered by this bus.
    pub fn last(&self) -> Option<&RegistrationUpdate> {
        self.last.as_ref()
    }

    /// `true` once every dispatcher has been dropped and the queue is drained.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Delivers every queued update without blocking. Returns how many were delivered.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            match self.rx.try_recv() {
                Ok(update) => {
                    self.emit(update);
                    delivered += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        delivered
    }

    /// Waits up to `timeout` for the first update, then delivers everything queued.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(update) => {
                self.emit(update);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => {
                self.disconnected = true;
                0
            }
        }
    }

    /// Emits one update to all active and matching listeners.
    fn emit(&mut self, update: RegistrationUpdate) {
        for entry in self.listeners.values_mut() {
            if !entry.enabled {
                continue;
            }

            // If tagged, ensure this listener wants this slot
            if let Some(slot) = entry.slot {
                if update.assigned.slot != slot {
                    continue;
                }
            }

            let passes_filter = match entry.filter {
                UpdateFilter::All => true,
                UpdateFilter::SlotFilled => !update.is_complete(),
                UpdateFilter::Completion => update.is_complete(),
                UpdateFilter::Custom(f) => f(&update),
            };

            if passes_filter {
                entry.listener.on_update(&update);
            }
        }
        self.last = Some(update);
    }
}
