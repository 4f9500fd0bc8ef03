//! Owned views of registration progress.
//!
//! [`RegistrationSnapshot`] is an **owned**, read-only copy of the shared registration
//! state taken under its lock. It's what crosses from the monitor thread to presentation:
//! the presentation side never touches the shared state or any device handle.
//!
//! # Semantics
//! - `entries` lists filled slots in slot order.
//! - A snapshot is **immutable**; a newer one arrives with the next
//!   [`RegistrationUpdate`].

use crate::ledger::LedgerEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the registration state machine is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for a key press to fill `slot` (1-based).
    Registering { slot: usize },
    /// Every slot is filled; the ledger is frozen.
    Complete,
}

impl Phase {
    pub fn is_complete(self) -> bool {
        matches!(self, Phase::Complete)
    }

    /// Slot currently being filled.
    pub fn slot(self) -> Option<usize> {
        match self {
            Phase::Registering { slot } => Some(slot),
            Phase::Complete => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Registering { slot } => write!(f, "registering player {slot}"),
            Phase::Complete => f.write_str("complete"),
        }
    }
}

/// Owned copy of the registration state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSnapshot {
    pub phase: Phase,
    /// Total number of slots.
    pub slots: usize,
    /// Filled slots in slot order.
    pub entries: Vec<LedgerEntry>,
    /// `false` once the monitor has been told to stop or has completed.
    pub running: bool,
}

impl RegistrationSnapshot {
    /// Entry for `slot`, if filled.
    #[inline]
    pub fn entry(&self, slot: usize) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.slot == slot)
    }

    /// Human-facing prompt for the current phase, one line per filled slot once complete.
    pub fn prompt(&self) -> String {
        match self.phase {
            Phase::Registering { slot } => {
                format!("Player {slot}: Press any key on your keyboard to register it.")
            }
            Phase::Complete => {
                let mut out = String::from("All keyboards registered!\n");
                for entry in &self.entries {
                    out.push_str(&entry.to_string());
                    out.push('\n');
                }
                out
            }
        }
    }
}

/// Notification scheduled after every ledger change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationUpdate {
    /// Slot that was just filled.
    pub assigned: LedgerEntry,
    /// State right after the assignment.
    pub snapshot: RegistrationSnapshot,
}

impl RegistrationUpdate {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.snapshot.phase.is_complete()
    }
}
