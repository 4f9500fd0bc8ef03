use crate::eventbus::UpdateListener;
use crate::snapshot::RegistrationUpdate;
use log::info;

/// A simple listener that writes every registration update to the `log` facade.
#[derive(Debug, Default)]
pub struct LogListener;

impl LogListener {
    pub fn new() -> Self {
        LogListener
    }
}

impl UpdateListener for LogListener {
    fn on_update(&mut self, update: &RegistrationUpdate) {
        info!(
            "[Registration] {} -> {} ({}/{} filled)",
            update.assigned,
            update.snapshot.phase,
            update.snapshot.entries.len(),
            update.snapshot.slots
        );
    }
}
