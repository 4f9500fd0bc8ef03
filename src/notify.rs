//! Deferred notifications from the monitor thread to presentation.
//!
//! The monitor never calls into presentation code directly. After each ledger change it
//! hands a [`RegistrationUpdate`] to a [`Dispatcher`], which must only *schedule* delivery
//! on presentation's own execution context (post to a UI event loop, send on a channel,
//! ...). Dispatchers are invoked after the state lock has been released.
//!
//! [`channel`] wires the common case: a [`ChannelDispatcher`] for the monitor and an
//! [`UpdateBus`] that presentation pumps from its own loop.

use crate::eventbus::UpdateBus;
use crate::snapshot::RegistrationUpdate;
use log::debug;
use std::sync::mpsc::{self, Sender};

/// Schedules a registration update for delivery on presentation's context.
pub trait Dispatcher: Send + 'static {
    fn schedule(&self, update: RegistrationUpdate);
}

/// Any `Fn(RegistrationUpdate)` that posts into another loop can act as a dispatcher.
impl<F> Dispatcher for F
where
    F: Fn(RegistrationUpdate) + Send + 'static,
{
    fn schedule(&self, update: RegistrationUpdate) {
        self(update)
    }
}

/// Dispatcher backed by an `mpsc` channel.
#[derive(Clone, Debug)]
pub struct ChannelDispatcher {
    tx: Sender<RegistrationUpdate>,
}

impl Dispatcher for ChannelDispatcher {
    fn schedule(&self, update: RegistrationUpdate) {
        if self.tx.send(update).is_err() {
            // Presentation went away; the monitor keeps going regardless.
            debug!("registration update dropped: receiver closed");
        }
    }
}

/// Create a connected dispatcher / bus pair.
pub fn channel() -> (ChannelDispatcher, UpdateBus) {
    let (tx, rx) = mpsc::channel();
    (ChannelDispatcher { tx }, UpdateBus::new(rx))
}

/// Dispatcher that discards every update.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDispatcher;

impl Dispatcher for NullDispatcher {
    fn schedule(&self, _update: RegistrationUpdate) {}
}
