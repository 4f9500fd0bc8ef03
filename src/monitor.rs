//! The monitor loop.
//!
//! [`Monitor`] owns a [`Backend`], the working set of unassigned keyboards and an
//! [`Arbitrator`]. [`Monitor::spawn`] runs it on a dedicated thread and returns a
//! [`MonitorHandle`] for stopping and joining.
//!
//! One cycle:
//!
//! 1. Check the running flag and the phase.
//! 2. Rescan when the rescan interval has elapsed, the set is empty, or a previous cycle
//!    lost a handle, and reconcile the result into the working set.
//! 3. With nothing to watch, pause for the idle backoff and start over.
//! 4. Wait (bounded by the poll timeout) for any handle to become readable. A stale
//!    handle discards the whole set and pauses for the error backoff.
//! 5. Read each ready handle and arbitrate its events. A read failure drops only that
//!    handle.
//!
//! Every handle still open when the loop exits is closed before the thread finishes.

use crate::arbitrator::{Arbitrator, Verdict};
use crate::backends::Backend;
use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::event::InputEvent;
use crate::ledger::AssignedDevice;
use crate::lifecycle::{self, CloseReason, MonitoredSet};
use crate::notify::Dispatcher;
use crate::scanner::{DropLog, Scanner};
use crate::state::SharedRegistration;
use log::{debug, info, warn};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Keyboard registration monitor over a backend `B`.
pub struct Monitor<B: Backend> {
    backend: B,
    config: MonitorConfig,
    scanner: Scanner,
    arbitrator: Arbitrator,
    shared: SharedRegistration,
}

impl<B: Backend> Monitor<B> {
    /// Validate `config` and build a monitor. Nothing is opened until [`run`](Self::run).
    pub fn new(backend: B, config: MonitorConfig, dispatcher: impl Dispatcher) -> Result<Self> {
        config.validate()?;
        let shared = SharedRegistration::new(config.slots);
        Ok(Self {
            backend,
            scanner: Scanner::new(&config),
            arbitrator: Arbitrator::new(shared.clone(), dispatcher),
            shared,
            config,
        })
    }

    /// Handle on the registration state this monitor drives.
    pub fn registration(&self) -> SharedRegistration {
        self.shared.clone()
    }

    /// Run the loop on a thread named `keyslot-monitor`.
    pub fn spawn(self) -> Result<MonitorHandle> {
        let shared = self.shared.clone();
        let thread = thread::Builder::new()
            .name("keyslot-monitor".into())
            .spawn(move || self.run())
            .map_err(Error::Spawn)?;
        Ok(MonitorHandle {
            shared,
            thread: Some(thread),
        })
    }

    /// Run the loop on the calling thread until registration completes or is stopped.
    pub fn run(mut self) {
        info!(
            "Keyboard registration started: {} slot(s)",
            self.config.slots
        );

        let mut set = MonitoredSet::new();
        let mut drops = DropLog::new();
        let mut events: Vec<InputEvent> = Vec::new();
        let mut last_scan: Option<Instant> = None;

        loop {
            let excluded = {
                let state = self.shared.lock();
                if !state.should_continue() {
                    break;
                }
                state.ledger().exclusions()
            };

            let scan_due = last_scan.map_or(true, |at| at.elapsed() >= self.config.rescan_interval());
            if scan_due || set.is_empty() {
                let outcome = self.scanner.scan(&mut self.backend, &excluded);
                drops.record(&outcome);
                let summary = set.reconcile(outcome.devices);
                if summary.adopted > 0 || summary.closed > 0 {
                    debug!(
                        "working set: {} adopted, {} kept, {} closed, {} watched",
                        summary.adopted,
                        summary.kept,
                        summary.closed,
                        set.len()
                    );
                }
                last_scan = Some(Instant::now());
            }

            if set.is_empty() {
                debug!("no unassigned keyboards; retrying in {:?}", self.config.idle_backoff());
                self.pause(self.config.idle_backoff());
                continue;
            }

            let waited = {
                let targets = set.wait_targets();
                self.backend.wait(&targets, self.config.poll_timeout())
            };
            let ready = match waited {
                Ok(ready) => ready,
                Err(e) => {
                    warn!("{e}; discarding {} handle(s) and rescanning", set.len());
                    set.clear(CloseReason::MultiplexReset);
                    last_scan = None;
                    self.pause(self.config.error_backoff());
                    continue;
                }
            };

            // Stopped or completed while waiting: do not touch the handles.
            if !self.shared.should_continue() {
                break;
            }

            for handle in ready {
                let Some(mut device) = set.take(handle) else {
                    continue;
                };
                events.clear();
                if let Err(e) = device.device.fetch(&mut events) {
                    if e.is_vanished() {
                        warn!("{} ({}) disconnected", device.name(), device.identity);
                    } else {
                        warn!("{e}");
                    }
                    lifecycle::close(device, CloseReason::ReadError);
                    last_scan = None;
                    continue;
                }
                if events.is_empty() {
                    set.restore(device);
                    continue;
                }

                match self.arbitrator.arbitrate(device, &events) {
                    Verdict::Retained(device) => set.restore(device),
                    Verdict::Assigned { complete: true, .. } => break,
                    Verdict::Assigned { .. } => {}
                }
            }
        }

        let released = set.release_all();
        info!(
            "Keyboard registration finished ({}); released {released} handle(s)",
            self.shared.phase()
        );
    }

    /// Sleep up to `total` in poll-timeout steps, returning early once stopped.
    fn pause(&self, total: Duration) {
        let step = self.config.poll_timeout();
        let deadline = Instant::now() + total;
        while self.shared.should_continue() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(step.min(deadline - now));
        }
    }
}

/// Owner-side handle on a spawned [`Monitor`].
///
/// Dropping the handle without joining stops the monitor and waits for its thread.
#[derive(Debug)]
pub struct MonitorHandle {
    shared: SharedRegistration,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Ask the monitor to stop. It notices within one poll timeout.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn registration(&self) -> &SharedRegistration {
        &self.shared
    }

    /// Wait for the monitor thread and take the devices assigned to each slot, in slot
    /// order. Does not stop the monitor; call [`stop`](Self::stop) first to end early.
    pub fn join(mut self) -> Result<Vec<AssignedDevice>> {
        if let Some(thread) = self.thread.take() {
            thread.join().map_err(|_| Error::MonitorPanicked)?;
        }
        Ok(self.shared.take_devices())
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shared.stop();
            if thread.join().is_err() {
                warn!("keyboard monitor thread panicked");
            }
        }
    }
}
