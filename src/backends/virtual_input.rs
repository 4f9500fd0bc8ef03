//! Scripted in-memory backend.
//!
//! [`VirtualController`] owns a set of fake input nodes. Tests and demos use it to plug
//! keyboards in, type on them, yank them out mid-session, make opens fail, or poison the
//! next multiplexed wait, and then observe how many handles the monitor opened and still
//! holds. [`VirtualBackend`] is the [`Backend`] view of the same nodes.
//!
//! Each node has one event queue shared by every handle opened on it, and a generation
//! counter bumped on replug so handles from before an unplug keep failing afterwards.

use crate::backends::{Alias, Backend};
use crate::classifier::{Capabilities, REFERENCE_KEYS};
use crate::device::{Device, DeviceIdentity, HandleId, MonitoredDevice};
use crate::error::{DeviceError, MultiplexError};
use crate::event::{InputEvent, KeyState};
use crate::metadata::DeviceMeta;
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const BTN_LEFT: u16 = 0x110;
const BTN_RIGHT: u16 = 0x111;

struct VirtualNode {
    name: String,
    caps: Capabilities,
    aliases: Vec<PathBuf>,
    present: bool,
    generation: u64,
    queue: VecDeque<InputEvent>,
    failing_opens: usize,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<PathBuf, VirtualNode>,
    opens: usize,
    live: usize,
    invalidate_next_wait: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    changed: Condvar,
}

/// Test/demo handle on a set of virtual input nodes. Cheap to clone.
#[derive(Clone)]
pub struct VirtualController {
    shared: Arc<Shared>,
}

impl Default for VirtualController {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualController {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                changed: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn with_node(&self, node: &str, f: impl FnOnce(&mut VirtualNode)) {
        let mut inner = self.lock();
        if let Some(n) = inner.nodes.get_mut(Path::new(node)) {
            f(n);
        }
        drop(inner);
        self.shared.changed.notify_all();
    }

    /// [`Backend`] over these nodes.
    pub fn backend(&self) -> VirtualBackend {
        VirtualBackend { ctl: self.clone() }
    }

    /// Plug in a device with arbitrary capabilities at `node`.
    pub fn add_device(&self, node: &str, name: &str, caps: Capabilities) {
        self.lock().nodes.insert(
            PathBuf::from(node),
            VirtualNode {
                name: name.to_string(),
                caps,
                aliases: Vec::new(),
                present: true,
                generation: 0,
                queue: VecDeque::new(),
                failing_opens: 0,
            },
        );
        self.shared.changed.notify_all();
    }

    /// Plug in a keyboard at `node`.
    pub fn add_keyboard(&self, node: &str, name: &str) {
        self.add_device(node, name, Capabilities::with_keys(REFERENCE_KEYS));
    }

    /// Plug in a two-button mouse at `node`.
    pub fn add_mouse(&self, node: &str, name: &str) {
        self.add_device(node, name, Capabilities::with_keys([BTN_LEFT, BTN_RIGHT]));
    }

    /// Add a persistent alias (e.g. `/dev/input/by-id/usb-...-event-kbd`) for `node`.
    pub fn add_alias(&self, node: &str, alias: &str) {
        self.with_node(node, |n| n.aliases.push(PathBuf::from(alias)));
    }

    /// Queue an event on `node`.
    pub fn inject(&self, node: &str, event: InputEvent) {
        self.with_node(node, |n| {
            if n.present {
                n.queue.push_back(event);
            }
        });
    }

    pub fn press(&self, node: &str, code: u16) {
        self.inject(node, InputEvent::key(code, KeyState::Pressed));
    }

    pub fn release(&self, node: &str, code: u16) {
        self.inject(node, InputEvent::key(code, KeyState::Released));
    }

    pub fn repeat(&self, node: &str, code: u16) {
        self.inject(node, InputEvent::key(code, KeyState::Repeat));
    }

    /// Disconnect `node`: pending events are lost and every open handle starts failing.
    pub fn unplug(&self, node: &str) {
        self.with_node(node, |n| {
            n.present = false;
            n.queue.clear();
        });
    }

    /// Reconnect `node`. Handles opened before the unplug stay broken.
    pub fn replug(&self, node: &str) {
        self.with_node(node, |n| {
            n.present = true;
            n.generation += 1;
        });
    }

    /// Make the next `count` opens of `node` fail with permission denied.
    pub fn fail_opens(&self, node: &str, count: usize) {
        self.with_node(node, |n| n.failing_opens = count);
    }

    /// Make the next multiplexed wait report a stale handle.
    pub fn invalidate_next_wait(&self) {
        self.lock().invalidate_next_wait = true;
        self.shared.changed.notify_all();
    }

    /// Successful opens so far.
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Handles currently open (opened and not yet dropped).
    pub fn live_handles(&self) -> usize {
        self.lock().live
    }

    /// Events still queued on `node`.
    pub fn pending(&self, node: &str) -> usize {
        self.lock()
            .nodes
            .get(Path::new(node))
            .map_or(0, |n| n.queue.len())
    }

    /// Open `node` directly and wrap it as a monitored device whose identity is the node
    /// path. Panics if the node cannot be opened; meant for tests.
    pub fn monitored(&self, node: &str) -> MonitoredDevice {
        let device = self
            .backend()
            .open(Path::new(node))
            .unwrap_or_else(|e| panic!("virtual open of {node} failed: {e}"));
        MonitoredDevice {
            handle: HandleId::next(),
            identity: DeviceIdentity::new(node),
            device,
        }
    }
}

/// [`Backend`] implementation over a [`VirtualController`].
#[derive(Clone)]
pub struct VirtualBackend {
    ctl: VirtualController,
}

impl Backend for VirtualBackend {
    fn aliases(&self, dir: &Path) -> io::Result<Vec<Alias>> {
        let inner = self.ctl.lock();
        let mut out: Vec<Alias> = inner
            .nodes
            .iter()
            .filter(|(_, n)| n.present)
            .flat_map(|(node, n)| {
                n.aliases
                    .iter()
                    .filter(|a| a.parent() == Some(dir))
                    .map(move |a| Alias {
                        alias: a.clone(),
                        target: node.clone(),
                    })
            })
            .collect();
        out.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(out)
    }

    fn nodes(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let inner = self.ctl.lock();
        Ok(inner
            .nodes
            .iter()
            .filter(|(node, n)| n.present && node.parent() == Some(dir))
            .map(|(node, _)| node.clone())
            .collect())
    }

    fn open(&mut self, node: &Path) -> Result<Box<dyn Device>, DeviceError> {
        let mut inner = self.ctl.lock();
        let open_error = |kind: io::ErrorKind| DeviceError::Open {
            path: node.to_path_buf(),
            source: io::Error::from(kind),
        };

        let Some(n) = inner.nodes.get_mut(node) else {
            return Err(open_error(io::ErrorKind::NotFound));
        };
        if !n.present {
            return Err(open_error(io::ErrorKind::NotFound));
        }
        if n.failing_opens > 0 {
            n.failing_opens -= 1;
            return Err(open_error(io::ErrorKind::PermissionDenied));
        }

        let device = VirtualDevice {
            ctl: self.ctl.clone(),
            node: node.to_path_buf(),
            name: n.name.clone(),
            caps: n.caps.clone(),
            generation: n.generation,
            nonblocking: false,
        };
        inner.opens += 1;
        inner.live += 1;
        Ok(Box::new(device))
    }

    fn wait(
        &mut self,
        handles: &[(HandleId, &dyn Device)],
        timeout: Duration,
    ) -> Result<Vec<HandleId>, MultiplexError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.ctl.lock();
        loop {
            if inner.invalidate_next_wait {
                inner.invalidate_next_wait = false;
                let handle = handles.first().map_or(0, |(h, _)| h.get());
                return Err(MultiplexError::Invalidated { handle });
            }

            let ready: Vec<HandleId> = handles
                .iter()
                .filter(|(_, dev)| {
                    inner
                        .nodes
                        .get(dev.node())
                        .map_or(true, |n| !n.present || !n.queue.is_empty())
                })
                .map(|(h, _)| *h)
                .collect();
            if !ready.is_empty() {
                return Ok(ready);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            inner = self
                .ctl
                .shared
                .changed
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Handle on a virtual node.
pub struct VirtualDevice {
    ctl: VirtualController,
    node: PathBuf,
    name: String,
    caps: Capabilities,
    generation: u64,
    nonblocking: bool,
}

impl VirtualDevice {
    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }
}

impl Device for VirtualDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn node(&self) -> &Path {
        &self.node
    }

    fn capabilities(&self) -> Capabilities {
        self.caps.clone()
    }

    fn set_nonblocking(&mut self) -> Result<(), DeviceError> {
        self.nonblocking = true;
        Ok(())
    }

    fn fetch(&mut self, out: &mut Vec<InputEvent>) -> Result<(), DeviceError> {
        let mut inner = self.ctl.lock();
        match inner.nodes.get_mut(&self.node) {
            Some(n) if n.present && n.generation == self.generation => {
                out.extend(n.queue.drain(..));
                Ok(())
            }
            _ => Err(DeviceError::Read {
                path: self.node.clone(),
                source: io::Error::from_raw_os_error(libc::ENODEV),
            }),
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }

    fn metadata(&self) -> DeviceMeta {
        DeviceMeta {
            bus: Some(0x06), // BUS_VIRTUAL
            node: Some(self.node.display().to_string()),
            ..DeviceMeta::default()
        }
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        let mut inner = self.ctl.lock();
        inner.live = inner.live.saturating_sub(1);
    }
}
