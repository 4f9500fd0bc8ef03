//! Linux evdev backend.
//!
//! Nodes come from `/dev/input/event*` and the udev alias directories; handles are
//! [`evdev::Device`]s; waiting is one [`Multiplexer`] wait over their descriptors.
//!
//! Opening event nodes usually needs membership in the `input` group (or root).

use crate::backends::{read_aliases, read_event_nodes, Alias, Backend};
use crate::classifier::Capabilities;
use crate::device::{Device, HandleId};
use crate::error::{DeviceError, MultiplexError};
use crate::event::InputEvent;
use crate::metadata::DeviceMeta;
use crate::multiplexer::Multiplexer;
use evdev::EventType;
use log::trace;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// [`Backend`] over the real input subsystem.
///
/// The poller is created on the first wait.
#[derive(Debug, Default)]
pub struct LinuxBackend {
    mux: Option<Multiplexer>,
}

impl LinuxBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for LinuxBackend {
    fn aliases(&self, dir: &Path) -> io::Result<Vec<Alias>> {
        read_aliases(dir)
    }

    fn nodes(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        read_event_nodes(dir)
    }

    fn open(&mut self, node: &Path) -> Result<Box<dyn Device>, DeviceError> {
        let inner = evdev::Device::open(node).map_err(|source| DeviceError::Open {
            path: node.to_path_buf(),
            source,
        })?;
        let name = inner.name().unwrap_or("Unknown").to_string();
        trace!("opened {} ({name})", node.display());
        Ok(Box::new(EvdevDevice {
            node: node.to_path_buf(),
            name,
            inner,
        }))
    }

    fn wait(
        &mut self,
        handles: &[(HandleId, &dyn Device)],
        timeout: Duration,
    ) -> Result<Vec<HandleId>, MultiplexError> {
        let fds: Vec<(HandleId, RawFd)> = handles
            .iter()
            .map(|(handle, dev)| (*handle, dev.raw_fd().unwrap_or(-1)))
            .collect();
        let mut mux = match self.mux.take() {
            Some(mux) => mux,
            None => Multiplexer::new()?,
        };
        let ready = mux.wait_readable(&fds, timeout);
        self.mux = Some(mux);
        ready
    }
}

/// Open evdev handle.
pub struct EvdevDevice {
    node: PathBuf,
    name: String,
    inner: evdev::Device,
}

impl Device for EvdevDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn node(&self) -> &Path {
        &self.node
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            key_events: self.inner.supported_events().contains(EventType::KEY),
            keys: self
                .inner
                .supported_keys()
                .map(|keys| keys.iter().map(|k| k.code()).collect())
                .unwrap_or_default(),
        }
    }

    fn set_nonblocking(&mut self) -> Result<(), DeviceError> {
        let fd = self.inner.as_raw_fd();
        let fail = |source| DeviceError::NonBlocking {
            path: self.node.clone(),
            source,
        };

        // Preserve existing flags; just OR in O_NONBLOCK.
        // SAFETY: `fd` belongs to `self.inner`, which is open for the whole call.
        let current = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if current < 0 {
            return Err(fail(io::Error::last_os_error()));
        }
        // SAFETY: as above.
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, current | libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(fail(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn fetch(&mut self, out: &mut Vec<InputEvent>) -> Result<(), DeviceError> {
        match self.inner.fetch_events() {
            Ok(events) => {
                out.extend(events.map(|ev| {
                    InputEvent::from_raw(ev.timestamp(), ev.event_type().0, ev.code(), ev.value())
                }));
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(source) => Err(DeviceError::Read {
                path: self.node.clone(),
                source,
            }),
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.inner.as_raw_fd())
    }

    fn metadata(&self) -> DeviceMeta {
        let id = self.inner.input_id();
        DeviceMeta {
            bus: Some(id.bus_type().0),
            vendor: Some(id.vendor()),
            product: Some(id.product()),
            version: Some(id.version()),
            phys: self.inner.physical_path().map(str::to_string),
            uniq: self.inner.unique_name().map(str::to_string),
            node: Some(self.node.display().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_a_missing_node_is_a_vanished_open_error() {
        let err = LinuxBackend::new()
            .open(Path::new("/nonexistent/keyslot/event0"))
            .err()
            .unwrap();
        assert!(matches!(err, DeviceError::Open { .. }));
        assert!(err.is_vanished());
    }

    #[test]
    fn waiting_on_nothing_returns_immediately() {
        let ready = LinuxBackend::new()
            .wait(&[], Duration::from_secs(5))
            .unwrap();
        assert!(ready.is_empty());
    }
}
