//! Input backends for `keyslot`.
//!
//! A [`Backend`] is everything the monitor needs from the OS: directory listings for the
//! alias namespace and the raw event nodes, opening a node as a [`Device`], and one
//! bounded wait across many open handles.
//!
//! # Feature flags
//! - **`evdev-backend`**: enables [`linux::LinuxBackend`] (Linux only, default).
//!
//! [`virtual_input::VirtualBackend`] is always available; it drives the monitor from
//! scripted in-memory devices and is what the test-suite and the `simulate` demo use.

use crate::device::{Device, HandleId};
use crate::error::{DeviceError, MultiplexError};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(all(feature = "evdev-backend", target_os = "linux"))]
#[cfg_attr(docsrs, doc(cfg(all(feature = "evdev-backend", target_os = "linux"))))]
pub mod linux;

pub mod virtual_input;

/// A persistent alias and the event node it resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alias {
    pub alias: PathBuf,
    pub target: PathBuf,
}

/// OS access used by the scanner and the monitor loop.
pub trait Backend: Send + 'static {
    /// Aliases found in `dir`. A missing directory yields an empty list.
    fn aliases(&self, dir: &Path) -> io::Result<Vec<Alias>>;

    /// Event nodes found in `dir`.
    fn nodes(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Open `node`.
    fn open(&mut self, node: &Path) -> Result<Box<dyn Device>, DeviceError>;

    /// Block up to `timeout` until at least one handle is readable; return the ready ones.
    fn wait(
        &mut self,
        handles: &[(HandleId, &dyn Device)],
        timeout: Duration,
    ) -> Result<Vec<HandleId>, MultiplexError>;
}

/// `true` for `eventN` nodes; `mouseN`, `jsN`, `by-id`, ... are not event nodes.
pub fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("event"))
}

/// List symlinks in `dir` with their canonical targets.
///
/// Entries that cannot be resolved (dangling links, races with unplug) are skipped.
pub fn read_aliases(dir: &Path) -> io::Result<Vec<Alias>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("alias directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut out = Vec::new();
    for entry in entries {
        let alias = entry?.path();
        match fs::canonicalize(&alias) {
            Ok(target) => out.push(Alias { alias, target }),
            Err(e) => debug!("skipping unresolvable alias {}: {e}", alias.display()),
        }
    }
    out.sort_by(|a, b| a.alias.cmp(&b.alias));
    Ok(out)
}

/// List `event*` nodes directly inside `dir`, sorted.
pub fn read_event_nodes(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_event_node(&path) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
