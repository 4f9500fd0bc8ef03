//! # keyslot
//!
//! Local multiplayer keyboard registration for Linux.
//!
//! Several physical keyboards are plugged into one machine. `keyslot` watches all of them
//! from a background thread and assigns each one to a player slot in the order its first
//! key is pressed: the first keyboard to press a key becomes Player 1, the next distinct
//! keyboard Player 2, and so on until every slot is filled.
//!
//! ## Layout
//! - [`monitor`]: the background loop ([`Monitor`], [`MonitorHandle`]).
//! - [`scanner`] and [`classifier`]: discovery of keyboard-like devices.
//! - [`lifecycle`]: ownership and release of open handles.
//! - [`arbitrator`], [`state`], [`ledger`]: first-press arbitration and the slot ledger.
//! - [`notify`], [`eventbus`]: deferred delivery of updates to presentation.
//! - [`backends`]: the evdev backend and a scripted in-memory backend.
//!
//! ## Example
//! ```no_run
//! use keyslot::{notify, LinuxBackend, LogListener, Monitor, MonitorConfig, UpdateFilter};
//! use std::time::Duration;
//!
//! let (dispatcher, mut bus) = notify::channel();
//! bus.add_listener(LogListener::new(), UpdateFilter::All, None);
//!
//! let handle = Monitor::new(LinuxBackend::new(), MonitorConfig::with_slots(2), dispatcher)?
//!     .spawn()?;
//! while !handle.is_finished() {
//!     bus.pump_timeout(Duration::from_millis(100));
//! }
//! for player in handle.join()? {
//!     println!("{}", player.entry);
//! }
//! # Ok::<(), keyslot::Error>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(not(unix))]
compile_error!("keyslot reads Linux input devices and only builds on unix targets");

pub mod arbitrator;
pub mod backends;
pub mod classifier;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod filtered_listener;
pub mod ledger;
pub mod lifecycle;
pub mod logger;
pub mod metadata;
pub mod monitor;
pub mod multiplexer;
pub mod notify;
pub mod scanner;
pub mod snapshot;
pub mod state;

pub use backends::virtual_input::{VirtualBackend, VirtualController};
pub use backends::Backend;
pub use config::{IdentityPolicy, MonitorConfig};
pub use device::{Device, DeviceIdentity, HandleId, MonitoredDevice};
pub use error::{ConfigError, DeviceError, Error, LedgerError, MultiplexError, Result};
pub use event::{InputEvent, InputKind, KeyState};
pub use eventbus::{UpdateBus, UpdateFilter, UpdateListener};
pub use filtered_listener::FilteredListener;
pub use ledger::{AssignedDevice, Exclusions, LedgerEntry};
pub use logger::LogListener;
pub use metadata::DeviceMeta;
pub use monitor::{Monitor, MonitorHandle};
pub use notify::{ChannelDispatcher, Dispatcher, NullDispatcher};
pub use snapshot::{Phase, RegistrationSnapshot, RegistrationUpdate};
pub use state::SharedRegistration;

#[cfg(all(feature = "evdev-backend", target_os = "linux"))]
pub use backends::linux::LinuxBackend;
