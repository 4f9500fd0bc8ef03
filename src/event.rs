//! Events read from device handles.
//!
//! Backends translate whatever the OS hands them into [`InputEvent`]s: a timestamp plus a
//! decoded [`InputKind`]. Only key events carry meaning for arbitration; everything else
//! (sync reports, scan codes, LEDs, ...) is kept as [`InputKind::Other`] so diagnostics
//! can still see it.
//!
//! ## Value conventions
//! Linux `EV_KEY` values are `0` = released, `1` = pressed, `2` = auto-repeat. Any other
//! value on a key event is not a key transition and decodes as `Other`.

use std::time::SystemTime;

/// `EV_KEY` event type tag.
pub const EV_KEY: u16 = 0x01;

/// State carried by a key event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyState {
    Released,
    Pressed,
    Repeat,
}

impl KeyState {
    /// Decode an `EV_KEY` value.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyState::Released),
            1 => Some(KeyState::Pressed),
            2 => Some(KeyState::Repeat),
            _ => None,
        }
    }
}

/// Decoded event payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// A key transition.
    Key { code: u16, state: KeyState },

    /// Anything that is not a key transition, as the raw `(type, code, value)` triple.
    Other { type_tag: u16, code: u16, value: i32 },
}

/// Timestamped event read from a device handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputEvent {
    /// Kernel timestamp (or injection time for virtual devices).
    pub at: SystemTime,
    /// The decoded event.
    pub kind: InputKind,
}

impl InputEvent {
    /// Decode a raw `(type, code, value)` triple.
    pub fn from_raw(at: SystemTime, type_tag: u16, code: u16, value: i32) -> Self {
        let kind = match (type_tag, KeyState::from_value(value)) {
            (EV_KEY, Some(state)) => InputKind::Key { code, state },
            _ => InputKind::Other {
                type_tag,
                code,
                value,
            },
        };
        Self { at, kind }
    }

    /// Key event with `state`, stamped now.
    pub fn key(code: u16, state: KeyState) -> Self {
        Self {
            at: SystemTime::now(),
            kind: InputKind::Key { code, state },
        }
    }

    /// `true` only for a genuine key-down (not release, not auto-repeat).
    pub fn is_key_press(&self) -> bool {
        matches!(
            self.kind,
            InputKind::Key {
                state: KeyState::Pressed,
                ..
            }
        )
    }
}
