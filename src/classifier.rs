//! Keyboard classification.
//!
//! A device counts as keyboard-like when it advertises key events **and** at least one
//! common alphanumeric/control key. Mice, gamepads, power buttons and lid switches all
//! advertise `EV_KEY` too, but none of them expose letters, digits, space or enter.

use std::collections::BTreeSet;

pub const KEY_1: u16 = 2;
pub const KEY_ENTER: u16 = 28;
pub const KEY_A: u16 = 30;
pub const KEY_Z: u16 = 44;
pub const KEY_SPACE: u16 = 57;

/// Key codes a general-purpose keyboard is expected to expose.
pub const REFERENCE_KEYS: [u16; 5] = [KEY_A, KEY_Z, KEY_SPACE, KEY_ENTER, KEY_1];

/// What a device advertises.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Device reports `EV_KEY` events at all.
    pub key_events: bool,
    /// Key codes the device can emit.
    pub keys: BTreeSet<u16>,
}

impl Capabilities {
    /// Capabilities of a device that emits the given key codes.
    pub fn with_keys(keys: impl IntoIterator<Item = u16>) -> Self {
        Self {
            key_events: true,
            keys: keys.into_iter().collect(),
        }
    }
}

/// `true` if the device looks like a keyboard.
pub fn classify(caps: &Capabilities) -> bool {
    caps.key_events && REFERENCE_KEYS.iter().any(|k| caps.keys.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BTN_LEFT: u16 = 0x110;
    const BTN_RIGHT: u16 = 0x111;
    const KEY_POWER: u16 = 116;

    #[test]
    fn full_keyboard_qualifies() {
        let caps = Capabilities::with_keys(1..=127);
        assert!(classify(&caps));
    }

    #[test]
    fn any_single_reference_key_is_enough() {
        for key in REFERENCE_KEYS {
            assert!(classify(&Capabilities::with_keys([key])), "key {key}");
        }
    }

    #[test]
    fn mouse_buttons_do_not_qualify() {
        assert!(!classify(&Capabilities::with_keys([BTN_LEFT, BTN_RIGHT])));
    }

    #[test]
    fn power_button_does_not_qualify() {
        assert!(!classify(&Capabilities::with_keys([KEY_POWER])));
    }

    #[test]
    fn key_codes_without_key_events_do_not_qualify() {
        let caps = Capabilities {
            key_events: false,
            keys: [KEY_A].into_iter().collect(),
        };
        assert!(!classify(&caps));
    }
}
