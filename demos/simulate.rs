//! Registration against scripted virtual keyboards. Runs anywhere, no permissions needed.

use keyslot::classifier::{KEY_A, KEY_ENTER, KEY_SPACE};
use keyslot::{
    notify, LogListener, Monitor, MonitorConfig, RegistrationUpdate, UpdateFilter,
    UpdateListener, VirtualController,
};
use std::thread;
use std::time::Duration;

struct Console;

impl UpdateListener for Console {
    fn on_update(&mut self, update: &RegistrationUpdate) {
        println!("{}", update.snapshot.prompt());
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let ctl = VirtualController::new();
    ctl.add_keyboard("/dev/input/event3", "AT Translated Set 2 keyboard");
    ctl.add_keyboard("/dev/input/event7", "Acme USB Keyboard");
    ctl.add_alias("/dev/input/event7", "/dev/input/by-id/usb-Acme_USB_Keyboard-event-kbd");
    ctl.add_mouse("/dev/input/event9", "Logitech Mouse");
    ctl.add_keyboard("/dev/input/event12", "Bluetooth Keyboard");

    let (dispatcher, mut bus) = notify::channel();
    bus.add_listener(Console, UpdateFilter::All, None);
    bus.add_listener(LogListener::new(), UpdateFilter::All, None);

    let handle = Monitor::new(ctl.backend(), MonitorConfig::with_slots(3), dispatcher)?.spawn()?;
    println!("{}", handle.registration().snapshot().prompt());

    let script = ctl.clone();
    let typist = thread::spawn(move || {
        let pause = || thread::sleep(Duration::from_millis(300));
        pause();
        script.press("/dev/input/event7", KEY_A);
        script.release("/dev/input/event7", KEY_A);
        pause();
        // Already Player 1: ignored.
        script.press("/dev/input/event7", KEY_SPACE);
        pause();
        script.press("/dev/input/event3", KEY_ENTER);
        pause();
        script.unplug("/dev/input/event12");
        pause();
        script.replug("/dev/input/event12");
        pause();
        script.press("/dev/input/event12", KEY_SPACE);
    });

    while !handle.is_finished() {
        bus.pump_timeout(Duration::from_millis(100));
    }
    bus.pump();
    typist
        .join()
        .map_err(|_| anyhow::anyhow!("script thread panicked"))?;

    for player in handle.join()? {
        println!("{}", player.entry);
    }
    println!("handles still open: {}", ctl.live_handles());
    Ok(())
}
