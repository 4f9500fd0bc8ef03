//! Register real keyboards to player slots.
//!
//! Usage: `cargo run --example register -- [SLOTS | CONFIG.toml]`
//!
//! Needs read access to `/dev/input/event*` (the `input` group, usually).

use anyhow::Context;
use keyslot::{
    notify, LinuxBackend, LogListener, Monitor, MonitorConfig, RegistrationUpdate,
    UpdateFilter, UpdateListener,
};
use std::time::Duration;

/// Prints the prompt for whatever comes next.
struct Console;

impl UpdateListener for Console {
    fn on_update(&mut self, update: &RegistrationUpdate) {
        println!("{}", update.assigned);
        println!("{}", update.snapshot.prompt());
    }
}

fn config_from_args() -> anyhow::Result<MonitorConfig> {
    match std::env::args().nth(1) {
        None => Ok(MonitorConfig::default()),
        Some(arg) => match arg.parse::<usize>() {
            Ok(slots) => Ok(MonitorConfig::with_slots(slots)),
            Err(_) => MonitorConfig::load(&arg).with_context(|| format!("loading {arg}")),
        },
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = config_from_args()?;
    let (dispatcher, mut bus) = notify::channel();
    bus.add_listener(Console, UpdateFilter::All, None);
    bus.add_listener(LogListener::new(), UpdateFilter::Completion, None);

    let handle = Monitor::new(LinuxBackend::new(), config, dispatcher)?.spawn()?;
    println!("{}", handle.registration().snapshot().prompt());

    while !handle.is_finished() {
        bus.pump_timeout(Duration::from_millis(100));
    }
    bus.pump();

    let players = handle.join()?;
    let entries: Vec<_> = players.iter().map(|p| &p.entry).collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    for player in &players {
        println!("{} -> {}", player.entry, player.device.metadata());
    }
    Ok(())
}
