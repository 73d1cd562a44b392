//! Process-environment-derived tunables.
//!
//! A `lazy_static! { pub static ref CONFIG }`: a single process-wide,
//! lazily-computed snapshot of env vars. This is the one piece of global
//! state in the crate; the game-state root itself is never global (see
//! [`crate::core::Core`]).

use lazy_static::lazy_static;
use std::time::Duration;

pub struct Config {
    /// Debounce before reading a newly-created journal file, to let the game
    /// flush its header events first.
    pub new_journal_debounce: Duration,
    /// "Await write finish" stability window for sidecar files.
    pub sidecar_stability_window: Duration,
    /// Poll cadence while waiting for a sidecar file to stabilize.
    pub sidecar_poll_interval: Duration,
    /// Stability window for the high-frequency live-status sidecar.
    pub live_status_stability_window: Duration,
    pub live_status_poll_interval: Duration,
    /// Stability window applied before reading appended journal bytes.
    pub journal_stability_window: Duration,
    /// Per-topic subscriber cap on the event bus, logged as a warning if exceeded.
    pub bus_listener_cap: usize,
    /// Per-subscriber channel capacity on the broadcast fabric.
    pub broadcast_channel_capacity: usize,
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

lazy_static! {
    pub static ref CONFIG: Config = Config {
        new_journal_debounce: env_millis("PIONEER_NEW_JOURNAL_DEBOUNCE_MS", 200),
        sidecar_stability_window: env_millis("PIONEER_SIDECAR_STABILITY_MS", 100),
        sidecar_poll_interval: env_millis("PIONEER_SIDECAR_POLL_MS", 50),
        live_status_stability_window: env_millis("PIONEER_STATUS_STABILITY_MS", 50),
        live_status_poll_interval: env_millis("PIONEER_STATUS_POLL_MS", 25),
        journal_stability_window: env_millis("PIONEER_JOURNAL_STABILITY_MS", 100),
        bus_listener_cap: env_usize("PIONEER_BUS_LISTENER_CAP", 100),
        broadcast_channel_capacity: env_usize("PIONEER_BROADCAST_CAPACITY", 1024),
    };
}
