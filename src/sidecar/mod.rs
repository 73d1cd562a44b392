//! Companion JSON files and the watcher that keeps them fresh.

mod types;
mod watcher;

pub use types::{LiveStatus, SidecarFile};
pub use watcher::{decode_live_status, SidecarWatcher};
