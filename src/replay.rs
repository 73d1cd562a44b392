//! Initial replay sequencing: before any watcher is armed, the
//! newest journal is read and published in full, every sidecar present on
//! disk is read once, and only then does live tailing begin. Doing it in
//! this order means a subscriber that connects right after startup sees a
//! state that already reflects everything on disk, with no event able to
//! arrive twice.

use crate::error::Result;
use crate::journal::Event;
use crate::sidecar::SidecarWatcher;
use crate::tailer::JournalTailer;

/// Runs the replay and returns the events read from the newest journal, so
/// the caller can also forward them as a single `journal:batch` envelope.
pub async fn run_initial_replay(tailer: &JournalTailer, sidecar: &SidecarWatcher) -> Result<Vec<Event>> {
    let replayed = tailer.read_initial().await?;
    sidecar.read_all_initial().await;
    Ok(replayed)
}
