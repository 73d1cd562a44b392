//! The public façade: everything a caller needs to run the core and read
//! its state, without touching the bus/projector/tailer/watcher machinery
//! directly. One struct that owns its workers and exposes plain getters
//! plus a handful of subscribe methods, never a global.

use crate::broadcast::{BroadcastFabric, Token as BroadcastToken, TopicFilter};
use crate::bus::{EventBus, LifecycleEvent, Token as BusToken};
use crate::journal::Event;
use crate::replay;
use crate::sidecar::{SidecarFile, SidecarWatcher};
use crate::state::{GameState, StateProjector};
use crate::tailer::JournalTailer;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Core {
    bus: Arc<EventBus>,
    projector: Arc<StateProjector>,
    broadcast: Arc<BroadcastFabric>,
    tailer: JournalTailer,
    sidecar: SidecarWatcher,
    session_timer: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Core {
    pub fn new(journal_dir: PathBuf) -> Core {
        let bus = Arc::new(EventBus::new());
        let broadcast = Arc::new(BroadcastFabric::new());
        let projector = StateProjector::new(bus.clone(), broadcast.clone());
        projector.install();

        wire_bus_to_broadcast(&bus, &broadcast);

        let tailer = JournalTailer::new(journal_dir.clone(), bus.clone());
        let sidecar = SidecarWatcher::new(journal_dir, bus.clone());

        Core {
            bus,
            projector,
            broadcast,
            tailer,
            sidecar,
            session_timer: std::sync::Mutex::new(None),
        }
    }

    /// Replay everything already on disk, then arm the live watchers.
    pub async fn start(&self) -> crate::error::Result<()> {
        let replayed = replay::run_initial_replay(&self.tailer, &self.sidecar).await?;
        // §6.4: a `journal:batch` envelope for the events replayed from the
        // newest journal, and a `state:full` snapshot of the root document
        // as it stood right after replay — so a subscriber that connects at
        // this instant can catch up in two envelopes instead of racing the
        // per-slice stream from empty state.
        if !replayed.is_empty() {
            let batch: Vec<Value> = replayed.iter().map(|e| e.payload.clone()).collect();
            self.broadcast.broadcast("journal:batch", Value::Array(batch));
        }
        self.broadcast.broadcast(
            "state:full",
            serde_json::to_value(self.projector.snapshot()).unwrap_or(Value::Null),
        );

        self.tailer.start().await?;
        self.sidecar.start().await?;
        self.start_session_timer();
        self.bus.publish_lifecycle(LifecycleEvent::Started {
            source: "core".to_string(),
        });
        Ok(())
    }

    /// §5: a separate 1 Hz periodic task that only touches
    /// `session.elapsedSeconds`. It never broadcasts on its own — the field
    /// is read on demand, so a concurrently running broadcast handler must
    /// tolerate it changing underneath it.
    fn start_session_timer(&self) {
        let projector = self.projector.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                interval.tick().await;
                projector.tick_elapsed_seconds();
            }
        });
        *self.session_timer.lock().expect("session timer lock poisoned") = Some(handle);
    }

    pub async fn stop(&self) {
        self.tailer.stop().await;
        self.sidecar.stop().await;
        if let Some(handle) = self.session_timer.lock().expect("session timer lock poisoned").take() {
            handle.abort();
        }
        self.bus.publish_lifecycle(LifecycleEvent::Stopped {
            source: "core".to_string(),
        });
    }

    pub fn state(&self) -> GameState {
        self.projector.snapshot()
    }

    pub fn commander(&self) -> crate::state::Commander {
        self.projector.read().commander.clone()
    }

    pub fn ship(&self) -> crate::state::Ship {
        self.projector.read().ship.clone()
    }

    pub fn location(&self) -> crate::state::Location {
        self.projector.read().location.clone()
    }

    pub fn materials(&self) -> crate::state::Materials {
        self.projector.read().materials.clone()
    }

    pub fn missions(&self) -> std::collections::HashMap<i64, crate::state::Mission> {
        self.projector.read().missions.clone()
    }

    pub fn session(&self) -> crate::state::Session {
        self.projector.read().session.clone()
    }

    pub fn carrier(&self) -> Option<crate::state::Carrier> {
        self.projector.read().carrier.clone()
    }

    pub fn on_foot(&self) -> crate::state::OnFoot {
        self.projector.read().on_foot.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.projector.read().meta.initialized
    }

    /// Reset only the session slice — the same thing `LoadGame` does to it —
    /// leaving commander/ship/location/etc. as they were. For a full wipe
    /// (e.g. switching commanders), drop and recreate the `Core` instead.
    pub fn reset_session(&self) {
        self.projector.reset_session();
    }

    pub fn events_processed_count(&self) -> u64 {
        self.projector.events_processed()
    }

    pub fn subscribe_journal<F>(&self, kind: &str, handler: F) -> BusToken
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.bus.subscribe_journal(kind, handler)
    }

    pub fn subscribe_companion<F>(&self, file: Option<SidecarFile>, handler: F) -> BusToken
    where
        F: Fn(&SidecarFile, &Value) + Send + Sync + 'static,
    {
        self.bus.subscribe_companion(file, handler)
    }

    pub fn subscribe_state_change<F>(&self, handler: F) -> BusToken
    where
        F: Fn(&crate::bus::StateChange) + Send + Sync + 'static,
    {
        self.bus.subscribe_state_change(handler)
    }

    pub fn unsubscribe(&self, token: &BusToken) {
        self.bus.unsubscribe(token);
    }

    /// Subscribe to the outward broadcast fabric — the feed a
    /// gateway process sitting above this core would relay to its own
    /// clients.
    pub fn subscribe_broadcast<F>(self: &Arc<Self>, topics: TopicFilter, sink: F) -> BroadcastToken
    where
        F: FnMut(crate::broadcast::Envelope) + Send + 'static,
    {
        self.broadcast.subscribe(topics, sink)
    }

    pub fn unsubscribe_broadcast(&self, token: BroadcastToken) {
        self.broadcast.unsubscribe(token);
    }
}

/// Fan every bus topic out to the broadcast fabric under the topic names
/// §6.4 declares for external subscribers. `state:<slice>` itself is
/// pushed directly by the projector's `commit` (so its timestamp can match
/// `meta.lastUpdated` exactly); this wiring covers everything else.
fn wire_bus_to_broadcast(bus: &Arc<EventBus>, broadcast: &Arc<BroadcastFabric>) {
    let b = broadcast.clone();
    bus.subscribe_journal("*", move |event| {
        b.broadcast("journal:event", event.payload.clone());
    });

    let b = broadcast.clone();
    bus.subscribe_companion(None, move |file, value| {
        b.broadcast(&format!("companion:{}", file.filename()), value.clone());
    });

    let b = broadcast.clone();
    bus.subscribe_state_change(move |change| {
        b.broadcast("gamestate:change", change.data.clone());
    });

    let b = broadcast.clone();
    bus.subscribe_lifecycle(move |event| {
        let (topic, payload) = match event {
            LifecycleEvent::Started { source } => ("watcher:started", serde_json::json!({"source": source})),
            LifecycleEvent::Stopped { source } => ("watcher:stopped", serde_json::json!({"source": source})),
            LifecycleEvent::Error { source, message } => {
                ("watcher:error", serde_json::json!({"source": source, "message": message}))
            }
        };
        b.broadcast(topic, payload);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[tokio::test]
    async fn start_replays_newest_journal_and_updates_state() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("Journal.2024-01-01T000000.01.log"),
            "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"event\":\"FSDJump\",\"StarSystem\":\"Sol\",\"SystemAddress\":1}\n",
        )
        .await
        .unwrap();

        let core = Core::new(dir.path().to_path_buf());
        core.start().await.unwrap();

        assert_eq!(core.location().star_system.as_deref(), Some("Sol"));
        assert_eq!(core.events_processed_count(), 1);
        core.stop().await;
    }

    #[tokio::test]
    async fn subscribe_journal_receives_replayed_events() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("Journal.2024-01-01T000000.01.log"),
            "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"event\":\"Docked\",\"StationName\":\"X\"}\n",
        )
        .await
        .unwrap();

        let core = Core::new(dir.path().to_path_buf());
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        core.subscribe_journal("Docked", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        core.start().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        core.stop().await;
    }

    #[tokio::test]
    async fn reset_session_zeroes_session_but_keeps_other_slices() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("Journal.2024-01-01T000000.01.log"),
            "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"event\":\"Commander\",\"Name\":\"Jameson\",\"FID\":\"F1\"}\n\
             {\"timestamp\":\"2024-01-01T00:00:01Z\",\"event\":\"FSDJump\",\"StarSystem\":\"Sol\",\"JumpDist\":5.0,\"FuelUsed\":1.0}\n",
        )
        .await
        .unwrap();

        let core = Core::new(dir.path().to_path_buf());
        core.start().await.unwrap();
        assert_eq!(core.commander().name.as_deref(), Some("Jameson"));
        assert_eq!(core.session().jumps, 1);

        core.reset_session();
        assert_eq!(core.commander().name.as_deref(), Some("Jameson"));
        assert_eq!(core.location().star_system.as_deref(), Some("Sol"));
        assert_eq!(core.session().jumps, 0);
        core.stop().await;
    }

    #[tokio::test]
    async fn session_timer_advances_elapsed_seconds_without_a_broadcast() {
        let dir = tempdir().unwrap();
        let core = Core::new(dir.path().to_path_buf());
        let broadcasts = Arc::new(AtomicUsize::new(0));
        let b = broadcasts.clone();
        core.subscribe_state_change(move |change| {
            if change.section == "session" {
                b.fetch_add(1, Ordering::SeqCst);
            }
        });

        core.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert!(core.session().elapsed_seconds >= 1);
        // §4.5/§5: the timer never broadcasts on its own.
        assert_eq!(broadcasts.load(Ordering::SeqCst), 0);
        core.stop().await;
    }

    #[tokio::test]
    async fn state_slice_broadcast_timestamp_matches_last_updated() {
        let dir = tempdir().unwrap();
        let core = Arc::new(Core::new(dir.path().to_path_buf()));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        core.subscribe_broadcast(TopicFilter::Only(vec!["state:location".to_string()]), move |e| {
            s.lock().unwrap().push(e);
        });

        tokio::fs::write(
            dir.path().join("Journal.2024-01-01T000000.01.log"),
            "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"event\":\"FSDJump\",\"StarSystem\":\"Sol\",\"SystemAddress\":1}\n",
        )
        .await
        .unwrap();
        core.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let envelopes = seen.lock().unwrap();
        assert!(!envelopes.is_empty());
        let envelope = envelopes.last().unwrap();
        assert_eq!(Some(envelope.timestamp), core.state().meta.last_updated);
        core.stop().await;
    }

    #[tokio::test]
    async fn startup_emits_journal_batch_and_state_full() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("Journal.2024-01-01T000000.01.log"),
            "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"event\":\"Docked\",\"StationName\":\"A\"}\n",
        )
        .await
        .unwrap();

        let core = Arc::new(Core::new(dir.path().to_path_buf()));
        let topics = Arc::new(std::sync::Mutex::new(Vec::new()));
        let t = topics.clone();
        core.subscribe_broadcast(
            TopicFilter::Only(vec!["journal:batch".to_string(), "state:full".to_string()]),
            move |e| t.lock().unwrap().push(e.topic),
        );

        core.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let seen = topics.lock().unwrap();
        assert!(seen.contains(&"journal:batch".to_string()));
        assert!(seen.contains(&"state:full".to_string()));
        core.stop().await;
    }
}
