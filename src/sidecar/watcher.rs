//! Watches the sidecar JSON files next to the journal and republishes their
//! contents onto the event bus whenever they change.
//!
//! Grounded in the same `notify` bridging idea as [`crate::tailer`] — a
//! synchronous callback feeding a channel that an async task drains — with
//! the addition of a stability wait: a sidecar file can be
//! observed mid-write, so the watcher polls its length until it stops
//! changing before reading it, rather than trusting the first notify event.

use crate::bus::EventBus;
use crate::config::CONFIG;
use crate::sidecar::{LiveStatus, SidecarFile};
use dashmap::DashMap;
use log::{debug, trace, warn};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

pub struct SidecarWatcher {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    bus: Arc<EventBus>,
    last_content: DashMap<SidecarFile, Value>,
    watcher: AsyncMutex<Option<RecommendedWatcher>>,
}

impl SidecarWatcher {
    pub fn new(dir: PathBuf, bus: Arc<EventBus>) -> SidecarWatcher {
        SidecarWatcher {
            inner: Arc::new(Inner {
                dir,
                bus,
                last_content: DashMap::new(),
                watcher: AsyncMutex::new(None),
            }),
        }
    }

    /// Read every sidecar file that currently exists, publishing each once.
    /// Called once at startup, before the watcher is armed.
    pub async fn read_all_initial(&self) {
        for file in SidecarFile::ALL {
            self.inner.clone().read_and_publish(file).await;
        }
    }

    pub async fn start(&self) -> crate::error::Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<NotifyEvent>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .map_err(|e| crate::error::CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        watcher
            .watch(&self.inner.dir, RecursiveMode::NonRecursive)
            .map_err(|e| crate::error::CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        *self.inner.watcher.lock().await = Some(watcher);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }
                for path in &event.paths {
                    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    let Some(file) = SidecarFile::from_filename(name) else {
                        continue;
                    };
                    inner.clone().read_and_publish(file).await;
                }
            }
        });

        Ok(())
    }

    pub async fn stop(&self) {
        *self.inner.watcher.lock().await = None;
    }
}

impl Inner {
    async fn read_and_publish(self: Arc<Self>, file: SidecarFile) {
        let path = self.dir.join(file.filename());
        match wait_for_stable_read(&path, file).await {
            Ok(Some(text)) => {
                if text.trim().is_empty() {
                    trace!("sidecar {} is empty, skipping", file.filename());
                    return;
                }
                let value: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("sidecar {} had invalid JSON, skipping: {}", file.filename(), e);
                        return;
                    }
                };
                let is_dup = self
                    .last_content
                    .get(&file)
                    .map(|existing| *existing == value)
                    .unwrap_or(false);
                if is_dup {
                    trace!("sidecar {} unchanged, skipping publish", file.filename());
                    return;
                }
                self.last_content.insert(file, value.clone());
                debug!("sidecar {} updated", file.filename());
                self.bus.publish_companion(file, value);
            }
            Ok(None) => {
                // file doesn't exist (yet) — nothing to publish
            }
            Err(e) => {
                warn!("failed to read sidecar {}: {}", file.filename(), e);
                self.bus.publish_lifecycle(crate::bus::LifecycleEvent::Error {
                    source: format!("sidecar_watcher:{}", file.filename()),
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Poll the file's length until it's unchanged for one stability window,
/// then read it. Returns `Ok(None)` if the file doesn't exist.
async fn wait_for_stable_read(path: &std::path::Path, file: SidecarFile) -> std::io::Result<Option<String>> {
    let (stability_window, poll_interval) = if file.is_high_frequency() {
        (CONFIG.live_status_stability_window, CONFIG.live_status_poll_interval)
    } else {
        (CONFIG.sidecar_stability_window, CONFIG.sidecar_poll_interval)
    };

    let mut last_len: Option<u64> = None;
    let mut stable_since = tokio::time::Instant::now();

    loop {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let len = metadata.len();
        if Some(len) != last_len {
            last_len = Some(len);
            stable_since = tokio::time::Instant::now();
        }
        if stable_since.elapsed() >= stability_window {
            break;
        }
        tokio::time::sleep(poll_interval.min(Duration::from_millis(10))).await;
    }

    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Convenience accessor used by the state projector: decode `Status.json`'s
/// bitmask and value fields straight out of its raw JSON value.
pub fn decode_live_status(value: &Value) -> Option<LiveStatus> {
    LiveStatus::from_document(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn initial_read_skips_missing_files_without_error() {
        let dir = tempdir().unwrap();
        let bus = Arc::new(EventBus::new());
        let watcher = SidecarWatcher::new(dir.path().to_path_buf(), bus);
        watcher.read_all_initial().await;
    }

    #[tokio::test]
    async fn initial_read_publishes_existing_sidecar_once() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("Cargo.json"), r#"{"Inventory":[]}"#)
            .await
            .unwrap();
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe_companion(Some(SidecarFile::Cargo), move |_, _| {
            c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let watcher = SidecarWatcher::new(dir.path().to_path_buf(), bus);
        watcher.read_all_initial().await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_file_is_not_published() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("Market.json"), "").await.unwrap();
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe_companion(Some(SidecarFile::Market), move |_, _| {
            c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let watcher = SidecarWatcher::new(dir.path().to_path_buf(), bus);
        watcher.read_all_initial().await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_json_is_not_published() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("Market.json"), "{not json")
            .await
            .unwrap();
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe_companion(Some(SidecarFile::Market), move |_, _| {
            c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let watcher = SidecarWatcher::new(dir.path().to_path_buf(), bus);
        watcher.read_all_initial().await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn decode_live_status_reads_flags_from_raw_json() {
        let value = serde_json::json!({"Flags": 0x01, "Flags2": 0x01});
        let status = decode_live_status(&value).unwrap();
        assert!(status.docked);
        assert!(status.on_foot);
    }

    #[test]
    fn decode_live_status_requires_flags_field() {
        let value = serde_json::json!({"no_flags": true});
        assert!(decode_live_status(&value).is_none());
    }

    #[tokio::test]
    async fn identical_sidecar_content_is_published_once() {
        // Spec §8 scenario 5: two back-to-back identical file contents
        // produce exactly one broadcast.
        let dir = tempdir().unwrap();
        let path = dir.path().join("Cargo.json");
        let content = r#"{"Inventory":[{"Name":"gold","Count":10,"Stolen":0}]}"#;
        tokio::fs::write(&path, content).await.unwrap();

        let bus = Arc::new(EventBus::new());
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe_companion(Some(SidecarFile::Cargo), move |_, _| {
            c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        let watcher = SidecarWatcher::new(dir.path().to_path_buf(), bus);
        watcher.inner.clone().read_and_publish(SidecarFile::Cargo).await;
        // Rewritten with byte-for-byte identical content.
        tokio::fs::write(&path, content).await.unwrap();
        watcher.inner.clone().read_and_publish(SidecarFile::Cargo).await;

        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
