//! Tails the newest `Journal.*.log` file and follows rotation to newer ones.
//! Uses the same notify-callback-to-channel bridge as
//! [`crate::sidecar::SidecarWatcher`], plus read-from-cursor/remainder
//! bookkeeping so a tailing reader can survive being woken up mid-line and
//! pick up exactly where it left off once the rest of the line is flushed.

use crate::bus::EventBus;
use crate::config::CONFIG;
use crate::error::{CoreError, Result};
use crate::journal::{is_journal_name, parse_file, sort_by_date};
use log::{debug, warn};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

struct TailState {
    current_file: Option<PathBuf>,
    cursor: u64,
    remainder: String,
}

pub struct JournalTailer {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    bus: Arc<EventBus>,
    started: AtomicBool,
    tail: AsyncMutex<TailState>,
    watcher: AsyncMutex<Option<RecommendedWatcher>>,
}

impl JournalTailer {
    pub fn new(dir: PathBuf, bus: Arc<EventBus>) -> JournalTailer {
        JournalTailer {
            inner: Arc::new(Inner {
                dir,
                bus,
                started: AtomicBool::new(false),
                tail: AsyncMutex::new(TailState {
                    current_file: None,
                    cursor: 0,
                    remainder: String::new(),
                }),
                watcher: AsyncMutex::new(None),
            }),
        }
    }

    /// Read the newest journal file in full and remember the cursor
    /// position. Called once before the watcher is armed, so every event in
    /// the newest file published during replay lands before the watcher's
    /// own events can. Returns the events it published, so a caller can
    /// also forward them as a single `journal:batch` envelope.
    pub async fn read_initial(&self) -> std::io::Result<Vec<crate::journal::Event>> {
        self.inner.clone().read_initial().await
    }

    pub async fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyWatching);
        }
        if !self.inner.dir.is_dir() {
            self.inner.started.store(false, Ordering::SeqCst);
            return Err(CoreError::DirectoryNotFound(self.inner.dir.clone()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<NotifyEvent>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .map_err(to_io_error)?;
        watcher.watch(&self.inner.dir, RecursiveMode::NonRecursive).map_err(to_io_error)?;
        *self.inner.watcher.lock().await = Some(watcher);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                inner.clone().handle_fs_event(event).await;
            }
        });

        Ok(())
    }

    pub async fn stop(&self) {
        *self.inner.watcher.lock().await = None;
        self.inner.started.store(false, Ordering::SeqCst);
    }
}

fn to_io_error(e: notify::Error) -> CoreError {
    CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// Split `buffer` at the last newline: everything up to and including it is
/// "complete", the tail is an in-progress line to carry over.
fn split_complete_lines(buffer: &str) -> (&str, &str) {
    match buffer.rfind('\n') {
        Some(idx) => (&buffer[..=idx], &buffer[idx + 1..]),
        None => ("", buffer),
    }
}

impl Inner {
    async fn list_journal_names(&self) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if is_journal_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        sort_by_date(&mut names);
        Ok(names)
    }

    async fn read_initial(self: Arc<Self>) -> std::io::Result<Vec<crate::journal::Event>> {
        let names = self.list_journal_names().await?;
        let Some(newest) = names.into_iter().next() else {
            debug!("no journal files present yet in {}", self.dir.display());
            return Ok(Vec::new());
        };
        let path = self.dir.join(&newest);
        self.replay_full_file(&path).await
    }

    /// Startup case only: read `path` end to end, publish and return every
    /// event it contains, and leave the cursor at the file's current size
    /// so live tailing picks up from there.
    async fn replay_full_file(&self, path: &Path) -> std::io::Result<Vec<crate::journal::Event>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let (complete, leftover) = split_complete_lines(&content);
        let mut replayed = Vec::new();
        for event in parse_file(complete) {
            self.bus.publish_journal(event.clone());
            replayed.push(event);
        }
        let mut tail = self.tail.lock().await;
        tail.current_file = Some(path.to_path_buf());
        tail.cursor = complete.len() as u64;
        tail.remainder = leftover.to_string();
        Ok(replayed)
    }

    /// §4.2: a brand-new journal file is detected by name, not content —
    /// register `cursor=0`/`remainder=""` for it and make it "current",
    /// then run the ordinary `read_appended` path against it (after the
    /// caller's debounce) so the header burst the game flushes into it
    /// actually gets parsed and published, rather than being read once
    /// here and silently skipped past.
    async fn begin_tailing_new_file(&self, path: &Path) {
        {
            let mut tail = self.tail.lock().await;
            tail.current_file = Some(path.to_path_buf());
            tail.cursor = 0;
            tail.remainder = String::new();
        }
        self.read_appended(path).await;
    }

    async fn read_appended(&self, path: &Path) {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            // §7 kind 1: a rotated-away file reads as not-found; that's
            // transient and swallowed without a lifecycle event.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("failed to read journal {}: {}", path.display(), e);
                self.bus.publish_lifecycle(crate::bus::LifecycleEvent::Error {
                    source: "journal_tailer".to_string(),
                    message: e.to_string(),
                });
                return;
            }
        };
        let mut tail = self.tail.lock().await;
        let start = (tail.cursor as usize).min(content.len());
        let new_bytes = &content[start..];
        if new_bytes.is_empty() {
            return;
        }
        let combined = format!("{}{}", tail.remainder, new_bytes);
        let (complete, leftover) = split_complete_lines(&combined);
        let events = parse_file(complete);
        tail.cursor += new_bytes.len() as u64;
        tail.remainder = leftover.to_string();
        drop(tail);
        for event in events {
            self.bus.publish_journal(event);
        }
    }

    async fn handle_fs_event(self: Arc<Self>, event: NotifyEvent) {
        for path in &event.paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_journal_name(name) {
                continue;
            }

            let is_current = self.tail.lock().await.current_file.as_deref() == Some(path.as_path());

            match event.kind {
                EventKind::Create(_) if !is_current => {
                    let is_newer = {
                        let tail = self.tail.lock().await;
                        match &tail.current_file {
                            Some(current) => {
                                let mut names = vec![
                                    current.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string(),
                                    name.to_string(),
                                ];
                                sort_by_date(&mut names);
                                names.first().map(|n| n == name).unwrap_or(false)
                            }
                            None => true,
                        }
                    };
                    if is_newer {
                        tokio::time::sleep(CONFIG.new_journal_debounce).await;
                        self.begin_tailing_new_file(path).await;
                    }
                }
                EventKind::Modify(_) | EventKind::Create(_) if is_current => {
                    tokio::time::sleep(CONFIG.journal_stability_window).await;
                    self.read_appended(path).await;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn split_complete_lines_keeps_trailing_partial_line() {
        let (complete, leftover) = split_complete_lines("{\"a\":1}\n{\"b\":2}\n{\"c\"");
        assert_eq!(complete, "{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(leftover, "{\"c\"");
    }

    #[test]
    fn split_complete_lines_handles_no_newline() {
        let (complete, leftover) = split_complete_lines("no newline here");
        assert_eq!(complete, "");
        assert_eq!(leftover, "no newline here");
    }

    #[tokio::test]
    async fn initial_read_publishes_newest_file_only() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("Journal.2024-01-01T000000.01.log"),
            "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"event\":\"Old\"}\n",
        )
        .await
        .unwrap();
        tokio::fs::write(
            dir.path().join("Journal.2024-01-02T000000.01.log"),
            "{\"timestamp\":\"2024-01-02T00:00:00Z\",\"event\":\"New\"}\n",
        )
        .await
        .unwrap();

        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe_journal("*", move |event| s.lock().unwrap().push(event.kind.clone()));

        let tailer = JournalTailer::new(dir.path().to_path_buf(), bus);
        tailer.read_initial().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["New".to_string()]);
    }

    #[tokio::test]
    async fn double_start_reports_already_watching() {
        let dir = tempdir().unwrap();
        let bus = Arc::new(EventBus::new());
        let tailer = JournalTailer::new(dir.path().to_path_buf(), bus);
        tailer.start().await.unwrap();
        let second = tailer.start().await;
        assert!(matches!(second, Err(CoreError::AlreadyWatching)));
    }

    #[tokio::test]
    async fn partial_line_is_carried_to_next_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Journal.2024-01-01T000000.01.log");
        tokio::fs::write(&path, "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"event\":\"A\"}\n{\"timestamp\":\"2024-01-01T00:00:01Z\",\"eve")
            .await
            .unwrap();

        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe_journal("*", move |event| s.lock().unwrap().push(event.kind.clone()));

        let tailer = JournalTailer::new(dir.path().to_path_buf(), bus);
        tailer.read_initial().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["A".to_string()]);

        tokio::fs::write(&path, "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"event\":\"A\"}\n{\"timestamp\":\"2024-01-01T00:00:01Z\",\"event\":\"B\"}\n")
            .await
            .unwrap();
        tailer.inner.read_appended(&path).await;
        assert_eq!(*seen.lock().unwrap(), vec!["A".to_string(), "B".to_string()]);
    }
}
