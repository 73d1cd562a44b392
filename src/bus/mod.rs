//! Typed in-process pub/sub.
//!
//! Delivery is synchronous: `publish_*` walks a snapshot of the subscriber
//! list for the relevant topics and returns only once every handler has run,
//! which is what lets the state projector observe events from a single
//! journal file in source order. The snapshot (clone the `Arc` list, then
//! iterate) is what gives the "adding mid-dispatch doesn't affect this
//! dispatch, removing doesn't race" property, without needing a lock held
//! across handler calls.
//!
//! Grounded in the pattern of a controller exposing `add_event_listener`
//! over a fixed event enum, generalized from one channel to N string-keyed
//! topics, using `DashMap` for the concurrently touched subscriber lists.

use crate::config::CONFIG;
use crate::journal::Event;
use crate::sidecar::SidecarFile;
use dashmap::DashMap;
use log::warn;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const JOURNAL_WILDCARD: &str = "journal:*";
const SIDECAR_WILDCARD: &str = "companion:*";
const STATE_CHANGE_TOPIC: &str = "gamestate:change";
const WATCHER_STARTED: &str = "watcher:started";
const WATCHER_STOPPED: &str = "watcher:stopped";
const WATCHER_ERROR: &str = "watcher:error";

#[derive(Debug, Clone)]
pub struct StateChange {
    pub section: String,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Started { source: String },
    Stopped { source: String },
    Error { source: String, message: String },
}

type JournalHandler = Arc<dyn Fn(&Event) + Send + Sync>;
type SidecarHandler = Arc<dyn Fn(&SidecarFile, &Value) + Send + Sync>;
type StateChangeHandler = Arc<dyn Fn(&StateChange) + Send + Sync>;
type LifecycleHandler = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Opaque handle returned from `subscribe_*`, used to `unsubscribe` later.
#[derive(Debug, Clone)]
pub struct Token {
    topic: String,
    id: u64,
}

struct Registry<H> {
    by_topic: DashMap<String, Vec<(u64, H)>>,
    next_id: AtomicU64,
}

impl<H: Clone> Registry<H> {
    fn new() -> Self {
        Self {
            by_topic: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn subscribe(&self, topic: &str, handler: H) -> Token {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entry = self.by_topic.entry(topic.to_string()).or_default();
        entry.push((id, handler));
        if entry.len() > CONFIG.bus_listener_cap {
            warn!(
                "event bus: topic '{}' has {} listeners, exceeding the cap of {}",
                topic,
                entry.len(),
                CONFIG.bus_listener_cap
            );
        }
        Token {
            topic: topic.to_string(),
            id,
        }
    }

    fn unsubscribe(&self, token: &Token) {
        if let Some(mut entry) = self.by_topic.get_mut(&token.topic) {
            entry.retain(|(id, _)| *id != token.id);
        }
    }

    /// Snapshot the handlers for `topic` so in-progress dispatch is immune to
    /// concurrent subscribe/unsubscribe.
    fn snapshot(&self, topic: &str) -> Vec<H> {
        self.by_topic
            .get(topic)
            .map(|entry| entry.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }
}

pub struct EventBus {
    journal: Registry<JournalHandler>,
    sidecar: Registry<SidecarHandler>,
    state_change: Registry<StateChangeHandler>,
    lifecycle: Registry<LifecycleHandler>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            journal: Registry::new(),
            sidecar: Registry::new(),
            state_change: Registry::new(),
            lifecycle: Registry::new(),
        }
    }

    /// Subscribe to one journal event kind, or `"*"` for every kind.
    pub fn subscribe_journal<F>(&self, kind: &str, handler: F) -> Token
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let topic = journal_topic(kind);
        self.journal.subscribe(&topic, Arc::new(handler))
    }

    /// Subscribe to one sidecar file, or `"*"` for every sidecar.
    pub fn subscribe_companion<F>(&self, file: Option<SidecarFile>, handler: F) -> Token
    where
        F: Fn(&SidecarFile, &Value) + Send + Sync + 'static,
    {
        let topic = match file {
            Some(f) => sidecar_topic(f),
            None => SIDECAR_WILDCARD.to_string(),
        };
        self.sidecar.subscribe(&topic, Arc::new(handler))
    }

    pub fn subscribe_state_change<F>(&self, handler: F) -> Token
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.state_change
            .subscribe(STATE_CHANGE_TOPIC, Arc::new(handler))
    }

    pub fn subscribe_lifecycle<F>(&self, handler: F) -> Token
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.lifecycle.subscribe("watcher:*", Arc::new(handler))
    }

    pub fn unsubscribe(&self, token: &Token) {
        self.journal.unsubscribe(token);
        self.sidecar.unsubscribe(token);
        self.state_change.unsubscribe(token);
        self.lifecycle.unsubscribe(token);
    }

    pub fn publish_journal(&self, event: Event) {
        let specific = journal_topic(&event.kind);
        for handler in self.journal.snapshot(&specific) {
            handler(&event);
        }
        for handler in self.journal.snapshot(JOURNAL_WILDCARD) {
            handler(&event);
        }
    }

    pub fn publish_companion(&self, file: SidecarFile, content: Value) {
        let specific = sidecar_topic(file);
        for handler in self.sidecar.snapshot(&specific) {
            handler(&file, &content);
        }
        for handler in self.sidecar.snapshot(SIDECAR_WILDCARD) {
            handler(&file, &content);
        }
    }

    pub fn publish_state_change(&self, section: &str, data: Value) {
        let change = StateChange {
            section: section.to_string(),
            data,
        };
        for handler in self.state_change.snapshot(STATE_CHANGE_TOPIC) {
            handler(&change);
        }
    }

    pub fn publish_lifecycle(&self, event: LifecycleEvent) {
        let topic = match &event {
            LifecycleEvent::Started { .. } => WATCHER_STARTED,
            LifecycleEvent::Stopped { .. } => WATCHER_STOPPED,
            LifecycleEvent::Error { .. } => WATCHER_ERROR,
        };
        for handler in self.lifecycle.snapshot(topic) {
            handler(&event);
        }
        for handler in self.lifecycle.snapshot("watcher:*") {
            handler(&event);
        }
    }
}

fn journal_topic(kind: &str) -> String {
    if kind == "*" {
        JOURNAL_WILDCARD.to_string()
    } else {
        format!("journal:{kind}")
    }
}

fn sidecar_topic(file: SidecarFile) -> String {
    format!("companion:{}", file.filename())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    fn sample_event(kind: &str) -> Event {
        Event {
            timestamp: Utc::now(),
            kind: kind.to_string(),
            payload: serde_json::json!({"event": kind}),
        }
    }

    #[test]
    fn wildcard_and_specific_both_fire_in_order() {
        let bus = EventBus::new();
        let order: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(vec![]));

        let o1 = order.clone();
        bus.subscribe_journal("FSDJump", move |_| o1.lock().unwrap().push("specific"));
        let o2 = order.clone();
        bus.subscribe_journal("*", move |_| o2.lock().unwrap().push("wildcard"));

        bus.publish_journal(sample_event("FSDJump"));
        assert_eq!(*order.lock().unwrap(), vec!["specific", "wildcard"]);
    }

    #[test]
    fn unrelated_kind_does_not_trigger_specific_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe_journal("FSDJump", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish_journal(sample_event("Docked"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let token = bus.subscribe_journal("*", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish_journal(sample_event("Docked"));
        bus.unsubscribe(&token);
        bus.publish_journal(sample_event("Docked"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribing_during_dispatch_does_not_affect_in_progress_dispatch() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));

        let bus_clone = bus.clone();
        let count_clone = count.clone();
        bus.subscribe_journal("*", move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            let c2 = count_clone.clone();
            bus_clone.subscribe_journal("*", move |_| {
                c2.fetch_add(100, Ordering::SeqCst);
            });
        });

        bus.publish_journal(sample_event("Docked"));
        // Only the original handler ran; the newly-added one didn't fire mid-dispatch.
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
