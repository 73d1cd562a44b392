//! The external broadcast fabric: the thing a WebSocket/IPC gateway sitting
//! on top of this core would subscribe to. Backpressure is whatever
//! `tokio::sync::broadcast` gives for free — a slow subscriber drops the
//! oldest envelopes instead of blocking the publisher, reported to it as a
//! lagged-receiver error it can log and keep going. Topic filtering happens
//! per-subscriber task so one slow or narrowly-scoped subscriber never holds
//! up another.

use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::CONFIG;

/// An outward-facing message: one broadcast topic, one JSON payload.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub topic: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub correlation_id: Option<String>,
}

/// Which topics a subscriber wants. `All` is the `"*"` subscription; `Only`
/// matches exact topic strings or `prefix:*` wildcards within the set.
pub enum TopicFilter {
    All,
    Only(Vec<String>),
}

impl TopicFilter {
    fn matches(&self, topic: &str) -> bool {
        match self {
            TopicFilter::All => true,
            TopicFilter::Only(topics) => topics.iter().any(|want| {
                if let Some(prefix) = want.strip_suffix('*') {
                    topic.starts_with(prefix)
                } else {
                    want == topic
                }
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token(u64);

pub struct BroadcastFabric {
    sender: broadcast::Sender<Envelope>,
    sequence: AtomicU64,
    next_id: AtomicU64,
    subscribers: dashmap::DashMap<u64, tokio::task::JoinHandle<()>>,
}

impl Default for BroadcastFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastFabric {
    pub fn new() -> BroadcastFabric {
        let (sender, _) = broadcast::channel(CONFIG.broadcast_channel_capacity);
        BroadcastFabric {
            sender,
            sequence: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            subscribers: dashmap::DashMap::new(),
        }
    }

    /// Publish `payload` under `topic` to every current and future
    /// subscriber. A full channel silently drops the oldest undelivered
    /// envelope for whichever subscribers are behind; it never blocks the
    /// caller.
    pub fn broadcast(&self, topic: &str, payload: Value) {
        self.broadcast_at(topic, payload, Utc::now());
    }

    /// Same as [`Self::broadcast`], but with an explicit timestamp instead
    /// of stamping `Utc::now()`. The state projector uses this so a
    /// `state:<slice>` envelope's `timestamp` is byte-for-byte the same
    /// value it just wrote into `meta.lastUpdated`, rather than a second,
    /// independently-sampled clock read.
    pub fn broadcast_at(&self, topic: &str, payload: Value, timestamp: DateTime<Utc>) {
        let envelope = Envelope {
            topic: topic.to_string(),
            payload,
            timestamp,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            correlation_id: Some(Uuid::new_v4().to_string()),
        };
        // No receivers is not an error: it just means nobody's listening yet.
        let _ = self.sender.send(envelope);
    }

    /// Subscribe a sink closure to `topics`. The sink runs on its own task,
    /// so a handler that blocks or panics only affects its own subscription.
    pub fn subscribe<F>(self: &Arc<Self>, topics: TopicFilter, mut sink: F) -> Token
    where
        F: FnMut(Envelope) + Send + 'static,
    {
        let mut rx = self.sender.subscribe();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if topics.matches(&envelope.topic) {
                            sink(envelope);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("broadcast subscriber lagged, dropped {} envelopes", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.subscribers.insert(id, handle);
        Token(id)
    }

    pub fn unsubscribe(&self, token: Token) {
        if let Some((_, handle)) = self.subscribers.remove(&token.0) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn subscriber_receives_matching_topic_only() {
        let fabric = Arc::new(BroadcastFabric::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        fabric.subscribe(TopicFilter::Only(vec!["gamestate:change".to_string()]), move |e| {
            r.lock().unwrap().push(e.topic);
        });

        fabric.broadcast("gamestate:change", json!({"a": 1}));
        fabric.broadcast("journal:FSDJump", json!({"b": 2}));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*received.lock().unwrap(), vec!["gamestate:change".to_string()]);
    }

    #[tokio::test]
    async fn wildcard_prefix_matches_namespace() {
        let fabric = Arc::new(BroadcastFabric::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        fabric.subscribe(TopicFilter::Only(vec!["journal:*".to_string()]), move |e| {
            r.lock().unwrap().push(e.topic);
        });

        fabric.broadcast("journal:FSDJump", json!({}));
        fabric.broadcast("companion:Status.json", json!({}));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*received.lock().unwrap(), vec!["journal:FSDJump".to_string()]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let fabric = Arc::new(BroadcastFabric::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        let token = fabric.subscribe(TopicFilter::All, move |e| {
            r.lock().unwrap().push(e.topic);
        });
        fabric.unsubscribe(token);
        tokio::time::sleep(Duration::from_millis(10)).await;
        fabric.broadcast("gamestate:change", json!({}));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sequence_numbers_increase_monotonically() {
        let fabric = Arc::new(BroadcastFabric::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        fabric.subscribe(TopicFilter::All, move |e| {
            r.lock().unwrap().push(e.sequence);
        });
        fabric.broadcast("a", json!({}));
        fabric.broadcast("b", json!({}));
        tokio::time::sleep(Duration::from_millis(20)).await;
        let seqs = received.lock().unwrap().clone();
        assert_eq!(seqs, vec![0, 1]);
    }
}
