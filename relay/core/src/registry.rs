//! Topic Registry - Per-Topic Subscriber Sets
//!
//! Maps a topic key (a conversation thread id) to the subscribers currently
//! following it. A topic exists only while it has at least one subscriber;
//! removing the last subscriber removes the topic entry in the same atomic
//! step.
//!
//! # Architecture
//!
//! ```text
//!                        TopicRegistry
//!        ┌──────────────────────────────────────────────────┐
//!        │ DashMap<TopicKey, HashMap<SubscriberId, Subscriber>> │
//!        │   - sharded, wrapped in Arc                      │
//!        └──────────────┬───────────────────┬───────────────┘
//!                       │                   │
//!                ┌──────▼──────┐     ┌──────▼──────┐
//!                │  thread-a   │     │  thread-b   │
//!                │ sub-1 sub-4 │     │    sub-2    │
//!                └─────────────┘     └─────────────┘
//! ```
//!
//! # Thread Safety
//!
//! Every operation takes exactly one shard lock and never awaits while
//! holding it. Unrelated topics usually live on different shards, so they
//! do not contend. `snapshot` clones the subscriber set out of the map; a
//! snapshot is unaffected by later registrations or removals.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::subscriber::Subscriber;

/// Identifier of a topic (conversation thread)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicKey(String);

impl TopicKey {
    /// Create a topic key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the raw key
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TopicKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TopicKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a subscriber
///
/// Allocated from a process-wide counter; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate a new unique subscriber ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Proof of registration, used to unregister
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    topic: TopicKey,
    id: SubscriberId,
}

impl SubscriptionHandle {
    /// Topic the subscriber was registered under
    #[must_use]
    pub fn topic(&self) -> &TopicKey {
        &self.topic
    }

    /// Registered subscriber
    #[must_use]
    pub fn subscriber_id(&self) -> SubscriberId {
        self.id
    }
}

/// Point-in-time registry totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    /// Topics with at least one subscriber
    pub topics: usize,
    /// Subscribers across all topics
    pub subscribers: usize,
}

/// Concurrency-safe topic → subscribers map
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct TopicRegistry {
    topics: Arc<DashMap<TopicKey, HashMap<SubscriberId, Subscriber>>>,
}

impl TopicRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber to a topic, creating the topic if needed
    pub fn register(&self, topic: TopicKey, subscriber: Subscriber) -> SubscriptionHandle {
        let id = subscriber.id();
        let count = {
            let mut set = self.topics.entry(topic.clone()).or_default();
            set.insert(id, subscriber);
            set.len()
        };
        tracing::info!(
            topic = %topic,
            subscriber_id = %id,
            subscribers = count,
            "Subscriber registered"
        );
        SubscriptionHandle { topic, id }
    }

    /// Remove a subscriber; drops the topic when its set becomes empty
    ///
    /// Returns false if the subscriber was already gone.
    pub fn unregister(&self, handle: &SubscriptionHandle) -> bool {
        let removed = match self.topics.entry(handle.topic.clone()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&handle.id).is_some();
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        };
        if removed {
            tracing::info!(
                topic = %handle.topic,
                subscriber_id = %handle.id,
                "Subscriber unregistered"
            );
        }
        removed
    }

    /// Subscribers of `topic` at the time of the call
    #[must_use]
    pub fn snapshot(&self, topic: &TopicKey) -> Vec<Subscriber> {
        self.topics
            .get(topic)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of subscribers following `topic`
    #[must_use]
    pub fn subscriber_count(&self, topic: &TopicKey) -> usize {
        self.topics.get(topic).map_or(0, |set| set.len())
    }

    /// Whether `topic` has any subscriber
    #[must_use]
    pub fn contains_topic(&self, topic: &TopicKey) -> bool {
        self.topics.contains_key(topic)
    }

    /// Number of topics with at least one subscriber
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Totals across all topics
    #[must_use]
    pub fn summary(&self) -> RegistrySummary {
        let mut summary = RegistrySummary::default();
        for entry in self.topics.iter() {
            summary.topics += 1;
            summary.subscribers += entry.value().len();
        }
        summary
    }

    /// Drop every registration
    ///
    /// Used to reset shared state between tests; live delivery tasks keep
    /// running until their own termination and then find nothing to remove.
    pub fn clear(&self) {
        self.topics.clear();
    }
}

impl fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.summary();
        f.debug_struct("TopicRegistry")
            .field("topics", &summary.topics)
            .field("subscribers", &summary.subscribers)
            .finish()
    }
}
