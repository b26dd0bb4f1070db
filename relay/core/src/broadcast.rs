//! Fan-out of frames to a topic's subscribers
//!
//! `publish` snapshots the topic's subscriber set and offers the frame to
//! each subscriber's queue. Offering never waits on a transport, so a
//! publish costs one shard lookup plus one short queue lock per subscriber.

use crate::frame::Frame;
use crate::registry::{SubscriberId, TopicKey, TopicRegistry};
use crate::subscriber::EnqueueOutcome;

/// Result of a publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Subscribers that queued the frame without loss
    pub delivered: usize,
    /// Subscribers that queued the frame after evicting an older token
    pub evicted: usize,
    /// Subscribers that no longer accept frames
    pub failed: usize,
    /// IDs of subscribers that failed
    pub failed_ids: Vec<SubscriberId>,
}

impl BroadcastResult {
    /// Number of subscribers in the snapshot
    #[must_use]
    pub fn recipients(&self) -> usize {
        self.delivered + self.evicted + self.failed
    }

    /// Check if all recipients accepted the frame
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Publishes frames to whoever follows a topic at publish time
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    registry: TopicRegistry,
}

impl BroadcastChannel {
    /// Create a channel over a registry
    #[must_use]
    pub fn new(registry: TopicRegistry) -> Self {
        Self { registry }
    }

    /// Registry this channel reads from
    #[must_use]
    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// Deliver `frame` to every current subscriber of `topic`
    ///
    /// Never fails: a subscriber that cannot take the frame is counted and
    /// skipped. A topic with no subscribers is a no-op.
    pub fn publish(&self, topic: &TopicKey, frame: &Frame) -> BroadcastResult {
        let subscribers = self.registry.snapshot(topic);
        let mut result = BroadcastResult::default();

        if subscribers.is_empty() {
            tracing::debug!(topic = %topic, frame = %frame, "No subscribers for frame");
            return result;
        }

        for subscriber in subscribers {
            match subscriber.offer(frame.clone()) {
                EnqueueOutcome::Queued => result.delivered += 1,
                EnqueueOutcome::EvictedOldest => {
                    tracing::debug!(
                        topic = %topic,
                        subscriber_id = %subscriber.id(),
                        "Subscriber queue full, evicted oldest token"
                    );
                    result.evicted += 1;
                }
                EnqueueOutcome::Closed => {
                    result.failed += 1;
                    result.failed_ids.push(subscriber.id());
                }
            }
        }

        if !result.all_succeeded() {
            tracing::debug!(
                topic = %topic,
                failed = result.failed,
                "Frame not accepted by some subscribers"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::{ChannelSink, SubscriberConnection};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let channel = BroadcastChannel::new(TopicRegistry::new());
        let result = channel.publish(&TopicKey::from("empty"), &Frame::token("x"));
        assert_eq!(result, BroadcastResult::default());
        assert_eq!(result.recipients(), 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let registry = TopicRegistry::new();
        let channel = BroadcastChannel::new(registry.clone());
        let topic = TopicKey::from("t1");

        let (sink_a, mut rx_a) = ChannelSink::channel(8);
        let (sink_b, mut rx_b) = ChannelSink::channel(8);
        let _a = SubscriberConnection::open(&registry, topic.clone(), sink_a, 8);
        let _b = SubscriberConnection::open(&registry, topic.clone(), sink_b, 8);

        let result = channel.publish(&topic, &Frame::token("hello"));
        assert_eq!(result.delivered, 2);

        assert_eq!(rx_a.recv().await, Some(Frame::token("hello")));
        assert_eq!(rx_b.recv().await, Some(Frame::token("hello")));
    }

    #[tokio::test]
    async fn test_other_topics_are_not_touched() {
        let registry = TopicRegistry::new();
        let channel = BroadcastChannel::new(registry.clone());

        let (sink, mut rx) = ChannelSink::channel(8);
        let conn = SubscriberConnection::open(&registry, TopicKey::from("b"), sink, 8);

        channel.publish(&TopicKey::from("a"), &Frame::token("for a"));
        channel.publish(&TopicKey::from("b"), &Frame::Done);

        assert_eq!(rx.recv().await, Some(Frame::Done));
        let report = conn.closed().await;
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_counted_not_fatal() {
        let registry = TopicRegistry::new();
        let channel = BroadcastChannel::new(registry.clone());
        let topic = TopicKey::from("t1");

        let (sink_a, _rx_a) = ChannelSink::channel(8);
        let (sink_b, mut rx_b) = ChannelSink::channel(8);
        let _a = SubscriberConnection::open(&registry, topic.clone(), sink_a, 8);
        let _b = SubscriberConnection::open(&registry, topic.clone(), sink_b, 8);

        // A subscriber that has already taken its terminal frame refuses more
        let first = channel.publish(&topic, &Frame::Done);
        assert_eq!(first.delivered, 2);
        assert_eq!(rx_b.recv().await, Some(Frame::Done));

        let late = channel.publish(&topic, &Frame::token("late"));
        assert_eq!(late.delivered, 0);
    }
}
