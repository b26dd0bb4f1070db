//! Subscriber connections
//!
//! A [`SubscriberConnection`] is one live delivery destination for a topic.
//! Publishing only ever touches the connection's bounded queue; a dedicated
//! delivery task drains that queue into the transport, so a stalled consumer
//! never blocks the publisher or its sibling subscribers.
//!
//! # Lifecycle
//!
//! ```text
//!   open() ──► Connected ──► Delivering ──► Terminated
//!                  │              │              ▲
//!                  └──────────────┴──────────────┘
//!          cancel / transport closed / terminal frame written
//! ```
//!
//! Entering `Terminated` unregisters the subscriber exactly once.

mod queue;
mod sink;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::DeliveryError;
use crate::frame::Frame;
use crate::registry::{SubscriberId, SubscriptionHandle, TopicKey, TopicRegistry};

pub use queue::EnqueueOutcome;
pub use sink::{ChannelSink, FrameSink};

use queue::FrameQueue;

/// Default number of frames buffered per subscriber
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Lifecycle state of a subscriber connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered, nothing written yet
    Connected,
    /// At least one frame has been handed to the transport
    Delivering,
    /// Finished; no further frames are accepted
    Terminated,
}

/// Why a delivery task stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// A terminal frame was written
    Completed,
    /// Cancelled by the owner of the connection
    Cancelled,
    /// The far side went away
    TransportClosed,
    /// Writing to the transport failed
    TransportError(String),
    /// The delivery task did not run to completion
    Aborted,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TransportClosed => write!(f, "transport closed"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Summary produced when a delivery task ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Frames written to the transport
    pub delivered: u64,
    /// Tokens evicted by the overflow policy
    pub dropped: u64,
    /// Why delivery stopped
    pub reason: TerminationReason,
}

// ============================================================================
// Mailbox
// ============================================================================

#[derive(Debug)]
struct MailboxInner {
    queue: FrameQueue,
    state: ConnectionState,
    cancelled: bool,
}

enum Next {
    Frame(Frame),
    Idle,
    Cancelled,
}

/// State shared between the registry entry and the delivery task
#[derive(Debug)]
struct Mailbox {
    inner: Mutex<MailboxInner>,
    ready: Notify,
    cancel: watch::Sender<bool>,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Mutex::new(MailboxInner {
                queue: FrameQueue::new(capacity),
                state: ConnectionState::Connected,
                cancelled: false,
            }),
            ready: Notify::new(),
            cancel,
        }
    }

    fn offer(&self, frame: Frame) -> EnqueueOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Terminated || inner.cancelled {
                EnqueueOutcome::Closed
            } else {
                inner.queue.push(frame)
            }
        };
        if outcome.is_accepted() {
            self.ready.notify_one();
        }
        outcome
    }

    fn next(&self) -> Next {
        let mut inner = self.inner.lock();
        if inner.cancelled {
            return Next::Cancelled;
        }
        match inner.queue.pop() {
            Some(frame) => {
                inner.state = ConnectionState::Delivering;
                Next::Frame(frame)
            }
            None => Next::Idle,
        }
    }

    fn cancel(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Terminated {
                return;
            }
            inner.cancelled = true;
            inner.queue.close();
        }
        self.cancel.send_replace(true);
        self.ready.notify_one();
    }

    async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        // The sender lives as long as the mailbox, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    fn terminate(&self) {
        let mut inner = self.inner.lock();
        inner.state = ConnectionState::Terminated;
        inner.queue.close();
    }

    fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    fn dropped(&self) -> u64 {
        self.inner.lock().queue.dropped()
    }
}

// ============================================================================
// Registry entry
// ============================================================================

/// Registry-side view of a subscriber
///
/// Cheap to clone; snapshots taken by the broadcast channel hold these.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    mailbox: Arc<Mailbox>,
}

impl Subscriber {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            id: SubscriberId::new(),
            mailbox: Arc::new(Mailbox::new(capacity)),
        }
    }

    /// Unique identifier of this subscriber
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Enqueue a frame for delivery without waiting on the transport
    pub fn offer(&self, frame: Frame) -> EnqueueOutcome {
        self.mailbox.offer(frame)
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.mailbox.state()
    }
}

/// Removes the subscriber from the registry when the delivery task ends,
/// including when the task is aborted.
struct Deregistration {
    registry: TopicRegistry,
    handle: SubscriptionHandle,
    mailbox: Arc<Mailbox>,
}

impl Drop for Deregistration {
    fn drop(&mut self) {
        self.mailbox.terminate();
        self.registry.unregister(&self.handle);
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A live subscriber with its own delivery task
#[derive(Debug)]
pub struct SubscriberConnection {
    id: SubscriberId,
    topic: TopicKey,
    mailbox: Arc<Mailbox>,
    task: JoinHandle<DeliveryReport>,
}

impl SubscriberConnection {
    /// Register a subscriber for `topic` and start delivering to `sink`
    ///
    /// Registration is complete when this returns: every frame published
    /// afterwards is offered to the new subscriber, nothing published before
    /// is. Must be called from within a Tokio runtime.
    pub fn open<S: FrameSink>(
        registry: &TopicRegistry,
        topic: TopicKey,
        sink: S,
        capacity: usize,
    ) -> Self {
        let subscriber = Subscriber::new(capacity);
        let id = subscriber.id();
        let mailbox = Arc::clone(&subscriber.mailbox);

        let handle = registry.register(topic.clone(), subscriber);
        let guard = Deregistration {
            registry: registry.clone(),
            handle,
            mailbox: Arc::clone(&mailbox),
        };

        let span = tracing::info_span!("subscriber", topic = %topic, subscriber_id = %id);
        let task = tokio::spawn(deliver(Arc::clone(&mailbox), sink, guard).instrument(span));

        Self {
            id,
            topic,
            mailbox,
            task,
        }
    }

    /// Subscriber identifier
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Topic this connection follows
    #[must_use]
    pub fn topic(&self) -> &TopicKey {
        &self.topic
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.mailbox.state()
    }

    /// Stop delivery; frames still buffered are discarded
    pub fn cancel(&self) {
        self.mailbox.cancel();
    }

    /// Whether the delivery task has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the delivery task to end
    pub async fn closed(self) -> DeliveryReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(subscriber_id = %self.id, error = %e, "Delivery task failed");
                DeliveryReport {
                    delivered: 0,
                    dropped: self.mailbox.dropped(),
                    reason: TerminationReason::Aborted,
                }
            }
        }
    }
}

async fn deliver<S: FrameSink>(
    mailbox: Arc<Mailbox>,
    mut sink: S,
    guard: Deregistration,
) -> DeliveryReport {
    let mut delivered = 0u64;

    let reason = loop {
        match mailbox.next() {
            Next::Cancelled => break TerminationReason::Cancelled,
            Next::Frame(frame) => {
                let terminal = frame.is_terminal();
                let sent = tokio::select! {
                    result = sink.send(frame) => result,
                    () = mailbox.cancelled() => break TerminationReason::Cancelled,
                };
                match sent {
                    Ok(()) => delivered += 1,
                    Err(DeliveryError::Closed) => break TerminationReason::TransportClosed,
                    Err(e) => break TerminationReason::TransportError(e.to_string()),
                }
                if terminal {
                    break TerminationReason::Completed;
                }
            }
            Next::Idle => {
                tokio::select! {
                    () = mailbox.ready.notified() => {}
                    () = sink.closed() => break TerminationReason::TransportClosed,
                    () = mailbox.cancelled() => break TerminationReason::Cancelled,
                }
            }
        }
    };

    let dropped = mailbox.dropped();
    drop(guard);

    match &reason {
        TerminationReason::TransportError(e) => {
            tracing::warn!(delivered, dropped, error = %e, "Subscriber delivery failed");
        }
        _ => {
            tracing::debug!(delivered, dropped, reason = %reason, "Subscriber delivery ended");
        }
    }

    DeliveryReport {
        delivered,
        dropped,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::timeout;

    fn topic() -> TopicKey {
        TopicKey::from("thread-1")
    }

    /// Sink that fails every write
    struct BrokenSink;

    #[async_trait]
    impl FrameSink for BrokenSink {
        async fn send(&mut self, _frame: Frame) -> Result<(), DeliveryError> {
            Err(DeliveryError::Transport("connection reset".to_string()))
        }

        async fn closed(&self) {
            futures::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn test_open_registers_immediately() {
        let registry = TopicRegistry::new();
        let (sink, _rx) = ChannelSink::channel(8);
        let conn = SubscriberConnection::open(&registry, topic(), sink, 8);

        assert_eq!(registry.subscriber_count(&topic()), 1);
        assert_eq!(conn.state(), ConnectionState::Connected);
        conn.cancel();
        conn.closed().await;
    }

    #[tokio::test]
    async fn test_terminal_frame_completes_and_unregisters() {
        let registry = TopicRegistry::new();
        let (sink, mut rx) = ChannelSink::channel(8);
        let conn = SubscriberConnection::open(&registry, topic(), sink, 8);

        for subscriber in registry.snapshot(&topic()) {
            subscriber.offer(Frame::token("a"));
            subscriber.offer(Frame::Done);
        }

        assert_eq!(rx.recv().await, Some(Frame::token("a")));
        assert_eq!(rx.recv().await, Some(Frame::Done));
        assert_eq!(rx.recv().await, None);

        let report = conn.closed().await;
        assert_eq!(report.reason, TerminationReason::Completed);
        assert_eq!(report.delivered, 2);
        assert!(!registry.contains_topic(&topic()));
    }

    #[tokio::test]
    async fn test_cancel_unregisters_once() {
        let registry = TopicRegistry::new();
        let (sink, _rx) = ChannelSink::channel(8);
        let conn = SubscriberConnection::open(&registry, topic(), sink, 8);

        conn.cancel();
        conn.cancel();
        let report = conn.closed().await;

        assert_eq!(report.reason, TerminationReason::Cancelled);
        assert_eq!(registry.subscriber_count(&topic()), 0);
        assert_eq!(registry.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_receiver_drop_is_detected_while_idle() {
        let registry = TopicRegistry::new();
        let (sink, rx) = ChannelSink::channel(8);
        let conn = SubscriberConnection::open(&registry, topic(), sink, 8);

        drop(rx);
        let report = timeout(Duration::from_secs(1), conn.closed())
            .await
            .expect("delivery task should notice the closed transport");

        assert_eq!(report.reason, TerminationReason::TransportClosed);
        assert!(!registry.contains_topic(&topic()));
    }

    #[tokio::test]
    async fn test_transport_error_terminates() {
        let registry = TopicRegistry::new();
        let conn = SubscriberConnection::open(&registry, topic(), BrokenSink, 8);

        for subscriber in registry.snapshot(&topic()) {
            subscriber.offer(Frame::token("a"));
        }

        let report = conn.closed().await;
        assert!(matches!(report.reason, TerminationReason::TransportError(_)));
        assert_eq!(report.delivered, 0);
        assert_eq!(registry.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_blocked_write() {
        let registry = TopicRegistry::new();
        // One-slot channel that nobody reads: the second write blocks
        let (sink, _rx) = ChannelSink::channel(1);
        let conn = SubscriberConnection::open(&registry, topic(), sink, 8);

        for subscriber in registry.snapshot(&topic()) {
            subscriber.offer(Frame::token("a"));
            subscriber.offer(Frame::token("b"));
        }

        conn.cancel();
        let report = timeout(Duration::from_secs(1), conn.closed())
            .await
            .expect("cancel should interrupt a blocked write");
        assert_eq!(report.reason, TerminationReason::Cancelled);
    }

    #[tokio::test]
    async fn test_offer_after_termination_is_closed() {
        let registry = TopicRegistry::new();
        let (sink, _rx) = ChannelSink::channel(8);
        let conn = SubscriberConnection::open(&registry, topic(), sink, 8);
        let subscriber = registry.snapshot(&topic()).remove(0);

        conn.cancel();
        conn.closed().await;

        assert_eq!(subscriber.state(), ConnectionState::Terminated);
        assert_eq!(subscriber.offer(Frame::Done), EnqueueOutcome::Closed);
    }
}
