//! Stream Relay - Drives One Generation Run
//!
//! Pulls text deltas from a [`TokenStream`], publishes each as a
//! [`Frame::Token`], accumulates the full text and finally publishes exactly
//! one terminal frame:
//!
//! ```text
//!   tokens ──► Token, Token, ... ──► Done      (stream ended normally)
//!                                └─► Error     (stream yielded an error)
//! ```
//!
//! If the run future is dropped before the stream ends, an `Error` frame is
//! published on drop so followers are never left without a terminal frame.

use std::time::{Duration, Instant};

use futures::StreamExt;

use crate::backend::TokenStream;
use crate::broadcast::BroadcastChannel;
use crate::error::GenerationError;
use crate::frame::Frame;
use crate::registry::TopicKey;

/// How a generation run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Completed with text
    Success,
    /// Completed without producing any text
    Empty,
    /// The source failed; accumulated text is partial
    Failed(GenerationError),
}

/// Result of one generation run
#[derive(Debug, Clone)]
pub struct GenerationRun {
    /// Topic the run was published to
    pub topic: TopicKey,
    /// Concatenation of every published token
    pub text: String,
    /// Number of token frames published
    pub token_count: usize,
    /// Wall time from first pull to terminal frame
    pub elapsed: Duration,
    /// How the run ended
    pub outcome: RunOutcome,
}

impl GenerationRun {
    /// Whether the source completed normally (with or without text)
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !matches!(self.outcome, RunOutcome::Failed(_))
    }

    /// Assembled text on completion, the source error otherwise
    pub fn into_result(self) -> Result<String, GenerationError> {
        match self.outcome {
            RunOutcome::Failed(err) => Err(err),
            RunOutcome::Success | RunOutcome::Empty => Ok(self.text),
        }
    }
}

/// Publishes the frames of generation runs
#[derive(Debug, Clone)]
pub struct StreamRelay {
    channel: BroadcastChannel,
}

impl StreamRelay {
    /// Create a relay publishing through `channel`
    #[must_use]
    pub fn new(channel: BroadcastChannel) -> Self {
        Self { channel }
    }

    /// Broadcast channel frames are published through
    #[must_use]
    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    /// Relay `tokens` to the followers of `topic`
    ///
    /// Empty deltas are skipped. Exactly one of `Done` / `Error` is published.
    pub async fn run(&self, topic: &TopicKey, mut tokens: TokenStream) -> GenerationRun {
        let started = Instant::now();
        let mut guard = TerminalGuard::new(&self.channel, topic);
        let mut text = String::new();
        let mut token_count = 0usize;

        let failure = loop {
            match tokens.next().await {
                Some(Ok(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    self.channel.publish(topic, &Frame::token(delta.as_str()));
                    text.push_str(&delta);
                    token_count += 1;
                }
                Some(Err(err)) => break Some(err),
                None => break None,
            }
        };

        let outcome = match failure {
            Some(err) => {
                guard.finish(&Frame::error(err.to_string()));
                tracing::warn!(
                    topic = %topic,
                    tokens = token_count,
                    error = %err,
                    "Generation run failed"
                );
                RunOutcome::Failed(err)
            }
            None => {
                guard.finish(&Frame::Done);
                if text.is_empty() {
                    RunOutcome::Empty
                } else {
                    RunOutcome::Success
                }
            }
        };

        let run = GenerationRun {
            topic: topic.clone(),
            text,
            token_count,
            elapsed: started.elapsed(),
            outcome,
        };

        if run.is_complete() {
            tracing::info!(
                topic = %topic,
                tokens = run.token_count,
                chars = run.text.len(),
                elapsed_ms = u64::try_from(run.elapsed.as_millis()).unwrap_or(u64::MAX),
                "Generation run completed"
            );
        }

        run
    }
}

/// Publishes an error frame if dropped before a terminal frame went out
struct TerminalGuard<'a> {
    channel: &'a BroadcastChannel,
    topic: &'a TopicKey,
    armed: bool,
}

impl<'a> TerminalGuard<'a> {
    fn new(channel: &'a BroadcastChannel, topic: &'a TopicKey) -> Self {
        Self {
            channel,
            topic,
            armed: true,
        }
    }

    fn finish(&mut self, frame: &Frame) {
        if self.armed {
            self.armed = false;
            self.channel.publish(self.topic, frame);
        }
    }
}

impl Drop for TerminalGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(topic = %self.topic, "Generation run dropped before completion");
            self.channel
                .publish(self.topic, &Frame::error(GenerationError::Cancelled.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TopicRegistry;
    use crate::subscriber::{ChannelSink, SubscriberConnection};
    use futures::stream;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn setup() -> (StreamRelay, TopicRegistry, TopicKey) {
        let registry = TopicRegistry::new();
        let relay = StreamRelay::new(BroadcastChannel::new(registry.clone()));
        (relay, registry, TopicKey::from("t1"))
    }

    async fn collect(rx: &mut mpsc::Receiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    fn tokens(items: Vec<Result<&'static str, GenerationError>>) -> TokenStream {
        stream::iter(items.into_iter().map(|r| r.map(str::to_string))).boxed()
    }

    #[tokio::test]
    async fn test_success_publishes_tokens_then_done() {
        let (relay, registry, topic) = setup();
        let (sink, mut rx) = ChannelSink::channel(16);
        let _conn = SubscriberConnection::open(&registry, topic.clone(), sink, 16);

        let run = relay
            .run(&topic, tokens(vec![Ok("Hi"), Ok(""), Ok(" there")]))
            .await;

        assert_eq!(run.outcome, RunOutcome::Success);
        assert_eq!(run.text, "Hi there");
        assert_eq!(run.token_count, 2);
        assert_eq!(
            collect(&mut rx).await,
            vec![Frame::token("Hi"), Frame::token(" there"), Frame::Done]
        );
    }

    #[tokio::test]
    async fn test_empty_stream_still_publishes_done() {
        let (relay, registry, topic) = setup();
        let (sink, mut rx) = ChannelSink::channel(16);
        let _conn = SubscriberConnection::open(&registry, topic.clone(), sink, 16);

        let run = relay.run(&topic, tokens(vec![])).await;

        assert_eq!(run.outcome, RunOutcome::Empty);
        assert_eq!(collect(&mut rx).await, vec![Frame::Done]);
    }

    #[tokio::test]
    async fn test_error_stops_pulling_and_keeps_partial_text() {
        let (relay, registry, topic) = setup();
        let (sink, mut rx) = ChannelSink::channel(16);
        let _conn = SubscriberConnection::open(&registry, topic.clone(), sink, 16);

        let err = GenerationError::Stream("reset".into());
        let run = relay
            .run(
                &topic,
                tokens(vec![Ok("Partial"), Err(err.clone()), Ok("never")]),
            )
            .await;

        assert_eq!(run.text, "Partial");
        assert_eq!(run.outcome, RunOutcome::Failed(err.clone()));
        assert_eq!(
            collect(&mut rx).await,
            vec![Frame::token("Partial"), Frame::error(err.to_string())]
        );
        assert!(run.into_result().is_err());
    }

    #[tokio::test]
    async fn test_run_without_subscribers_completes() {
        let (relay, _registry, topic) = setup();
        let run = relay.run(&topic, tokens(vec![Ok("a"), Ok("b")])).await;
        assert_eq!(run.into_result().unwrap(), "ab");
    }

    #[tokio::test]
    async fn test_dropped_run_publishes_error() {
        let (relay, registry, topic) = setup();
        let (sink, mut rx) = ChannelSink::channel(16);
        let _conn = SubscriberConnection::open(&registry, topic.clone(), sink, 16);

        // A source that yields one token and then never finishes
        let pending = stream::iter(vec![Ok("a".to_string())])
            .chain(stream::pending())
            .boxed();
        {
            let run = relay.run(&topic, pending);
            tokio::pin!(run);
            assert!(tokio::time::timeout(std::time::Duration::from_millis(50), &mut run)
                .await
                .is_err());
        }

        assert_eq!(
            collect(&mut rx).await,
            vec![
                Frame::token("a"),
                Frame::error(GenerationError::Cancelled.to_string())
            ]
        );
    }
}
