//! Transport side of a subscriber connection

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DeliveryError;
use crate::frame::Frame;

/// Destination a delivery task writes frames to
///
/// Writes may be slow; they only ever block the owning connection's
/// delivery task.
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Write one frame to the transport
    async fn send(&mut self, frame: Frame) -> Result<(), DeliveryError>;

    /// Resolves once the far side has gone away
    async fn closed(&self);
}

/// Sink backed by a Tokio channel
///
/// The receiving half is typically turned into an HTTP event stream.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Frame>,
}

impl ChannelSink {
    /// Wrap the sending half of a channel
    #[must_use]
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver that observes it
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: Frame) -> Result<(), DeliveryError> {
        self.tx.send(frame).await.map_err(|_| DeliveryError::Closed)
    }

    async fn closed(&self) {
        self.tx.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_forwards_frames() {
        let (mut sink, mut rx) = ChannelSink::channel(4);
        sink.send(Frame::token("a")).await.unwrap();
        sink.send(Frame::Done).await.unwrap();

        assert_eq!(rx.recv().await, Some(Frame::token("a")));
        assert_eq!(rx.recv().await, Some(Frame::Done));
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_receiver() {
        let (mut sink, rx) = ChannelSink::channel(4);
        drop(rx);

        sink.closed().await;
        let err = sink.send(Frame::Done).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Closed));
    }
}
