//! Bounded per-subscriber frame queue
//!
//! Overflow policy: when full, the oldest buffered token is evicted to make
//! room. Terminal frames are never dropped, and nothing is accepted after one.

use std::collections::VecDeque;

use crate::frame::Frame;

/// Result of offering a frame to a subscriber queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Frame queued without loss
    Queued,
    /// Frame queued after evicting the oldest buffered token
    EvictedOldest,
    /// Subscriber no longer accepts frames
    Closed,
}

impl EnqueueOutcome {
    /// Whether the offered frame is now in the queue
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

#[derive(Debug)]
pub(crate) struct FrameQueue {
    frames: VecDeque<Frame>,
    capacity: usize,
    terminal_queued: bool,
    dropped: u64,
}

impl FrameQueue {
    /// `capacity` is clamped to at least one slot.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            terminal_queued: false,
            dropped: 0,
        }
    }

    pub(crate) fn push(&mut self, frame: Frame) -> EnqueueOutcome {
        if self.terminal_queued {
            return EnqueueOutcome::Closed;
        }
        self.terminal_queued = frame.is_terminal();

        if self.frames.len() < self.capacity {
            self.frames.push_back(frame);
            return EnqueueOutcome::Queued;
        }

        // A full queue holds only tokens: anything after a terminal is refused above.
        self.frames.pop_front();
        self.dropped += 1;
        self.frames.push_back(frame);
        EnqueueOutcome::EvictedOldest
    }

    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Refuse further frames and discard anything still buffered.
    pub(crate) fn close(&mut self) {
        self.terminal_queued = true;
        self.frames.clear();
    }
}
