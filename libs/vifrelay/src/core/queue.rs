// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! RelayQueue - mutex-guarded FIFO of frame buffers.
//!
//! Each device owns two of these: an inbound queue that the relay worker
//! sleeps on, and an outbound queue that the packet engine polls. Only the
//! inbound variant signals its condvar on enqueue.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::core::FrameBuffer;

/// Whether enqueues wake a blocked consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Consumer blocks in [`RelayQueue::blocking_dequeue`]; enqueue notifies.
    Signaling,
    /// Consumer polls with [`RelayQueue::try_dequeue`]; enqueue never notifies.
    Polled,
}

struct QueueState {
    frames: VecDeque<FrameBuffer>,
    closed: bool,
}

pub struct RelayQueue {
    kind: QueueKind,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl RelayQueue {
    pub fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn signaling() -> Self {
        Self::new(QueueKind::Signaling)
    }

    pub fn polled() -> Self {
        Self::new(QueueKind::Polled)
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Append `frame` at the tail.
    ///
    /// Returns the frame back if the queue has been closed.
    pub fn enqueue(&self, frame: FrameBuffer) -> std::result::Result<(), FrameBuffer> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(frame);
        }
        state.frames.push_back(frame);
        if self.kind == QueueKind::Signaling {
            self.available.notify_one();
        }
        Ok(())
    }

    /// Remove the head without blocking.
    pub fn try_dequeue(&self) -> Option<FrameBuffer> {
        self.state.lock().frames.pop_front()
    }

    /// Remove the head, sleeping while the queue is empty.
    ///
    /// Returns `None` only after [`RelayQueue::close`] once every queued
    /// frame has been handed out. An open queue blocks indefinitely.
    pub fn blocking_dequeue(&self) -> Option<FrameBuffer> {
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Like [`RelayQueue::blocking_dequeue`] but takes up to `max` frames
    /// (at least one) in FIFO order under a single lock acquisition.
    ///
    /// An empty vector means the queue is closed and drained.
    pub fn dequeue_batch(&self, max: usize) -> Vec<FrameBuffer> {
        let max = max.max(1);
        let mut state = self.state.lock();
        loop {
            if !state.frames.is_empty() {
                let take = max.min(state.frames.len());
                return state.frames.drain(..take).collect();
            }
            if state.closed {
                return Vec::new();
            }
            self.available.wait(&mut state);
        }
    }

    /// Refuse further enqueues and wake every blocked consumer.
    ///
    /// Frames already queued stay available to dequeue.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Remove and return everything currently queued.
    pub fn drain(&self) -> Vec<FrameBuffer> {
        self.state.lock().frames.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }
}

impl std::fmt::Debug for RelayQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RelayQueue")
            .field("kind", &self.kind)
            .field("len", &state.frames.len())
            .field("closed", &state.closed)
            .finish()
    }
}
