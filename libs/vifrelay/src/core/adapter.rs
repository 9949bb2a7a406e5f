// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Interface side of the relay.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Receives frames from a relay worker.
///
/// `deliver` is only ever called with the interface execution context held,
/// so at most one call is in flight system-wide. It must not block
/// indefinitely. Filtering or dropping a frame (for example because the
/// interface is down) is the adapter's own business and is not reported.
pub trait InterfaceAdapter: Send + Sync {
    fn deliver(&self, frame: &[u8]);
}

impl<F> InterfaceAdapter for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn deliver(&self, frame: &[u8]) {
        self(frame)
    }
}

/// Reference adapter that records delivered frames.
///
/// Frames delivered while the interface is not running are dropped silently,
/// like a driver that only passes packets up once it has been initialised.
/// Starts in the running state.
#[derive(Debug)]
pub struct CaptureInterface {
    running: AtomicBool,
    frames: Mutex<Vec<Vec<u8>>>,
    dropped: AtomicU64,
}

impl CaptureInterface {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            frames: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Remove and return everything delivered so far.
    pub fn take_frames(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.frames.lock())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    /// Frames dropped because the interface was not running.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for CaptureInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceAdapter for CaptureInterface {
    fn deliver(&self, frame: &[u8]) {
        if !self.is_running() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.frames.lock().push(frame.to_vec());
    }
}
