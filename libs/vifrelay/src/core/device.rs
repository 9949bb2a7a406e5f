// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! DeviceContext - per-device relay state.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::core::{FrameBuffer, InterfaceAdapter, RelayConfig, RelayError, RelayQueue, Result};

/// Compose `prefix + suffix`, enforcing `max_len`.
pub fn compose_device_name(prefix: &str, suffix: &str, max_len: usize) -> Result<String> {
    let name = format!("{}{}", prefix, suffix);
    if name.len() > max_len {
        return Err(RelayError::NameTooLong {
            len: name.len(),
            name,
            max: max_len,
        });
    }
    Ok(name)
}

/// Lifecycle of a device.
///
/// Devices live in `Active` until [`crate::Relay::destroy_device`] moves them
/// through `Draining` (inbound frames already queued are still delivered) to
/// `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Active,
    Draining,
    Stopped,
}

/// What the relay worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Not yet started, or exited.
    Idle = 0,
    /// Blocked on the inbound queue.
    Waiting = 1,
    /// Inside the interface context handing frames to the adapter.
    Delivering = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Waiting,
            2 => Self::Delivering,
            _ => Self::Idle,
        }
    }
}

/// Snapshot of a device's frame counters.
///
/// Counts on the consuming side never run ahead of the producing side:
/// `delivered <= pushed` and `pulled <= sent` hold for every snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Frames accepted by `push` onto the inbound queue.
    pub pushed: u64,
    /// Frames handed to the interface adapter.
    pub delivered: u64,
    /// Inbound frames dropped (allocation failure or device stopping).
    pub dropped_inbound: u64,
    /// Frames accepted by `send` onto the outbound queue.
    pub sent: u64,
    /// Frames handed to the packet engine by `pull`.
    pub pulled: u64,
    /// Outbound frames dropped (allocation failure or never pulled before teardown).
    pub dropped_outbound: u64,
    /// Number of times the worker acquired the interface context.
    pub schedules: u64,
}

#[derive(Debug, Default)]
struct DeviceCounters {
    pushed: AtomicU64,
    delivered: AtomicU64,
    dropped_inbound: AtomicU64,
    sent: AtomicU64,
    pulled: AtomicU64,
    dropped_outbound: AtomicU64,
    schedules: AtomicU64,
}

impl DeviceCounters {
    /// Producers count before enqueueing and consumers count with `Release`
    /// after dequeueing, so loading the consumer side first (`Acquire`)
    /// guarantees the producer counts read afterwards cover it.
    fn snapshot(&self) -> DeviceStats {
        let delivered = self.delivered.load(Ordering::Acquire);
        let pulled = self.pulled.load(Ordering::Acquire);
        let schedules = self.schedules.load(Ordering::Acquire);
        DeviceStats {
            pushed: self.pushed.load(Ordering::Acquire),
            delivered,
            dropped_inbound: self.dropped_inbound.load(Ordering::Acquire),
            sent: self.sent.load(Ordering::Acquire),
            pulled,
            dropped_outbound: self.dropped_outbound.load(Ordering::Acquire),
            schedules,
        }
    }
}

/// Relay state for one device: the queue pair, the worker and the adapter
/// frames are delivered to.
pub struct DeviceContext {
    name: String,
    pub(crate) inbound: RelayQueue,
    pub(crate) outbound: RelayQueue,
    pub(crate) adapter: Arc<dyn InterfaceAdapter>,
    pub(crate) frames_per_schedule: usize,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<DeviceState>,
    worker_state: AtomicU8,
    /// Set when teardown was requested from the worker thread itself; the
    /// worker then completes it once its loop returns.
    finish_on_worker: AtomicBool,
    counters: DeviceCounters,
}

impl DeviceContext {
    pub(crate) fn new(
        name: String,
        adapter: Arc<dyn InterfaceAdapter>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            name,
            inbound: RelayQueue::signaling(),
            outbound: RelayQueue::polled(),
            adapter,
            frames_per_schedule: config.frames_per_schedule,
            worker: Mutex::new(None),
            state: Mutex::new(DeviceState::Active),
            worker_state: AtomicU8::new(WorkerState::Idle as u8),
            finish_on_worker: AtomicBool::new(false),
            counters: DeviceCounters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    pub fn worker_state(&self) -> WorkerState {
        WorkerState::from_u8(self.worker_state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> DeviceStats {
        self.counters.snapshot()
    }

    /// Frames waiting for the relay worker.
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Frames waiting for the packet engine.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Queue scattered `segments` as one outbound frame.
    ///
    /// Best effort: if the frame cannot be allocated, or the device is being
    /// torn down, it is dropped and only counted.
    pub fn send<S: AsRef<[u8]>>(&self, segments: &[S]) {
        let frame = match FrameBuffer::build(segments) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("[{}] Dropping outbound frame: {}", self.name, e);
                self.counters.dropped_outbound.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let len = frame.len();
        self.counters.sent.fetch_add(1, Ordering::Release);
        match self.outbound.enqueue(frame) {
            Ok(()) => {
                tracing::trace!("[{}] Queued {} byte outbound frame", self.name, len);
            }
            Err(_frame) => {
                tracing::trace!("[{}] Device stopping, dropping outbound frame", self.name);
                self.counters.sent.fetch_sub(1, Ordering::Release);
                self.counters.dropped_outbound.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Queue a copy of `packet` for delivery to the interface.
    pub(crate) fn push(&self, packet: &[u8]) {
        let frame = match FrameBuffer::copy_from(packet) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("[{}] Dropping inbound frame: {}", self.name, e);
                self.counters.dropped_inbound.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        self.counters.pushed.fetch_add(1, Ordering::Release);
        match self.inbound.enqueue(frame) {
            Ok(()) => {
                tracing::trace!("[{}] Queued {} byte inbound frame", self.name, packet.len());
            }
            Err(_frame) => {
                tracing::trace!("[{}] Device stopping, dropping inbound frame", self.name);
                self.counters.pushed.fetch_sub(1, Ordering::Release);
                self.counters.dropped_inbound.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Take the oldest outbound frame, if any, without blocking.
    pub(crate) fn pull(&self) -> Option<FrameBuffer> {
        let frame = self.outbound.try_dequeue()?;
        self.counters.pulled.fetch_add(1, Ordering::Release);
        tracing::trace!("[{}] Pulled {} byte outbound frame", self.name, frame.len());
        Some(frame)
    }

    pub(crate) fn set_worker_state(&self, state: WorkerState) {
        self.worker_state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn record_delivered(&self, frames: usize) {
        self.counters.schedules.fetch_add(1, Ordering::Release);
        self.counters
            .delivered
            .fetch_add(frames as u64, Ordering::Release);
    }

    pub(crate) fn attach_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock() = Some(handle);
    }

    /// Stop accepting frames, let the worker deliver what is already
    /// inbound, join it and discard whatever the engine never pulled.
    ///
    /// When called from the device's own worker (an adapter tearing its
    /// device down from inside `deliver`), the worker cannot be joined.
    /// The device is left in `Draining` and the worker finishes the
    /// teardown itself once the remaining inbound frames are delivered.
    pub(crate) fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if *state != DeviceState::Active {
                return;
            }
            *state = DeviceState::Draining;
        }
        tracing::debug!("[{}] Draining", self.name);

        self.inbound.close();
        self.outbound.close();

        let worker = self.worker.lock().take();
        match worker {
            Some(handle) if handle.thread().id() == std::thread::current().id() => {
                tracing::debug!("[{}] Teardown requested by relay worker", self.name);
                self.finish_on_worker.store(true, Ordering::Release);
                return;
            }
            Some(handle) => {
                if handle.join().is_err() {
                    tracing::error!("[{}] Relay worker panicked", self.name);
                    let lost = self.inbound.drain().len();
                    self.counters
                        .dropped_inbound
                        .fetch_add(lost as u64, Ordering::Relaxed);
                }
            }
            None => {}
        }

        self.finish_shutdown();
    }

    /// Called by the worker after its loop returns.
    pub(crate) fn worker_exited(&self) {
        if self.finish_on_worker.swap(false, Ordering::AcqRel) {
            self.finish_shutdown();
        }
    }

    fn finish_shutdown(&self) {
        let unpulled = self.outbound.drain().len();
        if unpulled > 0 {
            tracing::debug!("[{}] Discarding {} unpulled frames", self.name, unpulled);
            self.counters
                .dropped_outbound
                .fetch_add(unpulled as u64, Ordering::Relaxed);
        }

        *self.state.lock() = DeviceState::Stopped;
        tracing::debug!("[{}] Stopped", self.name);
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("worker_state", &self.worker_state())
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .finish()
    }
}

/// Interface-side handle to a device, returned by
/// [`crate::Relay::create_device`].
#[derive(Clone, Debug)]
pub struct DeviceHandle {
    device: Arc<DeviceContext>,
}

impl DeviceHandle {
    pub(crate) fn new(device: Arc<DeviceContext>) -> Self {
        Self { device }
    }

    pub fn name(&self) -> &str {
        self.device.name()
    }

    /// See [`DeviceContext::send`].
    pub fn send<S: AsRef<[u8]>>(&self, segments: &[S]) {
        self.device.send(segments);
    }

    pub fn state(&self) -> DeviceState {
        self.device.state()
    }

    pub fn stats(&self) -> DeviceStats {
        self.device.stats()
    }

    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.device
    }
}
