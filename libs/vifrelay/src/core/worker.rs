// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Relay worker - pumps inbound frames into the interface context.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::core::{
    ContextToken, DeviceContext, ExecutionContext, FrameBuffer, RelayConfig, RelayError, Result,
    WorkerState,
};

/// Spawn the relay worker for `device` and wait until it is running.
///
/// The worker owns a clone of `device` and of the shared execution context
/// until its inbound queue is closed and drained.
pub(crate) fn spawn_relay_worker(
    device: &Arc<DeviceContext>,
    context: &Arc<dyn ExecutionContext>,
    config: &RelayConfig,
) -> Result<JoinHandle<()>> {
    let device_clone = Arc::clone(device);
    let context_clone = Arc::clone(context);
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<()>(1);

    let thread_name = format!("{}-{}", config.worker_name_prefix, device.name());
    let mut builder = std::thread::Builder::new().name(thread_name);
    if let Some(stack_size) = config.worker_stack_size {
        builder = builder.stack_size(stack_size);
    }

    let handle = builder
        .spawn(move || {
            let current_thread = std::thread::current();
            tracing::info!(
                "[{}] Relay worker started: name='{}', id={:?}",
                device_clone.name(),
                current_thread.name().unwrap_or("unnamed"),
                current_thread.id()
            );

            device_clone.set_worker_state(WorkerState::Waiting);
            // The creator is blocked on the receiver, so this cannot fail
            // unless it has already given up.
            let _ = ready_tx.send(());

            run_relay_loop(&device_clone, &*context_clone);

            device_clone.set_worker_state(WorkerState::Idle);
            device_clone.worker_exited();
            tracing::info!("[{}] Relay worker stopped", device_clone.name());
        })
        .map_err(RelayError::ThreadStartFailed)?;

    if ready_rx.recv().is_err() {
        // The thread died before it got to signal; surface its panic as a
        // start failure.
        let _ = handle.join();
        return Err(RelayError::ThreadStartFailed(std::io::Error::other(
            "relay worker exited before signalling ready",
        )));
    }

    Ok(handle)
}

/// Worker main loop: `Waiting` → `Delivering` → `Waiting` until the inbound
/// queue is closed and empty.
pub(crate) fn run_relay_loop(device: &DeviceContext, context: &dyn ExecutionContext) {
    loop {
        let batch = next_batch(device);
        if batch.is_empty() {
            break;
        }

        {
            let _token = ContextToken::acquire(context);
            device.set_worker_state(WorkerState::Delivering);
            for frame in &batch {
                device.adapter.deliver(frame);
            }
        }
        device.record_delivered(batch.len());
        device.set_worker_state(WorkerState::Waiting);

        tracing::trace!(
            "[{}] Delivered {} frame(s) to interface",
            device.name(),
            batch.len()
        );
        // Buffers are released here, outside the interface context.
        drop(batch);
    }
}

fn next_batch(device: &DeviceContext) -> Vec<FrameBuffer> {
    if device.frames_per_schedule <= 1 {
        device.inbound.blocking_dequeue().into_iter().collect()
    } else {
        device.inbound.dequeue_batch(device.frames_per_schedule)
    }
}
