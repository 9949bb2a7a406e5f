// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Synthetic traffic through every path of the relay.
//!
//! Per device, one engine thread pushes numbered frames and one interface
//! thread sends numbered frames as a two-segment chain. A single engine
//! poller pulls from all devices round-robin, and every delivered or pulled
//! frame is checked against its expected sequence number.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use vifrelay::{DeviceHandle, DeviceStats, InterfaceAdapter, Relay};

const HEADER_LEN: usize = 14;

pub struct SoakOptions {
    pub devices: usize,
    pub frames: u64,
    pub frame_size: usize,
    pub timeout: Duration,
}

pub struct DeviceReport {
    pub name: String,
    pub stats: DeviceStats,
    pub inbound_out_of_order: u64,
    pub outbound_out_of_order: u64,
}

pub struct SoakReport {
    pub elapsed: Duration,
    pub devices: Vec<DeviceReport>,
}

impl SoakReport {
    pub fn is_clean(&self) -> bool {
        self.devices
            .iter()
            .all(|d| d.inbound_out_of_order == 0 && d.outbound_out_of_order == 0)
    }
}

/// Adapter that checks inbound sequence numbers.
struct SequenceCheck {
    next: AtomicU64,
    received: AtomicU64,
    out_of_order: AtomicU64,
}

impl SequenceCheck {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            received: AtomicU64::new(0),
            out_of_order: AtomicU64::new(0),
        }
    }
}

impl InterfaceAdapter for SequenceCheck {
    fn deliver(&self, frame: &[u8]) {
        // Deliveries are serialised by the interface context.
        let expected = self.next.load(Ordering::Relaxed);
        if read_seq(frame) != Some(expected) {
            self.out_of_order.fetch_add(1, Ordering::Relaxed);
        }
        self.next.store(expected + 1, Ordering::Relaxed);
        self.received.fetch_add(1, Ordering::Relaxed);
    }
}

fn numbered_frame(seq: u64, size: usize) -> Vec<u8> {
    let mut frame = vec![0u8; size.max(HEADER_LEN)];
    frame[..8].copy_from_slice(&seq.to_be_bytes());
    frame
}

fn read_seq(frame: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = frame.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

pub fn run(relay: &Relay, options: &SoakOptions) -> Result<SoakReport> {
    if options.devices == 0 {
        bail!("at least one device is required");
    }

    let mut devices: Vec<(DeviceHandle, Arc<SequenceCheck>)> = Vec::new();
    for index in 0..options.devices {
        let check = Arc::new(SequenceCheck::new());
        let handle = relay
            .create_device(&index.to_string(), check.clone())
            .with_context(|| format!("creating device {}", index))?;
        devices.push((handle, check));
    }
    let names: Vec<String> = devices.iter().map(|(h, _)| h.name().to_string()).collect();
    tracing::info!(
        "Soak: {} device(s), {} frame(s) each way, {} bytes",
        options.devices,
        options.frames,
        options.frame_size
    );

    let start = Instant::now();
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

    let poller = {
        let relay = relay.clone();
        let names = names.clone();
        let expected = options.frames * options.devices as u64;
        std::thread::Builder::new()
            .name("soak-poller".to_string())
            .spawn(move || poll_outbound(&relay, &names, expected, &stop_rx))
            .context("spawning poller")?
    };

    let mut workers = Vec::new();
    for (handle, _) in &devices {
        let relay = relay.clone();
        let name = handle.name().to_string();
        let frames = options.frames;
        let size = options.frame_size;
        workers.push(
            std::thread::Builder::new()
                .name(format!("soak-push-{}", name))
                .spawn(move || -> vifrelay::Result<()> {
                    for seq in 0..frames {
                        relay.push(&name, &numbered_frame(seq, size))?;
                    }
                    Ok(())
                })
                .context("spawning pusher")?,
        );

        let handle = handle.clone();
        workers.push(
            std::thread::Builder::new()
                .name(format!("soak-send-{}", handle.name()))
                .spawn(move || -> vifrelay::Result<()> {
                    for seq in 0..frames {
                        let frame = numbered_frame(seq, size);
                        let (header, payload) = frame.split_at(HEADER_LEN);
                        handle.send(&[header, payload]);
                    }
                    Ok(())
                })
                .context("spawning sender")?,
        );
    }

    for worker in workers {
        match worker.join() {
            Ok(result) => result?,
            Err(_) => bail!("traffic thread panicked"),
        }
    }

    let deadline = start + options.timeout;
    for (handle, check) in &devices {
        while check.received.load(Ordering::Relaxed) < options.frames {
            if Instant::now() > deadline {
                let _ = stop_tx.send(());
                bail!(
                    "{}: only {}/{} frames delivered before timeout",
                    handle.name(),
                    check.received.load(Ordering::Relaxed),
                    options.frames
                );
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    // Every outbound frame has been sent by now, so the poller terminates.
    let outbound_out_of_order = match poller.join() {
        Ok(Some(counts)) => counts,
        Ok(None) => bail!("poller stopped before draining outbound frames"),
        Err(_) => bail!("poller panicked"),
    };
    let elapsed = start.elapsed();

    let mut reports = Vec::new();
    for ((handle, check), out_of_order) in devices.iter().zip(outbound_out_of_order) {
        let stats = relay.destroy_device(handle.name())?;
        reports.push(DeviceReport {
            name: handle.name().to_string(),
            stats,
            inbound_out_of_order: check.out_of_order.load(Ordering::Relaxed),
            outbound_out_of_order: out_of_order,
        });
    }

    Ok(SoakReport {
        elapsed,
        devices: reports,
    })
}

/// Pull from every device until `expected` frames have come out in total.
///
/// Returns per-device out-of-order counts, or `None` if told to stop first.
fn poll_outbound(
    relay: &Relay,
    names: &[String],
    expected: u64,
    stop_rx: &Receiver<()>,
) -> Option<Vec<u64>> {
    let mut next = vec![0u64; names.len()];
    let mut out_of_order = vec![0u64; names.len()];
    let mut total = 0u64;

    while total < expected {
        let mut idle = true;
        for (i, name) in names.iter().enumerate() {
            match relay.pull(name) {
                Ok(Some(frame)) => {
                    idle = false;
                    if read_seq(&frame) != Some(next[i]) {
                        out_of_order[i] += 1;
                    }
                    next[i] += 1;
                    total += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Poller stopping: {}", e);
                    return None;
                }
            }
        }

        if idle {
            match stop_rx.recv_timeout(Duration::from_micros(200)) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return None,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    Some(out_of_order)
}
