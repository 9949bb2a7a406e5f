// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Packet relay between a virtual network interface and an external packet
//! engine.
//!
//! The interface side sends and receives Ethernet frames synchronously from
//! its own execution context; the engine pushes and pulls them from its own
//! threads. Each device gets a queue pair and a dedicated worker thread that
//! hands inbound frames to the interface while holding the (system-wide)
//! interface execution context.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vifrelay::{CaptureInterface, Relay};
//!
//! let relay = Relay::new();
//! let iface = Arc::new(CaptureInterface::new());
//! let device = relay.create_device("0", iface.clone())?;
//!
//! // Engine → interface.
//! relay.push("virt0", &[0xff; 60])?;
//!
//! // Interface → engine.
//! device.send(&[&[0xffu8; 14][..], &[0u8; 46][..]]);
//! while let Some(frame) = relay.pull("virt0")? {
//!     assert_eq!(frame.len(), 60);
//! }
//! # Ok::<(), vifrelay::RelayError>(())
//! ```

pub mod core;

pub use crate::core::{
    compose_device_name, CaptureInterface, ContextReleased, ContextToken, DeviceContext,
    DeviceHandle, DeviceRegistry, DeviceState, DeviceStats, ExecutionContext, FrameBuffer,
    GlobalContext, InterfaceAdapter, QueueKind, Relay, RelayConfig, RelayError, RelayQueue,
    Result, WorkerState,
};
