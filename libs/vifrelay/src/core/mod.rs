// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod adapter;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod frame;
pub mod queue;
pub mod registry;
pub mod relay;
pub(crate) mod worker;

pub use adapter::*;
pub use config::*;
pub use context::*;
pub use device::*;
pub use error::*;
pub use frame::*;
pub use queue::*;
pub use registry::*;
pub use relay::*;
