// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Device name '{name}' is {len} bytes, maximum is {max}")]
    NameTooLong { name: String, len: usize, max: usize },

    #[error("Failed to start relay worker: {0}")]
    ThreadStartFailed(#[source] std::io::Error),

    #[error("Failed to allocate {len} byte frame buffer")]
    AllocationFailure { len: usize },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device already exists: {0}")]
    DeviceExists(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
