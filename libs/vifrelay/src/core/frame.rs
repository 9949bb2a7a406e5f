// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! FrameBuffer - one coalesced Ethernet frame.
//!
//! Producers hand over frames as scattered segments (an mbuf chain on the
//! interface side, a single contiguous packet on the engine side). The relay
//! copies them into one exact-length allocation so that ownership can move
//! across threads without borrowing anything from the producer.

use std::fmt;
use std::ops::Deref;

use crate::core::{RelayError, Result};

/// Owned, immutable, contiguous frame bytes.
///
/// A buffer is released by dropping it (or by taking its bytes with
/// [`FrameBuffer::into_vec`]). Since queues move buffers in and out by
/// value, a frame can be neither queued twice nor touched after release.
#[derive(PartialEq, Eq)]
pub struct FrameBuffer {
    bytes: Box<[u8]>,
}

impl FrameBuffer {
    /// Coalesce `segments` into a single buffer.
    ///
    /// The allocation is reserved up front for the summed length. If it
    /// cannot be satisfied the call fails with
    /// [`RelayError::AllocationFailure`] and nothing is copied.
    pub fn build<S: AsRef<[u8]>>(segments: &[S]) -> Result<Self> {
        let len = segments
            .iter()
            .map(|segment| segment.as_ref().len())
            .try_fold(0usize, usize::checked_add)
            .ok_or(RelayError::AllocationFailure { len: usize::MAX })?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| RelayError::AllocationFailure { len })?;

        for segment in segments {
            bytes.extend_from_slice(segment.as_ref());
        }
        debug_assert_eq!(bytes.len(), len);

        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Copy a single contiguous packet.
    pub fn copy_from(packet: &[u8]) -> Result<Self> {
        Self::build(&[packet])
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Release the buffer, handing its bytes to the caller.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }
}

impl Deref for FrameBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for FrameBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<FrameBuffer> for Vec<u8> {
    fn from(frame: FrameBuffer) -> Self {
        frame.into_vec()
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.bytes.len())
            .finish()
    }
}
