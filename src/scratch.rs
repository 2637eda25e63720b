//! Bounded scratch space shared by encode and decode steps
//!
//! A [`ScratchBuffer`] is owned by one orchestrator or runner and handed out
//! through [`ScratchBuffer::lease`]. The lease borrows the buffer mutably,
//! so two live uses at the same time do not compile. Every lease starts
//! empty and keeps the last byte of the buffer in reserve for a terminator,
//! which leaves `capacity - 1` usable bytes.

use crate::error::{ProbeError, Result};
use std::fmt;

/// Fixed-size buffer reused across operations
#[derive(Debug, Clone)]
pub struct ScratchBuffer {
    data: Box<[u8]>,
}

impl ScratchBuffer {
    /// Allocates a buffer of `capacity` bytes
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Config` if `capacity` leaves no room for content
    /// next to the reserved terminator byte
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 2 {
            return Err(ProbeError::Config(format!(
                "Scratch buffer capacity {capacity} is too small"
            )));
        }
        Ok(Self {
            data: vec![0; capacity].into_boxed_slice(),
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Starts a single use of the buffer
    pub fn lease(&mut self) -> ScratchLease<'_> {
        ScratchLease {
            data: &mut self.data,
            len: 0,
        }
    }
}

/// One live use of a [`ScratchBuffer`]
pub struct ScratchLease<'a> {
    data: &'a mut [u8],
    len: usize,
}

impl ScratchLease<'_> {
    /// Bytes available for content
    #[must_use]
    pub fn usable(&self) -> usize {
        self.data.len() - 1
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.usable() - self.len
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Appends raw bytes
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::BufferOverflow` if the bytes do not fit; nothing
    /// is written in that case
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let needed = self.len + bytes.len();
        if needed > self.usable() {
            return Err(ProbeError::BufferOverflow {
                needed,
                capacity: self.usable(),
            });
        }
        self.data[self.len..needed].copy_from_slice(bytes);
        self.len = needed;
        Ok(())
    }

    /// Appends formatted text
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::BufferOverflow` with the full formatted length if
    /// the text does not fit; earlier content is kept and nothing of the text is
    /// written
    pub fn write_args(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        let start = self.len;
        let mut writer = OverflowCounter {
            lease: &mut *self,
            overflow: 0,
        };
        let _ = fmt::write(&mut writer, args);
        let overflow = writer.overflow;
        if overflow > 0 {
            let needed = self.len + overflow;
            self.len = start;
            return Err(ProbeError::BufferOverflow {
                needed,
                capacity: self.usable(),
            });
        }
        Ok(())
    }

    /// Unfilled space a reader may write into, excluding the terminator
    pub fn spare_mut(&mut self) -> &mut [u8] {
        let usable = self.usable();
        &mut self.data[self.len..usable]
    }

    /// Marks `n` bytes of the spare space as filled
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::BufferOverflow` if `n` exceeds the spare space
    pub fn advance(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(ProbeError::BufferOverflow {
                needed: self.len + n,
                capacity: self.usable(),
            });
        }
        self.len += n;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl fmt::Debug for ScratchLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchLease")
            .field("len", &self.len)
            .field("usable", &self.usable())
            .finish()
    }
}

/// Writes what fits and counts the bytes that did not
struct OverflowCounter<'l, 'a> {
    lease: &'l mut ScratchLease<'a>,
    overflow: usize,
}

impl fmt::Write for OverflowCounter<'_, '_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.overflow > 0 || s.len() > self.lease.remaining() {
            self.overflow += s.len();
            return Ok(());
        }
        let start = self.lease.len;
        self.lease.data[start..start + s.len()].copy_from_slice(s.as_bytes());
        self.lease.len += s.len();
        Ok(())
    }
}
