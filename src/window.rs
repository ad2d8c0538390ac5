// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The two shared-memory bulk-data windows negotiated during the handshake:
// a circular write-direction ring (credit-flow controlled, released only on
// explicit service acknowledgement) and a linear, read-only read-direction
// region addressed by absolute offsets.
//
// Port of `internal/newcontext.py`'s `_create_write_buf` / `_create_read_buf`
// inner `SharedMemStruct` classes (`avail_buffer`, `avail_contiguous`,
// `write_data`, `release_mem`, `read_data`), attached via `ShmHandle` the way
// `shm.rs`/`platform/posix.rs` already do for this crate's other shared
// segments. The original's `release_mem` has an off-by-one
// (`(tail + n) % size - 1`, clamped at zero); this implementation drops the
// `- 1` (§9 note 2) and additionally keeps `head`/`tail` as monotonic byte
// counts rather than reducing both modulo `size`, which is what the
// original's `avail_buffer` effectively did — that loses the distinction
// between the ring being completely empty and completely full whenever the
// occupied region is an exact multiple of `size`.

use crate::error::{Error, InternalKind};
use crate::shm::{ShmHandle, ShmOpenMode};

/// The write-direction shared-memory window: a circular buffer the client
/// appends to and the service drains, acknowledging consumed bytes via
/// control-channel messages that trigger [`WriteWindow::release`].
///
/// `head`/`tail` are monotonically increasing byte counts (never reduced
/// modulo `size`), with `head` always `>= tail`. This is the standard
/// fix for the full-vs-empty ambiguity a plain `0..size`-wrapped pair of
/// cursors hits whenever the occupied region is an exact multiple of
/// `size`: reducing both cursors independently makes "completely full"
/// and "completely empty" indistinguishable (`head == tail` either way).
/// Ring addressing still wraps — only the cursors stay unbounded.
pub struct WriteWindow {
    shm: ShmHandle,
    base_addr: u64,
    size: u64,
    head: u64,
    tail: u64,
}

impl WriteWindow {
    /// Attach the write window named and sized as reported by `ConReply`.
    pub fn attach(name: &str, base_addr: u64, size: u32) -> Result<Self, Error> {
        let shm = ShmHandle::acquire(name, size as usize, ShmOpenMode::Open)
            .map_err(|e| Error::internal_with(InternalKind::Memory, e))?;
        Ok(Self {
            shm,
            base_addr,
            size: size as u64,
            head: 0,
            tail: 0,
        })
    }

    /// Bytes currently free to write into, accounting for wraparound.
    pub fn writable_total(&self) -> u64 {
        self.size - (self.head - self.tail)
    }

    /// Bytes free in the single contiguous run starting at `head`, without
    /// wrapping. Callers loop `write` when this is smaller than their input.
    pub fn writable_contiguous(&self) -> u64 {
        let to_ring_end = self.size - (self.head % self.size);
        to_ring_end.min(self.writable_total())
    }

    /// Absolute service-side address of the next byte to be written.
    pub fn write_addr(&self) -> u64 {
        self.base_addr + (self.head % self.size)
    }

    /// Append up to `writable_contiguous()` bytes of `data`, advancing `head`.
    /// Returns the number of bytes actually appended; a single call never
    /// wraps the ring.
    pub fn write(&mut self, data: &[u8]) -> u64 {
        let avail = self.writable_contiguous();
        if avail == 0 {
            return 0;
        }
        let n = (data.len() as u64).min(avail);
        let offset = (self.head % self.size) as usize;
        unsafe {
            let dst = self.shm.as_mut_ptr().add(offset);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, n as usize);
        }
        self.head += n;
        n
    }

    /// Advance `tail` by `n`, releasing that many bytes back to the free
    /// pool upon service acknowledgement. The original implementation this
    /// is ported from reduces the equivalent cursor modulo `size` and then
    /// subtracts one (`(tail+n) % size - 1`); that off-by-one is dropped
    /// here (§9 note 2) in favor of the monotonic-counter scheme above,
    /// which needs no such correction.
    pub fn release(&mut self, n: u64) {
        self.tail += n;
    }
}

/// The read-direction shared-memory window: a linear region the service
/// populates and the client copies out of by absolute offset.
pub struct ReadWindow {
    shm: ShmHandle,
    base_addr: u64,
    size: u64,
}

impl ReadWindow {
    /// Attach the read window named and sized as reported by `ConReply`.
    pub fn attach(name: &str, base_addr: u64, size: u32) -> Result<Self, Error> {
        let shm = ShmHandle::acquire(name, size as usize, ShmOpenMode::Open)
            .map_err(|e| Error::internal_with(InternalKind::Memory, e))?;
        Ok(Self {
            shm,
            base_addr,
            size: size as u64,
        })
    }

    /// Copy `len` bytes starting at absolute address `addr`. Fails with
    /// `Internal(Protocol)` if the requested range is outside
    /// `[base, base+size)`.
    pub fn read(&self, addr: u64, len: u64) -> Result<Vec<u8>, Error> {
        let end = self.base_addr + self.size;
        if addr < self.base_addr || addr >= end || addr + len > end {
            return Err(Error::internal(InternalKind::Protocol));
        }
        let offset = (addr - self.base_addr) as usize;
        let mut out = vec![0u8; len as usize];
        unsafe {
            let src = self.shm.as_ptr().add(offset);
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), len as usize);
        }
        if out.len() != len as usize {
            return Err(Error::internal(InternalKind::Read));
        }
        Ok(out)
    }
}
