//! Intercepted writes and the lock handshake
//!
//! Page-program commands seen on the trace become [`PendingWriteRequest`]s.
//! They are drained in FIFO order through a [`WriteApplier`], which knows
//! how to put the bytes into the mirror, the device or the peer link. The
//! lock word gates draining: while the master holds the lock nothing is
//! applied until its unlock request shows up in the queue.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use super::memory_map::{control_word, magic, LOCK_OFFSET};
use crate::error::{Error, Result};

/// A write observed on the bus, waiting to be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWriteRequest {
    /// Flash offset of the first byte
    pub offset: u32,
    /// Bytes clocked in by the page-program command
    pub data: Vec<u8>,
}

impl PendingWriteRequest {
    /// Create a request from an offset and its payload
    pub fn new(offset: u32, data: Vec<u8>) -> Self {
        Self { offset, data }
    }

    /// Number of bytes written
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the request carries no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn is_lock_word(&self, expected: u32) -> bool {
        self.offset == LOCK_OFFSET && control_word(&self.data) == Some(expected)
    }
}

/// Who currently owns the emulated flash
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlashLockState {
    /// Writes are applied as they arrive
    #[default]
    Unlocked,
    /// The master holds the flash, writes stay queued
    Locked,
}

/// Side of the bridge that applies drained writes
///
/// `pause`/`resume` bracket every drain pass that touches device memory.
pub trait WriteApplier {
    /// Error type, must absorb core errors
    type Error: From<Error>;

    /// Stop emulation so device memory can be changed
    fn pause(&mut self) -> core::result::Result<(), Self::Error>;

    /// Restart emulation
    fn resume(&mut self) -> core::result::Result<(), Self::Error>;

    /// Apply one write
    ///
    /// For lock transitions the payload is already the acknowledgement
    /// magic, not the request the master wrote.
    fn apply(&mut self, offset: u32, data: &[u8]) -> core::result::Result<(), Self::Error>;

    /// The master was just granted the lock
    fn lock_granted(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }

    /// Whether an unlocked pass should run even with an empty queue
    fn has_announcement(&self) -> bool {
        false
    }

    /// First step of an unlocked pass when [`has_announcement`] is set,
    /// with emulation paused
    ///
    /// [`has_announcement`]: WriteApplier::has_announcement
    fn announce(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// FIFO of intercepted writes
#[derive(Debug, Default)]
pub struct WriteQueue {
    entries: VecDeque<PendingWriteRequest>,
}

impl WriteQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a write at the tail
    pub fn enqueue(&mut self, request: PendingWriteRequest) -> Result<()> {
        self.entries
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory)?;
        self.entries.push_back(request);
        Ok(())
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the first unlock request, if any
    pub fn find_unlock_request(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.is_lock_word(magic::UNLOCK_REQUEST))
    }

    /// Run one drain cycle
    ///
    /// A locked queue is released first if an unlock request is waiting,
    /// then an unlocked pass runs in the same call.
    pub fn drain<A: WriteApplier>(
        &mut self,
        lock: &mut FlashLockState,
        applier: &mut A,
    ) -> core::result::Result<(), A::Error> {
        if *lock == FlashLockState::Locked {
            self.drain_locked(lock, applier)?;
        }
        if *lock == FlashLockState::Unlocked {
            self.drain_unlocked(lock, applier)?;
        }
        Ok(())
    }

    /// Apply everything up to and including a pending unlock request
    ///
    /// Returns whether the lock was released. Without an unlock request in
    /// the queue nothing is touched.
    pub fn drain_locked<A: WriteApplier>(
        &mut self,
        lock: &mut FlashLockState,
        applier: &mut A,
    ) -> core::result::Result<bool, A::Error> {
        let Some(unlock_at) = self.find_unlock_request() else {
            return Ok(false);
        };

        with_paused(applier, |applier| {
            for _ in 0..=unlock_at {
                let Some(entry) = self.entries.pop_front() else {
                    break;
                };
                if entry.is_lock_word(magic::UNLOCK_REQUEST) {
                    applier.apply(LOCK_OFFSET, &magic::UNLOCKED.to_le_bytes())?;
                    *lock = FlashLockState::Unlocked;
                    log::info!("Unlocked SPI flash");
                    break;
                }
                apply_entry(applier, &entry)?;
            }
            Ok(())
        })?;
        Ok(true)
    }

    /// Apply queued writes until the master requests the lock
    ///
    /// Returns the number of entries consumed. The pass is skipped
    /// entirely when the queue is empty and the applier has nothing to
    /// announce.
    pub fn drain_unlocked<A: WriteApplier>(
        &mut self,
        lock: &mut FlashLockState,
        applier: &mut A,
    ) -> core::result::Result<usize, A::Error> {
        if self.entries.is_empty() && !applier.has_announcement() {
            return Ok(0);
        }

        let mut consumed = 0;
        with_paused(applier, |applier| {
            if applier.has_announcement() {
                applier.announce()?;
            }
            while let Some(entry) = self.entries.pop_front() {
                consumed += 1;
                if entry.is_lock_word(magic::LOCK_REQUEST) {
                    applier.apply(LOCK_OFFSET, &magic::LOCKED.to_le_bytes())?;
                    applier.lock_granted()?;
                    *lock = FlashLockState::Locked;
                    log::info!("Locked SPI flash");
                    break;
                }
                apply_entry(applier, &entry)?;
            }
            Ok(())
        })?;
        Ok(consumed)
    }
}

fn apply_entry<A: WriteApplier>(
    applier: &mut A,
    entry: &PendingWriteRequest,
) -> core::result::Result<(), A::Error> {
    if entry.offset == LOCK_OFFSET {
        // Anything but the expected request on the lock word is dropped
        log::warn!(
            "Wrong magic written to lock word: {:02x?}",
            entry.data.as_slice()
        );
        return Ok(());
    }
    log::debug!("Write: {:#x} {}", entry.offset, entry.len());
    applier.apply(entry.offset, &entry.data)
}

/// Run `f` with emulation paused, resuming even if `f` fails
fn with_paused<A, F>(applier: &mut A, f: F) -> core::result::Result<(), A::Error>
where
    A: WriteApplier,
    F: FnOnce(&mut A) -> core::result::Result<(), A::Error>,
{
    applier.pause()?;
    let result = f(applier);
    let resumed = applier.resume();
    result.and(resumed)
}
