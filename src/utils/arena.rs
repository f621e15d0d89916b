//! # Buffer Arena
//!
//! Fixed-capacity byte region carved into equal per-player slots at startup.
//!
//! The whole region is allocated once as a single zeroed buffer and split into
//! `max_slots + 1` segments of `slot_size` bytes; segment `i` covers bytes
//! `[i * slot_size, (i + 1) * slot_size)` of the region and segment `0` is never handed out.
//! [`BufferArena::acquire`] moves a segment into an owned [`SlotHandle`]; the handle is the only
//! way to touch those bytes and every access is bounds-checked against the slot. Dropping the
//! handle returns the segment to the arena.
//!
//! ## Usage
//! ```rust
//! use rt5_protocol::utils::arena::BufferArena;
//!
//! let arena = BufferArena::new(4, 128);
//! let mut slot = arena.acquire(1).expect("slot 1 is free");
//! slot.write_at(0, b"hello").expect("fits in the slot");
//! assert_eq!(slot.read_at(0, 5).expect("in bounds"), b"hello");
//! assert!(arena.acquire(1).is_err());
//! drop(slot);
//! assert!(arena.is_free(1));
//! ```

use crate::error::{constants, ProtocolError, Result};
use bytes::BytesMut;
use std::ops::Range;
use std::sync::{Arc, Mutex};

struct ArenaInner {
    segments: Mutex<Vec<Option<BytesMut>>>,
    slot_size: usize,
    max_slots: usize,
}

/// Shared arena handing out exclusively-owned slots.
#[derive(Clone)]
pub struct BufferArena {
    inner: Arc<ArenaInner>,
}

impl std::fmt::Debug for BufferArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferArena")
            .field("slot_size", &self.inner.slot_size)
            .field("max_slots", &self.inner.max_slots)
            .field("available", &self.available())
            .finish()
    }
}

impl BufferArena {
    /// Allocate room for slots `1..=max_slots`, each `slot_size` bytes.
    pub fn new(max_slots: usize, slot_size: usize) -> Self {
        let mut region = BytesMut::zeroed((max_slots + 1) * slot_size);
        let mut segments = Vec::with_capacity(max_slots + 1);

        // Slot 0 is reserved; its bytes stay in the region but are never handed out.
        let _reserved = region.split_to(slot_size);
        segments.push(None);
        for _ in 0..max_slots {
            segments.push(Some(region.split_to(slot_size)));
        }

        Self {
            inner: Arc::new(ArenaInner {
                segments: Mutex::new(segments),
                slot_size,
                max_slots,
            }),
        }
    }

    pub fn slot_size(&self) -> usize {
        self.inner.slot_size
    }

    pub fn max_slots(&self) -> usize {
        self.inner.max_slots
    }

    /// Take exclusive ownership of slot `index`.
    pub fn acquire(&self, index: usize) -> Result<SlotHandle> {
        if index == 0 || index > self.inner.max_slots {
            return Err(ProtocolError::Custom(constants::ERR_SLOT_INDEX.to_string()));
        }
        let mut segments = self
            .inner
            .segments
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))?;
        let buffer = segments[index]
            .take()
            .ok_or_else(|| ProtocolError::Custom(constants::ERR_SLOT_UNAVAILABLE.to_string()))?;

        Ok(SlotHandle {
            index,
            buffer,
            arena: self.inner.clone(),
        })
    }

    /// Whether slot `index` is currently unowned.
    pub fn is_free(&self, index: usize) -> bool {
        self.inner
            .segments
            .lock()
            .map(|segments| matches!(segments.get(index), Some(Some(_))))
            .unwrap_or(false)
    }

    /// Number of slots that can still be acquired.
    pub fn available(&self) -> usize {
        self.inner
            .segments
            .lock()
            .map(|segments| segments.iter().filter(|s| s.is_some()).count())
            .unwrap_or(0)
    }
}

/// Exclusive, bounds-checked view of one arena slot.
pub struct SlotHandle {
    index: usize,
    buffer: BytesMut,
    arena: Arc<ArenaInner>,
}

impl std::fmt::Debug for SlotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotHandle")
            .field("index", &self.index)
            .field("capacity", &self.buffer.len())
            .finish()
    }
}

impl SlotHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Byte range this slot covers within the arena region.
    pub fn range(&self) -> Range<usize> {
        let start = self.index * self.arena.slot_size;
        start..start + self.arena.slot_size
    }

    fn check(&self, offset: usize, len: usize) -> Result<Range<usize>> {
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        if end > self.buffer.len() {
            return Err(ProtocolError::OutOfData {
                needed: len,
                remaining: self.buffer.len().saturating_sub(offset),
            });
        }
        Ok(offset..end)
    }

    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let range = self.check(offset, bytes.len())?;
        self.buffer[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_at(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let range = self.check(offset, len)?;
        Ok(&self.buffer[range])
    }

    /// Mutable access to a sub-range, for in-place transforms.
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        let range = self.check(offset, len)?;
        Ok(&mut self.buffer[range])
    }
}

impl Drop for SlotHandle {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        if let Ok(mut segments) = self.arena.segments.lock() {
            if let Some(entry) = segments.get_mut(self.index) {
                *entry = Some(buffer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn slots_are_exclusive_and_returned() {
        let arena = BufferArena::new(3, 16);
        assert_eq!(arena.available(), 3);

        let slot = arena.acquire(2).unwrap();
        assert_eq!(arena.available(), 2);
        assert!(!arena.is_free(2));
        assert!(arena.acquire(2).is_err());

        drop(slot);
        assert_eq!(arena.available(), 3);
        assert!(arena.acquire(2).is_ok());
    }

    #[test]
    fn slot_zero_and_out_of_range_rejected() {
        let arena = BufferArena::new(3, 16);
        assert!(arena.acquire(0).is_err());
        assert!(arena.acquire(4).is_err());
        assert!(!arena.is_free(0));
    }

    #[test]
    fn writes_are_bounds_checked() {
        let arena = BufferArena::new(2, 8);
        let mut slot = arena.acquire(1).unwrap();
        assert_eq!(slot.capacity(), 8);
        slot.write_at(4, &[1, 2, 3, 4]).unwrap();
        assert!(slot.write_at(5, &[1, 2, 3, 4]).is_err());
        assert!(slot.read_at(usize::MAX, 2).is_err());
        assert_eq!(slot.read_at(4, 4).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn slot_range_follows_index() {
        let arena = BufferArena::new(4, 100);
        let slot = arena.acquire(3).unwrap();
        assert_eq!(slot.range(), 300..400);
    }

    #[test]
    fn slots_do_not_alias() {
        let arena = BufferArena::new(2, 4);
        let mut one = arena.acquire(1).unwrap();
        let mut two = arena.acquire(2).unwrap();
        one.write_at(0, &[0xAA; 4]).unwrap();
        two.write_at(0, &[0xBB; 4]).unwrap();
        assert_eq!(one.read_at(0, 4).unwrap(), &[0xAA; 4]);
        assert_eq!(two.read_at(0, 4).unwrap(), &[0xBB; 4]);
    }
}
