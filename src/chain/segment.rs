// Chain segment model

use bytes::{Bytes, BytesMut};

/// Backing storage of a segment
///
/// An owned block is writable and exclusively held. Duplicating a chain
/// freezes its owned blocks into shared ones: shared blocks are
/// reference-counted and read-only, so no copy of the payload is ever made.
#[derive(Debug, PartialEq)]
pub enum SegmentStorage {
    /// Exclusively owned, writable block
    Owned(BytesMut),

    /// Reference-counted, read-only block
    Shared(Bytes),
}

impl SegmentStorage {
    /// Gets the full block as a byte slice
    pub fn as_slice(&self) -> &[u8] {
        match self {
            SegmentStorage::Owned(b) => b.as_ref(),
            SegmentStorage::Shared(b) => b.as_ref(),
        }
    }

    /// Block capacity in bytes
    pub fn capacity(&self) -> usize {
        match self {
            SegmentStorage::Owned(b) => b.len(),
            SegmentStorage::Shared(b) => b.len(),
        }
    }
}

/// A single segment of a byte chain
///
/// Cursors satisfy: begin <= read <= write <= end (= block capacity)
#[derive(Debug, PartialEq)]
pub struct Segment {
    /// Backing block
    pub(super) storage: SegmentStorage,

    /// First valid byte of this segment within the block
    pub(super) begin: usize,

    /// Read cursor
    pub(super) read: usize,

    /// Write cursor
    pub(super) write: usize,

    /// One past the last usable byte within the block
    pub(super) end: usize,
}

impl Segment {
    /// Allocates a fresh writable segment of the given capacity
    pub fn new(capacity: usize) -> Segment {
        let mut block = BytesMut::with_capacity(capacity);
        block.resize(capacity, 0);

        Segment {
            storage: SegmentStorage::Owned(block),
            begin: 0,
            read: 0,
            write: 0,
            end: capacity,
        }
    }

    /// Wraps externally owned bytes. The resulting segment is read-only
    /// and fully readable (write cursor at the end).
    pub fn wrap(bytes: Bytes) -> Segment {
        let len = bytes.len();

        Segment {
            storage: SegmentStorage::Shared(bytes),
            begin: 0,
            read: 0,
            write: len,
            end: len,
        }
    }

    /// Number of readable bytes
    pub fn len(&self) -> usize {
        self.write - self.read
    }

    /// True if there is nothing left to read
    pub fn is_empty(&self) -> bool {
        self.read >= self.write
    }

    /// Number of writable bytes left
    pub fn space(&self) -> usize {
        match self.storage {
            SegmentStorage::Owned(_) => self.end - self.write,
            // Shared blocks are read-only
            SegmentStorage::Shared(_) => 0,
        }
    }

    /// Readable part of the block
    pub fn readable(&self) -> &[u8] {
        &self.storage.as_slice()[self.read..self.write]
    }

    /// Writes bytes at the write cursor. The caller must check space() first.
    pub(super) fn write_at_cursor(&mut self, src: &[u8]) {
        if let SegmentStorage::Owned(block) = &mut self.storage {
            block[self.write..self.write + src.len()].copy_from_slice(src);
            self.write += src.len();
        }
    }

    /// Promotes the backing block to a shared, read-only one.
    /// Freezing an owned block transfers the buffer without copying.
    pub(super) fn promote_shared(&mut self) {
        if let SegmentStorage::Owned(block) = &mut self.storage {
            let frozen = std::mem::take(block).freeze();
            self.storage = SegmentStorage::Shared(frozen);
        }
    }

    /// Returns a shallow copy sharing the same block.
    /// The segment must be promoted to shared storage first.
    pub(super) fn share(&self) -> Segment {
        let bytes = match &self.storage {
            SegmentStorage::Shared(b) => b.clone(),
            // promote_shared is always called before share
            SegmentStorage::Owned(b) => Bytes::copy_from_slice(b.as_ref()),
        };

        Segment {
            storage: SegmentStorage::Shared(bytes),
            begin: self.begin,
            read: self.read,
            write: self.write,
            end: self.end,
        }
    }
}
