// Chained zero-copy byte buffer

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::{Bytes, BytesMut};

use super::{ChainError, Segment};

/// Chain is locked for reading
pub const CHAIN_READ_LOCKED: u32 = 1 << 0;

/// Chain is locked for writing
pub const CHAIN_WRITE_LOCKED: u32 = 1 << 1;

/// An ordered sequence of reference-counted segments with read and write
/// cursors. Duplication and splitting never copy payload bytes; only
/// segment metadata is cloned while the backing blocks are shared.
#[derive(Debug, PartialEq)]
pub struct ByteChain {
    segments: VecDeque<Segment>,
    flags: u32,
}

impl Default for ByteChain {
    fn default() -> Self {
        ByteChain::empty()
    }
}

impl ByteChain {
    /// Creates an empty chain (length 0, valid)
    pub fn empty() -> ByteChain {
        ByteChain {
            segments: VecDeque::new(),
            flags: 0,
        }
    }

    /// Allocates a chain with a single fresh segment of the given capacity
    pub fn new(capacity: usize) -> ByteChain {
        let mut chain = ByteChain::empty();
        chain.segments.push_back(Segment::new(capacity));
        chain
    }

    /// Wraps externally owned bytes as a read-only chain
    pub fn wrap(bytes: Bytes) -> ByteChain {
        let mut chain = ByteChain::empty();

        if !bytes.is_empty() {
            chain.segments.push_back(Segment::wrap(bytes));
        }

        chain
    }

    /// Builds a chain holding a copy of the given bytes, ready to read
    pub fn from_slice(data: &[u8]) -> ByteChain {
        let mut chain = ByteChain::new(data.len());
        // A fresh chain always has enough space
        let _ = chain.write_bytes(data);
        chain
    }

    /// Total number of readable bytes across all segments
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }

    /// True if there is nothing left to read
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.is_empty())
    }

    /// Total writable space across all segments
    pub fn space(&self) -> usize {
        self.segments.iter().map(|s| s.space()).sum()
    }

    /// Forbids further reads on this chain
    pub fn lock_reading(&mut self) {
        self.flags |= CHAIN_READ_LOCKED;
    }

    /// Forbids further writes on this chain
    pub fn lock_writing(&mut self) {
        self.flags |= CHAIN_WRITE_LOCKED;
    }

    /// Links another chain at the tail
    pub fn append(&mut self, mut other: ByteChain) {
        self.segments.append(&mut other.segments);
    }

    /// Returns a shallow copy of the chain
    ///
    /// Each backing block is promoted to shared (read-only) storage and its
    /// reference count is incremented. Cursors are copied. No payload bytes
    /// are copied, and neither the original nor the duplicate may be
    /// written afterwards.
    pub fn duplicate(&mut self) -> ByteChain {
        let mut dup = ByteChain::empty();

        for segment in self.segments.iter_mut() {
            segment.promote_shared();
            dup.segments.push_back(segment.share());
        }

        self.flags |= CHAIN_WRITE_LOCKED;
        dup.flags |= CHAIN_WRITE_LOCKED;

        dup
    }

    /// Promotes every backing block to shared storage and write-locks the
    /// chain. After freezing, share() hands out shallow copies without
    /// needing mutable access.
    pub fn freeze(&mut self) {
        for segment in self.segments.iter_mut() {
            segment.promote_shared();
        }

        self.flags |= CHAIN_WRITE_LOCKED;
    }

    /// Returns a shallow copy of a frozen chain
    ///
    /// Segments still in owned storage are copied; call freeze() first to
    /// guarantee zero-copy sharing.
    pub fn share(&self) -> ByteChain {
        let mut copy = ByteChain::empty();

        for segment in self.segments.iter() {
            copy.segments.push_back(segment.share());
        }

        copy.flags = self.flags | CHAIN_WRITE_LOCKED;

        copy
    }

    /// Splits the chain at the given read offset
    ///
    /// Returns a new chain representing bytes [at, len), leaving [0, at) in
    /// place. A segment straddling the split point is shallow-duplicated
    /// with adjusted cursors.
    pub fn disjoint(&mut self, at: usize) -> Result<ByteChain, ChainError> {
        if at > self.len() {
            return Err(ChainError::PartialData);
        }

        let mut rest = ByteChain::empty();
        rest.flags = self.flags;

        let mut remaining = at;
        let mut head: VecDeque<Segment> = VecDeque::new();

        while let Some(mut segment) = self.segments.pop_front() {
            if remaining == 0 {
                // Exact boundary, the rest moves over untouched
                rest.segments.push_back(segment);
                rest.segments.append(&mut self.segments);
                break;
            }

            let seg_len = segment.len();

            if remaining >= seg_len {
                remaining -= seg_len;
                head.push_back(segment);
            } else {
                // Straddling segment: share the block, adjust cursors
                segment.promote_shared();

                let mut tail_part = segment.share();
                tail_part.read += remaining;

                segment.write = segment.read + remaining;
                head.push_back(segment);

                rest.segments.push_back(tail_part);
                rest.segments.append(&mut self.segments);
                break;
            }
        }

        self.segments = head;

        Ok(rest)
    }

    /// Advances the read cursor across segment boundaries
    pub fn advance_read(&mut self, count: usize) -> Result<(), ChainError> {
        if self.flags & CHAIN_READ_LOCKED != 0 {
            return Err(ChainError::Locked);
        }

        if count > self.len() {
            return Err(ChainError::PartialData);
        }

        let mut remaining = count;

        for segment in self.segments.iter_mut() {
            if remaining == 0 {
                break;
            }

            let step = remaining.min(segment.len());
            segment.read += step;
            remaining -= step;
        }

        Ok(())
    }

    /// Advances the write cursor across segment boundaries
    pub fn advance_write(&mut self, count: usize) -> Result<(), ChainError> {
        if self.flags & CHAIN_WRITE_LOCKED != 0 {
            return Err(ChainError::Locked);
        }

        if count > self.space() {
            return Err(ChainError::PartialData);
        }

        let mut remaining = count;

        for segment in self.segments.iter_mut() {
            if remaining == 0 {
                break;
            }

            let step = remaining.min(segment.space());
            segment.write += step;
            remaining -= step;
        }

        Ok(())
    }

    /// Copies readable bytes into dst without moving the read cursor
    ///
    /// # Arguments
    ///
    /// * `dst` - Destination buffer, filled completely or the call fails
    /// * `offset` - Read offset relative to the current read cursor
    pub fn peek(&self, dst: &mut [u8], offset: usize) -> Result<(), ChainError> {
        if offset + dst.len() > self.len() {
            return Err(ChainError::PartialData);
        }

        let mut skip = offset;
        let mut copied = 0;

        for segment in self.segments.iter() {
            if copied >= dst.len() {
                break;
            }

            let readable = segment.readable();

            if skip >= readable.len() {
                skip -= readable.len();
                continue;
            }

            let available = &readable[skip..];
            skip = 0;

            let step = available.len().min(dst.len() - copied);
            dst[copied..copied + step].copy_from_slice(&available[..step]);
            copied += step;
        }

        Ok(())
    }

    /// Reads bytes, advancing the read cursor
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), ChainError> {
        if self.flags & CHAIN_READ_LOCKED != 0 {
            return Err(ChainError::Locked);
        }

        self.peek(dst, 0)?;
        self.advance_read(dst.len())
    }

    /// Writes bytes at the write cursor, advancing it
    ///
    /// Fails with PartialData (writing nothing) if the chain does not have
    /// enough space. Chains do not grow on write; use append for that.
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<(), ChainError> {
        if self.flags & CHAIN_WRITE_LOCKED != 0 {
            return Err(ChainError::Locked);
        }

        if src.len() > self.space() {
            return Err(ChainError::PartialData);
        }

        let mut written = 0;

        for segment in self.segments.iter_mut() {
            if written >= src.len() {
                break;
            }

            let step = segment.space().min(src.len() - written);

            if step > 0 {
                segment.write_at_cursor(&src[written..written + step]);
                written += step;
            }
        }

        Ok(())
    }

    /// Copies all readable bytes into a contiguous buffer
    pub fn flatten(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.len());

        for segment in self.segments.iter() {
            out.extend_from_slice(segment.readable());
        }

        out.freeze()
    }

    /// Fills an io-slice list for a vectored write, up to max entries
    ///
    /// # Return value
    ///
    /// Returns the total number of bytes the filled slices cover
    pub fn fill_iov<'a>(&'a self, iov: &mut Vec<IoSlice<'a>>, max: usize) -> usize {
        let mut total = 0;

        for segment in self.segments.iter() {
            if iov.len() >= max {
                break;
            }

            let readable = segment.readable();

            if readable.is_empty() {
                continue;
            }

            total += readable.len();
            iov.push(IoSlice::new(readable));
        }

        total
    }

    /// Collects the readable parts as io-slices for a vectored write
    pub fn io_slices(&self) -> Vec<IoSlice<'_>> {
        self.segments
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| IoSlice::new(s.readable()))
            .collect()
    }

    /// Drops fully consumed segments from the front of the chain
    pub fn reclaim(&mut self) {
        while let Some(front) = self.segments.front() {
            if front.is_empty() && front.space() == 0 {
                self.segments.pop_front();
            } else {
                break;
            }
        }
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let mut chain = ByteChain::new(8);

        chain.write_bytes(&[1, 2, 3, 4]).unwrap();
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.space(), 4);

        let mut out = [0u8; 4];
        chain.read_bytes(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn test_write_past_capacity() {
        let mut chain = ByteChain::new(2);

        assert_eq!(chain.write_bytes(&[1, 2, 3]), Err(ChainError::PartialData));
        // Nothing was written
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn test_read_across_segments() {
        let mut chain = ByteChain::new(2);
        chain.write_bytes(&[1, 2]).unwrap();

        let mut tail = ByteChain::new(3);
        tail.write_bytes(&[3, 4, 5]).unwrap();

        chain.append(tail);
        assert_eq!(chain.len(), 5);

        let mut out = [0u8; 5];
        chain.read_bytes(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_peek_with_offset() {
        let chain = ByteChain::from_slice(&[10, 20, 30, 40]);

        let mut out = [0u8; 2];
        chain.peek(&mut out, 1).unwrap();
        assert_eq!(out, [20, 30]);

        // Peek does not consume
        assert_eq!(chain.len(), 4);

        let mut too_far = [0u8; 2];
        assert_eq!(chain.peek(&mut too_far, 3), Err(ChainError::PartialData));
    }

    #[test]
    fn test_duplicate_is_shallow() {
        let mut chain = ByteChain::from_slice(&[1, 2, 3]);
        let mut dup = chain.duplicate();

        let mut out = [0u8; 3];
        dup.read_bytes(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);

        // The original still has its bytes
        assert_eq!(chain.len(), 3);

        // Both sides are write-locked after duplication
        assert_eq!(chain.write_bytes(&[9]), Err(ChainError::Locked));
        assert_eq!(dup.write_bytes(&[9]), Err(ChainError::Locked));
    }

    #[test]
    fn test_freeze_and_share() {
        let mut chain = ByteChain::from_slice(&[7, 8, 9]);
        chain.freeze();

        let mut copy = chain.share();

        let mut out = [0u8; 3];
        copy.read_bytes(&mut out).unwrap();
        assert_eq!(out, [7, 8, 9]);

        // Sharing does not consume the original
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_disjoint_straddling() {
        let mut chain = ByteChain::from_slice(&[1, 2, 3, 4, 5]);

        let mut rest = chain.disjoint(2).unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(rest.len(), 3);

        let mut head = [0u8; 2];
        chain.read_bytes(&mut head).unwrap();
        assert_eq!(head, [1, 2]);

        let mut tail = [0u8; 3];
        rest.read_bytes(&mut tail).unwrap();
        assert_eq!(tail, [3, 4, 5]);
    }

    #[test]
    fn test_disjoint_out_of_range() {
        let mut chain = ByteChain::from_slice(&[1, 2]);
        assert!(chain.disjoint(3).is_err());
    }

    #[test]
    fn test_advance_read_partial_data() {
        let mut chain = ByteChain::from_slice(&[1, 2]);
        assert_eq!(chain.advance_read(3), Err(ChainError::PartialData));
        assert_eq!(chain.advance_read(2), Ok(()));
    }

    #[test]
    fn test_flatten() {
        let mut chain = ByteChain::from_slice(&[1, 2]);
        chain.append(ByteChain::from_slice(&[3, 4]));

        assert_eq!(chain.flatten().as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_wrap_is_read_only() {
        let mut chain = ByteChain::wrap(Bytes::from_static(&[1, 2, 3]));

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.space(), 0);
        assert_eq!(chain.write_bytes(&[9]), Err(ChainError::PartialData));
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let mut chain = ByteChain::empty();

        assert_eq!(chain.len(), 0);
        assert!(chain.is_empty());
        assert_eq!(chain.flatten().len(), 0);
        assert!(chain.disjoint(0).is_ok());
    }

    #[test]
    fn test_fill_iov_respects_max() {
        let mut chain = ByteChain::from_slice(&[1, 2]);
        chain.append(ByteChain::from_slice(&[3]));
        chain.append(ByteChain::from_slice(&[4, 5]));

        let mut iov = Vec::new();
        let total = chain.fill_iov(&mut iov, 2);

        assert_eq!(iov.len(), 2);
        assert_eq!(total, 3);
    }

    #[test]
    fn test_io_slices() {
        let mut chain = ByteChain::from_slice(&[1, 2]);
        chain.append(ByteChain::from_slice(&[3]));

        let slices = chain.io_slices();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].as_ref(), &[1, 2]);
        assert_eq!(slices[1].as_ref(), &[3]);
    }
}
