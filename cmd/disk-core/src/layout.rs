//! Disk geometry and the mapping of byte ranges onto fixed-size chunks.

use crate::error::{DiskError, DiskOp, DiskResult};

pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;
pub const DEFAULT_DISK_SIZE: u64 = 100 * 1024 * 1024;

/// Size of the device and of the chunks that tile it.
///
/// `total_size` is always a whole number of chunks, so the last chunk is never
/// partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskGeometry {
    total_size: u64,
    chunk_size: u64,
}

impl DiskGeometry {
    pub fn new(total_size: u64, chunk_size: u64) -> DiskResult<Self> {
        if chunk_size == 0 {
            return Err(DiskError::Config("chunk size must be non-zero".into()));
        }
        if total_size == 0 {
            return Err(DiskError::Config("disk size must be non-zero".into()));
        }
        if total_size % chunk_size != 0 {
            return Err(DiskError::Config(format!(
                "disk size {} is not a multiple of chunk size {}",
                total_size, chunk_size
            )));
        }
        if usize::try_from(chunk_size).is_err() {
            return Err(DiskError::Config(format!(
                "chunk size {} does not fit in memory",
                chunk_size
            )));
        }
        Ok(Self {
            total_size,
            chunk_size,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Chunk size as a buffer length. Checked in [`DiskGeometry::new`].
    pub fn chunk_len(&self) -> usize {
        self.chunk_size as usize
    }

    pub fn chunk_count(&self) -> u64 {
        self.total_size / self.chunk_size
    }

    /// Rejects ranges that start at or past the end of the device or run past it.
    pub fn check_range(&self, op: DiskOp, offset: u64, length: u64) -> DiskResult<()> {
        let out_of_bounds = || DiskError::OutOfBounds {
            op,
            offset,
            length,
            size: self.total_size,
        };
        if offset >= self.total_size {
            return Err(out_of_bounds());
        }
        match offset.checked_add(length) {
            Some(end) if end <= self.total_size => Ok(()),
            _ => Err(out_of_bounds()),
        }
    }

    pub fn segments(&self, offset: u64, length: u64) -> Segments {
        segments(offset, length, self.chunk_size)
    }
}

/// The part of a request that falls inside one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub chunk_index: u64,
    pub chunk_offset: u64,
    pub len: u64,
    /// Position of this segment's bytes within the request buffer.
    pub buffer_offset: u64,
}

impl Segment {
    pub fn chunk_range(&self) -> std::ops::Range<usize> {
        let start = self.chunk_offset as usize;
        start..start + self.len as usize
    }

    pub fn buffer_range(&self) -> std::ops::Range<usize> {
        let start = self.buffer_offset as usize;
        start..start + self.len as usize
    }
}

/// Lazy walk over the segments of `[offset, offset + length)`.
#[derive(Debug, Clone)]
pub struct Segments {
    cursor: u64,
    remaining: u64,
    consumed: u64,
    chunk_size: u64,
}

pub fn segments(offset: u64, length: u64, chunk_size: u64) -> Segments {
    debug_assert!(chunk_size > 0, "chunk size must be non-zero");
    Segments {
        cursor: offset,
        remaining: length,
        consumed: 0,
        chunk_size,
    }
}

impl Iterator for Segments {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.remaining == 0 {
            return None;
        }
        let chunk_offset = self.cursor % self.chunk_size;
        let len = (self.chunk_size - chunk_offset).min(self.remaining);
        let segment = Segment {
            chunk_index: self.cursor / self.chunk_size,
            chunk_offset,
            len,
            buffer_offset: self.consumed,
        };
        self.cursor += len;
        self.remaining -= len;
        self.consumed += len;
        Some(segment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.remaining == 0 {
            return (0, Some(0));
        }
        let first = self.cursor / self.chunk_size;
        let last = (self.cursor + self.remaining - 1) / self.chunk_size;
        let n = (last - first + 1) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Segments {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_rejects_partial_tail_chunk() {
        let err = DiskGeometry::new(100, 40).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("not a multiple"));
    }

    #[test]
    fn test_geometry_rejects_zero_sizes() {
        assert!(DiskGeometry::new(0, 4096).is_err());
        assert!(DiskGeometry::new(4096, 0).is_err());
    }

    #[test]
    fn test_geometry_defaults() {
        let g = DiskGeometry::new(DEFAULT_DISK_SIZE, DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(g.chunk_count(), 25);
        assert_eq!(g.chunk_len(), 4 * 1024 * 1024);
    }

    #[test]
    fn test_check_range() {
        let g = DiskGeometry::new(8192, 4096).unwrap();
        assert!(g.check_range(DiskOp::Read, 0, 8192).is_ok());
        assert!(g.check_range(DiskOp::Read, 8191, 1).is_ok());
        assert!(g.check_range(DiskOp::Read, 100, 0).is_ok());
        assert!(g.check_range(DiskOp::Read, 8192, 0).is_err());
        assert!(g.check_range(DiskOp::Write, 8000, 193).is_err());
        assert!(g.check_range(DiskOp::Write, 1, u64::MAX).is_err());

        match g.check_range(DiskOp::Write, 8000, 500) {
            Err(DiskError::OutOfBounds {
                op,
                offset,
                length,
                size,
            }) => {
                assert_eq!(op, DiskOp::Write);
                assert_eq!((offset, length, size), (8000, 500, 8192));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_split_within_single_chunk() {
        let spans: Vec<_> = segments(123, 100, 4096).collect();
        assert_eq!(
            spans,
            vec![Segment {
                chunk_index: 0,
                chunk_offset: 123,
                len: 100,
                buffer_offset: 0,
            }]
        );
    }

    #[test]
    fn test_split_across_two_chunks() {
        let spans: Vec<_> = segments(4090, 12, 4096).collect();
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].chunk_index, spans[0].chunk_offset, spans[0].len), (0, 4090, 6));
        assert_eq!((spans[1].chunk_index, spans[1].chunk_offset, spans[1].len), (1, 0, 6));
        assert_eq!(spans[1].buffer_offset, 6);
    }

    #[test]
    fn test_zero_len() {
        let mut it = segments(77, 0, 4096);
        assert_eq!(it.len(), 0);
        assert!(it.next().is_none());
    }

    #[test]
    fn test_segments_tile_the_range() {
        for &chunk_size in &[1u64, 7, 512, 4096] {
            for &(offset, length) in &[(0u64, 1u64), (3, 4096), (4095, 2), (10, 20000), (8192, 8192)] {
                let spans = segments(offset, length, chunk_size);
                let hint = spans.len();
                let spans: Vec<_> = spans.collect();
                assert_eq!(spans.len(), hint);
                assert!(spans.len() as u64 <= length / chunk_size + 2);

                let mut next_global = offset;
                let mut total = 0;
                for s in &spans {
                    assert!(s.len > 0);
                    assert!(s.chunk_offset + s.len <= chunk_size);
                    assert_eq!(s.chunk_index * chunk_size + s.chunk_offset, next_global);
                    assert_eq!(s.buffer_offset, total);
                    next_global += s.len;
                    total += s.len;
                }
                assert_eq!(total, length);
            }
        }
    }

    #[test]
    fn test_segments_restart() {
        let spans = segments(100, 9000, 4096);
        let first: Vec<_> = spans.clone().collect();
        let second: Vec<_> = spans.collect();
        assert_eq!(first, second);
    }
}
