//! Chunk stores.
//!
//! A [`ChunkStore`] moves whole chunks in and out of backing storage:
//! - `ramdisk`: one flat in-memory buffer, every chunk always present
//! - `object`: one object per chunk over any [`ObjectBackend`], absent objects
//!   read as zeroes
//! - `s3`: the S3-compatible [`ObjectBackend`]
//! - `memory`: an in-process [`ObjectBackend`] for tests and local runs

use std::ops::Range;

use crate::error::{DiskError, DiskResult};

pub mod memory;
pub mod object;
pub mod ramdisk;
pub mod s3;

pub use memory::MemoryObjectBackend;
pub use object::{ObjectBackend, ObjectChunkStore};
pub use ramdisk::RamdiskStore;
pub use s3::{S3Backend, S3Config};

/// Chunk access to the device's backing storage.
///
/// Buffers passed to `write_chunk` and returned by `read_chunk` are always
/// exactly one chunk long. The ranged methods default to a whole-chunk
/// read-modify-write; stores that can address bytes in place override them.
/// Callers serialize `patch_chunk` calls on the same chunk.
#[tonic::async_trait]
pub trait ChunkStore: Send + Sync {
    async fn read_chunk(&self, index: u64) -> DiskResult<Vec<u8>>;
    async fn write_chunk(&self, index: u64, data: &[u8]) -> DiskResult<()>;

    /// Reads `range` (chunk-relative) out of one chunk.
    async fn read_range(&self, index: u64, range: Range<usize>) -> DiskResult<Vec<u8>> {
        let chunk = self.read_chunk(index).await?;
        check_within(&range, chunk.len())?;
        Ok(chunk[range].to_vec())
    }

    /// Overwrites `data.len()` bytes of one chunk starting at `offset`,
    /// leaving the rest of the chunk unchanged.
    async fn patch_chunk(&self, index: u64, offset: usize, data: &[u8]) -> DiskResult<()> {
        let mut chunk = self.read_chunk(index).await?;
        let range = offset..offset.saturating_add(data.len());
        check_within(&range, chunk.len())?;
        chunk[range].copy_from_slice(data);
        self.write_chunk(index, &chunk).await
    }
}

pub(crate) fn check_within(range: &Range<usize>, chunk_len: usize) -> DiskResult<()> {
    if range.start > range.end || range.end > chunk_len {
        return Err(DiskError::BufferSize {
            expected: chunk_len,
            actual: range.end,
        });
    }
    Ok(())
}
