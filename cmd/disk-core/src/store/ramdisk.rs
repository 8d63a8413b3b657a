use std::sync::{PoisonError, RwLock};

use std::ops::Range;

use super::{check_within, ChunkStore};
use crate::error::{DiskError, DiskResult};
use crate::layout::DiskGeometry;

/// The whole device held in one zeroed buffer.
pub struct RamdiskStore {
    geometry: DiskGeometry,
    disk: RwLock<Vec<u8>>,
}

impl RamdiskStore {
    pub fn new(geometry: DiskGeometry) -> DiskResult<Self> {
        let len = usize::try_from(geometry.total_size()).map_err(|_| {
            DiskError::Config(format!(
                "disk size {} does not fit in memory",
                geometry.total_size()
            ))
        })?;
        tracing::info!("Allocating {} byte ramdisk", len);
        Ok(Self {
            geometry,
            disk: RwLock::new(vec![0u8; len]),
        })
    }

    fn chunk_bounds(&self, index: u64) -> DiskResult<std::ops::Range<usize>> {
        if index >= self.geometry.chunk_count() {
            return Err(DiskError::NoSuchChunk {
                index,
                count: self.geometry.chunk_count(),
            });
        }
        let start = (index * self.geometry.chunk_size()) as usize;
        Ok(start..start + self.geometry.chunk_len())
    }
}

#[tonic::async_trait]
impl ChunkStore for RamdiskStore {
    async fn read_chunk(&self, index: u64) -> DiskResult<Vec<u8>> {
        let range = self.chunk_bounds(index)?;
        let disk = self.disk.read().unwrap_or_else(PoisonError::into_inner);
        Ok(disk[range].to_vec())
    }

    async fn write_chunk(&self, index: u64, data: &[u8]) -> DiskResult<()> {
        let range = self.chunk_bounds(index)?;
        if data.len() != range.len() {
            return Err(DiskError::BufferSize {
                expected: range.len(),
                actual: data.len(),
            });
        }
        let mut disk = self.disk.write().unwrap_or_else(PoisonError::into_inner);
        disk[range].copy_from_slice(data);
        Ok(())
    }

    async fn read_range(&self, index: u64, range: Range<usize>) -> DiskResult<Vec<u8>> {
        let chunk = self.chunk_bounds(index)?;
        check_within(&range, chunk.len())?;
        let disk = self.disk.read().unwrap_or_else(PoisonError::into_inner);
        Ok(disk[chunk.start + range.start..chunk.start + range.end].to_vec())
    }

    async fn patch_chunk(&self, index: u64, offset: usize, data: &[u8]) -> DiskResult<()> {
        let chunk = self.chunk_bounds(index)?;
        let range = offset..offset.saturating_add(data.len());
        check_within(&range, chunk.len())?;
        let mut disk = self.disk.write().unwrap_or_else(PoisonError::into_inner);
        disk[chunk.start + range.start..chunk.start + range.end].copy_from_slice(data);
        Ok(())
    }
}
