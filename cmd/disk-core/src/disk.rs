use std::sync::Arc;

use tokio::time::Instant;

use crate::error::{DiskError, DiskOp, DiskResult};
use crate::layout::{DiskGeometry, Segment};
use crate::lock::ChunkLockTable;
use crate::store::ChunkStore;

/// The virtual block device: a fixed-size byte address space laid over a
/// [`ChunkStore`].
///
/// Requests are handled independently. Writes hold a per-chunk lock around
/// each read-modify-write so concurrent writers to one chunk never lose an
/// update. A multi-chunk write is not atomic: if it fails part way, the chunks
/// before the failure keep their new contents.
pub struct VirtualDisk {
    geometry: DiskGeometry,
    store: Arc<dyn ChunkStore>,
    locks: Option<ChunkLockTable>,
}

impl VirtualDisk {
    pub fn new(geometry: DiskGeometry, store: Arc<dyn ChunkStore>) -> Self {
        Self {
            geometry,
            store,
            locks: Some(ChunkLockTable::new()),
        }
    }

    /// Drops per-chunk locking. Concurrent writers to the same chunk can then
    /// overwrite each other's changes.
    pub fn without_chunk_locks(mut self) -> Self {
        self.locks = None;
        self
    }

    pub fn geometry(&self) -> DiskGeometry {
        self.geometry
    }

    pub fn size(&self) -> u64 {
        self.geometry.total_size()
    }

    pub async fn read(&self, offset: u64, length: u64) -> DiskResult<Vec<u8>> {
        self.read_until(offset, length, None).await
    }

    pub async fn write(&self, offset: u64, payload: &[u8]) -> DiskResult<()> {
        self.write_until(offset, payload, None).await
    }

    pub async fn read_until(
        &self,
        offset: u64,
        length: u64,
        deadline: Option<Instant>,
    ) -> DiskResult<Vec<u8>> {
        self.geometry.check_range(DiskOp::Read, offset, length)?;

        let segments = self.geometry.segments(offset, length);
        let total = segments.len();
        let mut out = vec![0u8; length as usize];
        for (done, segment) in segments.enumerate() {
            check_deadline(DiskOp::Read, deadline, done, total)?;
            let data = self
                .store
                .read_range(segment.chunk_index, segment.chunk_range())
                .await?;
            out[segment.buffer_range()].copy_from_slice(&data);
        }
        tracing::trace!("Read {} bytes at {} across {} chunks", length, offset, total);
        Ok(out)
    }

    pub async fn write_until(
        &self,
        offset: u64,
        payload: &[u8],
        deadline: Option<Instant>,
    ) -> DiskResult<()> {
        let length = payload.len() as u64;
        self.geometry.check_range(DiskOp::Write, offset, length)?;

        let segments = self.geometry.segments(offset, length);
        let total = segments.len();
        for (done, segment) in segments.enumerate() {
            check_deadline(DiskOp::Write, deadline, done, total)?;
            if let Err(e) = self.write_segment(&segment, payload).await {
                if done > 0 {
                    tracing::warn!(
                        "Write at {} ({} bytes) failed after {} of {} chunks were written",
                        offset,
                        length,
                        done,
                        total
                    );
                }
                return Err(e);
            }
        }
        tracing::trace!("Wrote {} bytes at {} across {} chunks", length, offset, total);
        Ok(())
    }

    async fn write_segment(&self, segment: &Segment, payload: &[u8]) -> DiskResult<()> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.lock(segment.chunk_index).await),
            None => None,
        };
        self.store
            .patch_chunk(
                segment.chunk_index,
                segment.chunk_offset as usize,
                &payload[segment.buffer_range()],
            )
            .await
    }
}

fn check_deadline(op: DiskOp, deadline: Option<Instant>, completed: usize, total: usize) -> DiskResult<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(DiskError::DeadlineExceeded {
            op,
            completed,
            total,
        }),
        _ => Ok(()),
    }
}
