//! Chunk store over an object storage service: one object per chunk.

use super::ChunkStore;
use crate::error::{BoxError, DiskError, DiskOp, DiskResult};
use crate::layout::DiskGeometry;

pub const DEFAULT_KEY_PREFIX: &str = "chunk";

/// Minimal get/put surface the chunk store needs from an object service.
#[tonic::async_trait]
pub trait ObjectBackend: Send + Sync {
    /// `Ok(None)` when the key does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError>;
    /// Replaces the whole object in a single request.
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<(), BoxError>;
}

#[tonic::async_trait]
impl<B: ObjectBackend + ?Sized> ObjectBackend for std::sync::Arc<B> {
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        (**self).get_object(key).await
    }

    async fn put_object(&self, key: &str, data: &[u8]) -> Result<(), BoxError> {
        (**self).put_object(key, data).await
    }
}

pub struct ObjectChunkStore<B: ObjectBackend> {
    backend: B,
    geometry: DiskGeometry,
    key_prefix: String,
}

impl<B: ObjectBackend> ObjectChunkStore<B> {
    pub fn new(backend: B, geometry: DiskGeometry, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            geometry,
            key_prefix: key_prefix.into(),
        }
    }

    /// Zero-padded so lexicographic key order matches chunk order.
    pub fn key_for(&self, index: u64) -> String {
        format!("{}-{:08}", self.key_prefix, index)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn check_index(&self, index: u64) -> DiskResult<()> {
        if index >= self.geometry.chunk_count() {
            return Err(DiskError::NoSuchChunk {
                index,
                count: self.geometry.chunk_count(),
            });
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl<B: ObjectBackend> ChunkStore for ObjectChunkStore<B> {
    async fn read_chunk(&self, index: u64) -> DiskResult<Vec<u8>> {
        self.check_index(index)?;
        let key = self.key_for(index);
        let expected = self.geometry.chunk_len();
        match self.backend.get_object(&key).await {
            Ok(Some(data)) if data.len() == expected => Ok(data),
            Ok(Some(data)) => Err(DiskError::CorruptChunk {
                index,
                expected,
                actual: data.len(),
            }),
            Ok(None) => {
                tracing::trace!("Chunk {} absent, reading zeroes", key);
                Ok(vec![0u8; expected])
            }
            Err(e) => Err(DiskError::backend(DiskOp::Read, index, e)),
        }
    }

    async fn write_chunk(&self, index: u64, data: &[u8]) -> DiskResult<()> {
        self.check_index(index)?;
        let expected = self.geometry.chunk_len();
        if data.len() != expected {
            return Err(DiskError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        let key = self.key_for(index);
        self.backend
            .put_object(&key, data)
            .await
            .map_err(|e| DiskError::backend(DiskOp::Write, index, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectBackend;
    use std::sync::Arc;

    fn store(backend: Arc<MemoryObjectBackend>) -> ObjectChunkStore<Arc<MemoryObjectBackend>> {
        ObjectChunkStore::new(backend, DiskGeometry::new(128, 32).unwrap(), DEFAULT_KEY_PREFIX)
    }

    #[test]
    fn test_key_format() {
        let store = store(Arc::new(MemoryObjectBackend::new()));
        assert_eq!(store.key_for(0), "chunk-00000000");
        assert_eq!(store.key_for(42), "chunk-00000042");
        assert!(store.key_for(9) < store.key_for(10));
    }

    #[tokio::test]
    async fn test_absent_chunk_reads_as_zero() {
        let backend = Arc::new(MemoryObjectBackend::new());
        let store = store(backend.clone());
        assert_eq!(store.read_chunk(3).await.unwrap(), vec![0u8; 32]);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_write_replaces_object() {
        let backend = Arc::new(MemoryObjectBackend::new());
        let store = store(backend.clone());
        store.write_chunk(1, &[5u8; 32]).await.unwrap();
        store.write_chunk(1, &[6u8; 32]).await.unwrap();
        assert_eq!(backend.object("chunk-00000001"), Some(vec![6u8; 32]));
        assert_eq!(store.read_chunk(1).await.unwrap(), vec![6u8; 32]);
    }

    #[tokio::test]
    async fn test_short_object_is_corrupt() {
        let backend = Arc::new(MemoryObjectBackend::new());
        backend.insert("chunk-00000000", vec![1u8; 7]);
        let store = store(backend);
        assert!(matches!(
            store.read_chunk(0).await,
            Err(DiskError::CorruptChunk {
                index: 0,
                expected: 32,
                actual: 7
            })
        ));
    }

    #[tokio::test]
    async fn test_backend_failures_surface() {
        let backend = Arc::new(MemoryObjectBackend::new());
        backend.fail_gets(true);
        backend.fail_puts(true);
        let store = store(backend);
        assert!(matches!(
            store.read_chunk(2).await,
            Err(DiskError::Backend {
                op: DiskOp::Read,
                index: 2,
                ..
            })
        ));
        assert!(matches!(
            store.write_chunk(2, &[0u8; 32]).await,
            Err(DiskError::Backend {
                op: DiskOp::Write,
                index: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_custom_prefix() {
        let backend = Arc::new(MemoryObjectBackend::new());
        let store = ObjectChunkStore::new(backend.clone(), DiskGeometry::new(64, 32).unwrap(), "vol7");
        store.write_chunk(1, &[1u8; 32]).await.unwrap();
        assert_eq!(backend.keys(), vec!["vol7-00000001".to_string()]);
    }
}
