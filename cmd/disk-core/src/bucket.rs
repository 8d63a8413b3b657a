//! Making sure the bucket that holds the chunks exists before serving.

use crate::error::{BoxError, DiskError, DiskResult};

/// Result of the cheap metadata probe on a bucket.
#[derive(Debug)]
pub enum BucketProbe {
    Exists,
    Missing,
    /// The probe neither confirmed nor ruled out the bucket (permission quirks,
    /// region redirects, services that do not implement the call).
    Inconclusive(BoxError),
}

#[tonic::async_trait]
pub trait BucketAdmin: Send + Sync {
    async fn probe_bucket(&self, bucket: &str) -> BucketProbe;
    /// Secondary existence check by listing at most one key.
    async fn list_probe(&self, bucket: &str) -> Result<bool, BoxError>;
    async fn create_bucket(&self, bucket: &str) -> Result<(), BoxError>;
}

pub async fn bucket_exists(admin: &dyn BucketAdmin, bucket: &str) -> DiskResult<bool> {
    match admin.probe_bucket(bucket).await {
        BucketProbe::Exists => Ok(true),
        BucketProbe::Missing => Ok(false),
        BucketProbe::Inconclusive(e) => {
            tracing::warn!(
                "Metadata probe on bucket {} inconclusive ({}), falling back to listing",
                bucket,
                e
            );
            admin
                .list_probe(bucket)
                .await
                .map_err(|source| DiskError::Bucket {
                    bucket: bucket.to_string(),
                    action: "listing",
                    source,
                })
        }
    }
}

pub async fn ensure_bucket(admin: &dyn BucketAdmin, bucket: &str, auto_create: bool) -> DiskResult<()> {
    if bucket.is_empty() {
        return Err(DiskError::Config("bucket name is required".into()));
    }
    if bucket_exists(admin, bucket).await? {
        tracing::info!("Using existing bucket {}", bucket);
        return Ok(());
    }
    if !auto_create {
        return Err(DiskError::MissingBucket(bucket.to_string()));
    }
    tracing::info!("Bucket {} not found, creating it", bucket);
    admin
        .create_bucket(bucket)
        .await
        .map_err(|source| DiskError::Bucket {
            bucket: bucket.to_string(),
            action: "creation",
            source,
        })?;
    tracing::info!("Created bucket {}", bucket);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectBackend;

    #[tokio::test]
    async fn test_existing_bucket() {
        let backend = MemoryObjectBackend::with_bucket("disks");
        ensure_bucket(&backend, "disks", false).await.unwrap();
        assert_eq!(backend.bucket_creations(), 0);
    }

    #[tokio::test]
    async fn test_missing_bucket_without_auto_create() {
        let backend = MemoryObjectBackend::new();
        let err = ensure_bucket(&backend, "disks", false).await.unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("disks"));
        assert!(!backend.has_bucket("disks"));
    }

    #[tokio::test]
    async fn test_missing_bucket_is_created() {
        let backend = MemoryObjectBackend::new();
        ensure_bucket(&backend, "disks", true).await.unwrap();
        assert!(backend.has_bucket("disks"));
        assert_eq!(backend.bucket_creations(), 1);

        ensure_bucket(&backend, "disks", true).await.unwrap();
        assert_eq!(backend.bucket_creations(), 1);
    }

    #[tokio::test]
    async fn test_inconclusive_probe_falls_back_to_listing() {
        let backend = MemoryObjectBackend::with_bucket("disks");
        backend.inconclusive_probes(true);
        assert!(bucket_exists(&backend, "disks").await.unwrap());
        assert!(!bucket_exists(&backend, "other").await.unwrap());
        assert_eq!(backend.list_probes(), 2);
    }

    #[tokio::test]
    async fn test_listing_failure_is_reported() {
        let backend = MemoryObjectBackend::with_bucket("disks");
        backend.inconclusive_probes(true);
        backend.fail_gets(true);
        let err = ensure_bucket(&backend, "disks", true).await.unwrap_err();
        assert!(matches!(err, DiskError::Bucket { action: "listing", .. }));
    }

    #[tokio::test]
    async fn test_empty_bucket_name() {
        let backend = MemoryObjectBackend::new();
        assert!(ensure_bucket(&backend, "", true).await.unwrap_err().is_config());
    }
}
