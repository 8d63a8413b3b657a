//! S3-compatible object backend built on aws-sdk-s3.
//!
//! Every chunk is moved with a single GetObject/PutObject call; chunks are
//! small enough that multipart uploads buy nothing and would make a chunk
//! write non-atomic.

use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;

use super::ObjectBackend;
use crate::bucket::{BucketAdmin, BucketProbe};
use crate::error::{BoxError, DiskError, DiskResult};

const FALLBACK_REGION: &str = "us-east-1";

/// Whether a failed GetObject means the chunk object simply does not exist.
///
/// A 404 is only taken as an absent object when the service did not name some
/// other missing resource; `NoSuchBucket` must not read back as zeroes.
fn is_absent_object(no_such_key: bool, code: Option<&str>, status: Option<u16>) -> bool {
    if no_such_key {
        return true;
    }
    match code {
        Some("NoSuchKey") | Some("NotFound") => true,
        Some(_) => false,
        None => status == Some(404),
    }
}

#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub bucket: String,
    /// Falls back to the environment/profile, then to `us-east-1`.
    pub region: Option<String>,
    /// Custom endpoint URL (MinIO, localstack, fake-gcs-server, ...)
    pub endpoint: Option<String>,
    /// Path-style addressing; needed by most S3 test doubles.
    pub force_path_style: bool,
}

#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    config: S3Config,
}

impl S3Backend {
    pub async fn new(bucket: impl Into<String>) -> DiskResult<Self> {
        Self::with_config(S3Config {
            bucket: bucket.into(),
            ..Default::default()
        })
        .await
    }

    pub async fn with_config(config: S3Config) -> DiskResult<Self> {
        if config.bucket.is_empty() {
            return Err(DiskError::Config("bucket name is required".into()));
        }

        let region = match &config.region {
            Some(region) => RegionProviderChain::first_try(Region::new(region.clone())),
            None => RegionProviderChain::default_provider(),
        }
        .or_else(Region::new(FALLBACK_REGION));

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            tracing::info!("Using custom object storage endpoint {}", endpoint);
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            config,
        })
    }

    /// Wraps an already configured client.
    pub fn with_client(client: Client, config: S3Config) -> DiskResult<Self> {
        if config.bucket.is_empty() {
            return Err(DiskError::Config("bucket name is required".into()));
        }
        Ok(Self { client, config })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn location_constraint(&self) -> Option<CreateBucketConfiguration> {
        // us-east-1 rejects an explicit constraint.
        match self.config.region.as_deref() {
            None | Some(FALLBACK_REGION) => None,
            Some(region) => Some(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            ),
        }
    }
}

#[tonic::async_trait]
impl ObjectBackend for S3Backend {
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await;
        match resp {
            Ok(output) => {
                let data = output.body.collect().await?.into_bytes();
                Ok(Some(data.to_vec()))
            }
            Err(e) => {
                let no_such_key = e.as_service_error().map_or(false, |se| se.is_no_such_key());
                let status = e.raw_response().map(|r| r.status().as_u16());
                if is_absent_object(no_such_key, e.code(), status) {
                    Ok(None)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn put_object(&self, key: &str, data: &[u8]) -> Result<(), BoxError> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await?;
        Ok(())
    }
}

#[tonic::async_trait]
impl BucketAdmin for S3Backend {
    async fn probe_bucket(&self, bucket: &str) -> BucketProbe {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => BucketProbe::Exists,
            Err(e) => {
                let not_found = e.as_service_error().map_or(false, |se| se.is_not_found());
                let status = e.raw_response().map(|r| r.status().as_u16());
                if not_found || status == Some(404) {
                    BucketProbe::Missing
                } else {
                    BucketProbe::Inconclusive(e.into())
                }
            }
        }
    }

    async fn list_probe(&self, bucket: &str) -> Result<bool, BoxError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(1)
            .send()
            .await;
        match resp {
            Ok(_) => Ok(true),
            Err(e) => {
                let no_such_bucket = e
                    .as_service_error()
                    .map_or(false, |se| se.is_no_such_bucket());
                let status = e.raw_response().map(|r| r.status().as_u16());
                if no_such_bucket || status == Some(404) {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), BoxError> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(self.location_constraint())
            .send()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requires_bucket() {
        let err = S3Backend::with_config(S3Config::default()).await.err().unwrap();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_location_constraint() {
        let backend = S3Backend::with_config(S3Config {
            bucket: "disks".into(),
            region: Some("eu-west-1".into()),
            endpoint: Some("http://127.0.0.1:9000".into()),
            force_path_style: true,
        })
        .await
        .unwrap();
        assert_eq!(backend.bucket(), "disks");
        let constraint = backend.location_constraint().unwrap();
        assert_eq!(
            constraint.location_constraint(),
            Some(&BucketLocationConstraint::EuWest1)
        );

        let backend = S3Backend::with_config(S3Config {
            bucket: "disks".into(),
            region: Some(FALLBACK_REGION.into()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(backend.location_constraint().is_none());
    }

    #[test]
    fn test_absent_object_classification() {
        assert!(is_absent_object(true, Some("NoSuchKey"), Some(404)));
        assert!(is_absent_object(false, Some("NoSuchKey"), Some(404)));
        assert!(is_absent_object(false, None, Some(404)));
        assert!(!is_absent_object(false, Some("NoSuchBucket"), Some(404)));
        assert!(!is_absent_object(false, Some("AccessDenied"), Some(403)));
        assert!(!is_absent_object(false, None, Some(500)));
        assert!(!is_absent_object(false, None, None));
    }

    /// Answers every request with the same status line and XML body.
    async fn stub_object_service(status: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let response = format!(
                        "HTTP/1.1 {}\r\ncontent-type: application/xml\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    fn stub_store(endpoint: String) -> crate::store::ObjectChunkStore<S3Backend> {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(FALLBACK_REGION))
            .endpoint_url(endpoint)
            .force_path_style(true)
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                "test", "test", None, None, "static",
            ))
            .build();
        let backend = S3Backend::with_client(
            Client::from_conf(conf),
            S3Config {
                bucket: "disks".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let geometry = crate::layout::DiskGeometry::new(64, 32).unwrap();
        crate::store::ObjectChunkStore::new(backend, geometry, "chunk")
    }

    #[tokio::test]
    async fn test_missing_key_reads_as_zero() {
        use crate::store::ChunkStore;

        let endpoint = stub_object_service(
            "404 Not Found",
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>",
        )
        .await;
        let store = stub_store(endpoint);
        assert_eq!(store.read_chunk(0).await.unwrap(), vec![0u8; 32]);
    }

    #[tokio::test]
    async fn test_missing_bucket_is_a_backend_error() {
        use crate::error::DiskOp;
        use crate::store::ChunkStore;

        let endpoint = stub_object_service(
            "404 Not Found",
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>NoSuchBucket</Code><Message>The specified bucket does not exist</Message></Error>",
        )
        .await;
        let store = stub_store(endpoint);
        let err = store.read_chunk(0).await.unwrap_err();
        assert!(matches!(
            err,
            DiskError::Backend {
                op: DiskOp::Read,
                index: 0,
                ..
            }
        ));
    }
}
