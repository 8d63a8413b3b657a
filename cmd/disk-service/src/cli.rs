use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::{Args, Parser, Subcommand, ValueEnum};
use disk_core::store::object::DEFAULT_KEY_PREFIX;
use disk_core::store::S3Config;
use disk_core::{DiskError, DiskGeometry, DiskResult, DEFAULT_CHUNK_SIZE, DEFAULT_DISK_SIZE};

use crate::server::DEFAULT_MAX_MESSAGE_SIZE;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Parser)]
#[command(name = "g2disk")]
#[command(about = "Serve a chunked virtual block device over gRPC", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the disk over gRPC
    Serve(ServeArgs),
    /// Check that the backing bucket exists, creating it if asked to
    EnsureBucket(StorageArgs),
    /// Print the size and capabilities of a running disk service
    Info {
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        endpoint: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Whole disk in process memory, lost on exit
    Ramdisk,
    /// One object per chunk in an S3-compatible bucket
    S3,
}

#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Bucket holding the chunk objects
    #[arg(long, env = "G2DISK_BUCKET")]
    pub bucket: Option<String>,
    /// Custom object storage endpoint, e.g. a local test double
    #[arg(long, env = "G2DISK_ENDPOINT")]
    pub endpoint: Option<String>,
    #[arg(long)]
    pub region: Option<String>,
    /// Create the bucket if it does not exist
    #[arg(long)]
    pub auto_create_bucket: bool,
}

impl StorageArgs {
    pub fn s3_config(&self) -> DiskResult<S3Config> {
        let bucket = match self.bucket.as_deref() {
            Some(bucket) if !bucket.is_empty() => bucket.to_string(),
            _ => return Err(DiskError::Config("bucket name is required".into())),
        };
        Ok(S3Config {
            bucket,
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            force_path_style: self.endpoint.is_some(),
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, value_enum, default_value_t = Backend::S3)]
    pub backend: Backend,
    #[command(flatten)]
    pub storage: StorageArgs,
    /// Chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,
    /// Disk size in bytes, a multiple of the chunk size
    #[arg(long, default_value_t = DEFAULT_DISK_SIZE)]
    pub disk_size: u64,
    #[arg(long, default_value = DEFAULT_KEY_PREFIX)]
    pub key_prefix: String,
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Largest gRPC message accepted or sent, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
}

impl ServeArgs {
    pub fn geometry(&self) -> DiskResult<DiskGeometry> {
        DiskGeometry::new(self.disk_size, self.chunk_size)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
