use std::sync::Arc;

use anyhow::{Context, Result};
use disk_core::store::{ChunkStore, ObjectChunkStore, RamdiskStore, S3Backend};
use disk_core::{ensure_bucket, RemoteDisk, VirtualDisk};
use tonic::transport::Server;

use crate::cli::{Backend, ServeArgs, StorageArgs};
use crate::server::build_disk_server;

pub async fn serve(args: ServeArgs) -> Result<()> {
    let geometry = args.geometry()?;
    tracing::info!(
        "Disk size {} bytes in {} chunks of {} bytes",
        geometry.total_size(),
        geometry.chunk_count(),
        geometry.chunk_size()
    );

    let store: Arc<dyn ChunkStore> = match args.backend {
        Backend::Ramdisk => Arc::new(RamdiskStore::new(geometry)?),
        Backend::S3 => {
            let backend = connect_bucket(&args.storage).await?;
            tracing::info!(
                "Storing chunks in bucket {} with key prefix {}",
                backend.bucket(),
                args.key_prefix
            );
            Arc::new(ObjectChunkStore::new(backend, geometry, args.key_prefix.clone()))
        }
    };

    let disk = Arc::new(VirtualDisk::new(geometry, store));
    let addr = args.addr();
    tracing::info!("Disk service listening on {}", addr);

    Server::builder()
        .add_service(build_disk_server(disk, args.max_message_size))
        .serve_with_shutdown(addr, shutdown_signal())
        .await
        .with_context(|| format!("Disk service on {} failed", addr))?;

    tracing::info!("Disk service stopped");
    Ok(())
}

pub async fn ensure(args: StorageArgs) -> Result<()> {
    let backend = connect_bucket(&args).await?;
    tracing::info!("Bucket {} is ready", backend.bucket());
    Ok(())
}

pub async fn info(endpoint: &str) -> Result<()> {
    let disk = RemoteDisk::connect(endpoint).await?;
    let size = disk.get_size().await?;
    println!("endpoint:   {}", endpoint);
    println!("size:       {} bytes", size);
    println!("multi-conn: {}", disk.can_multi_conn());
    println!("writable:   {}", disk.can_write());
    Ok(())
}

async fn connect_bucket(args: &StorageArgs) -> Result<S3Backend> {
    let config = args.s3_config()?;
    let backend = S3Backend::with_config(config).await?;
    let bucket = backend.bucket().to_string();
    ensure_bucket(&backend, &bucket, args.auto_create_bucket)
        .await
        .with_context(|| format!("Bucket {} is not usable", bucket))?;
    Ok(backend)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
