use anyhow::{Context, Result};
use proto::g2disk::{
    g2_disk_service_client::G2DiskServiceClient, GetSizeRequest, ReadRequest, WriteRequest,
};
use tonic::transport::Channel;

/// Client side of the disk RPC contract, as used by a block-device bridge.
#[derive(Clone)]
pub struct RemoteDisk {
    client: G2DiskServiceClient<Channel>,
}

impl RemoteDisk {
    pub async fn connect<D: Into<String>>(dst: D) -> Result<Self> {
        let dst = dst.into();
        let channel = Channel::from_shared(dst.clone())
            .with_context(|| format!("Invalid disk service endpoint {}", dst))?
            .connect()
            .await
            .with_context(|| format!("Failed to connect to disk service at {}", dst))?;
        Ok(Self::with_channel(channel))
    }

    pub fn with_channel(channel: Channel) -> Self {
        Self {
            client: G2DiskServiceClient::new(channel)
                .max_decoding_message_size(usize::MAX)
                .max_encoding_message_size(usize::MAX),
        }
    }

    pub async fn get_size(&self) -> Result<u64> {
        tracing::debug!("Getting the disk size");
        let mut client = self.client.clone();
        let resp = client
            .get_size(GetSizeRequest {})
            .await
            .context("Unable to get the disk size")?;
        Ok(resp.into_inner().size)
    }

    /// Fills `buf` with the bytes at `offset`.
    pub async fn pread(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mut client = self.client.clone();
        let req = ReadRequest {
            offset,
            read_size: buf.len() as u64,
        };
        let payload = client
            .read(req)
            .await
            .with_context(|| {
                format!(
                    "Unable to read the disk at offset: {}, length: {}",
                    offset,
                    buf.len()
                )
            })?
            .into_inner()
            .payload;
        if payload.len() != buf.len() {
            anyhow::bail!(
                "Short read at offset {}: got {} of {} bytes",
                offset,
                payload.len(),
                buf.len()
            );
        }
        buf.copy_from_slice(&payload);
        Ok(())
    }

    pub async fn pwrite(&self, buf: &[u8], offset: u64) -> Result<()> {
        let mut client = self.client.clone();
        let req = WriteRequest {
            offset,
            payload: buf.to_vec(),
        };
        client
            .write(req)
            .await
            .with_context(|| format!("Unable to write the disk at offset {}", offset))?;
        Ok(())
    }

    /// The server does not coordinate writers across connections.
    pub fn can_multi_conn(&self) -> bool {
        false
    }

    pub fn can_write(&self) -> bool {
        true
    }
}
