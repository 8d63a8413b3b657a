use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tonic::{Request, Response, Status};

use disk_core::{DiskError, VirtualDisk};
use proto::g2disk::{
    g2_disk_service_server::{G2DiskService, G2DiskServiceServer},
    GetSizeRequest, GetSizeResponse, ReadRequest, ReadResponse, WriteRequest, WriteResponse,
};

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Room for the protobuf tag, length prefix and offset field around a payload
/// of `max_message_size` bytes, so size violations reach the handlers.
const FRAMING_HEADROOM: usize = 32;

pub struct DiskService {
    disk: Arc<VirtualDisk>,
    max_message_size: usize,
}

impl DiskService {
    pub fn new(disk: Arc<VirtualDisk>, max_message_size: usize) -> Self {
        Self {
            disk,
            max_message_size,
        }
    }
}

#[tonic::async_trait]
impl G2DiskService for DiskService {
    async fn get_size(
        &self,
        _request: Request<GetSizeRequest>,
    ) -> Result<Response<GetSizeResponse>, Status> {
        Ok(Response::new(GetSizeResponse {
            size: self.disk.size(),
        }))
    }

    async fn read(&self, request: Request<ReadRequest>) -> Result<Response<ReadResponse>, Status> {
        let deadline = request_deadline(&request);
        let ReadRequest { offset, read_size } = request.into_inner();
        tracing::debug!("Read offset {} size {}", offset, read_size);

        if read_size > self.max_message_size as u64 {
            return Err(Status::invalid_argument(format!(
                "read size {} exceeds the maximum message size {}",
                read_size, self.max_message_size
            )));
        }

        let payload = self
            .disk
            .read_until(offset, read_size, deadline)
            .await
            .map_err(status_from)?;
        Ok(Response::new(ReadResponse { payload }))
    }

    async fn write(
        &self,
        request: Request<WriteRequest>,
    ) -> Result<Response<WriteResponse>, Status> {
        let deadline = request_deadline(&request);
        let WriteRequest { offset, payload } = request.into_inner();
        tracing::debug!("Write offset {} size {}", offset, payload.len());

        if payload.len() > self.max_message_size {
            return Err(Status::invalid_argument(format!(
                "write size {} exceeds the maximum message size {}",
                payload.len(),
                self.max_message_size
            )));
        }

        self.disk
            .write_until(offset, &payload, deadline)
            .await
            .map_err(status_from)?;
        Ok(Response::new(WriteResponse {}))
    }
}

pub fn build_disk_server(
    disk: Arc<VirtualDisk>,
    max_message_size: usize,
) -> G2DiskServiceServer<DiskService> {
    let wire_limit = max_message_size.saturating_add(FRAMING_HEADROOM);
    G2DiskServiceServer::new(DiskService::new(disk, max_message_size))
        .max_decoding_message_size(wire_limit)
        .max_encoding_message_size(wire_limit)
}

/// Maps engine failures onto gRPC codes, keeping the engine's message.
pub fn status_from(err: DiskError) -> Status {
    let message = err.to_string();
    let status = match err {
        DiskError::OutOfBounds { .. } => Status::out_of_range(message),
        DiskError::DeadlineExceeded { .. } => Status::deadline_exceeded(message),
        DiskError::Config(_) | DiskError::MissingBucket(_) => Status::failed_precondition(message),
        DiskError::Backend { .. } | DiskError::Bucket { .. } => Status::unavailable(message),
        DiskError::CorruptChunk { .. } => Status::data_loss(message),
        DiskError::NoSuchChunk { .. } | DiskError::BufferSize { .. } => Status::internal(message),
    };
    tracing::warn!("Request failed: {}", status.message());
    status
}

fn request_deadline<T>(request: &Request<T>) -> Option<Instant> {
    let value = request.metadata().get("grpc-timeout")?.to_str().ok()?;
    parse_grpc_timeout(value).map(|timeout| Instant::now() + timeout)
}

/// Parses a `grpc-timeout` header value: up to 8 digits and a unit.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if !value.is_ascii() || value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount * 60 * 60)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}
