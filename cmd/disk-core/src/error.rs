use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type DiskResult<T> = Result<T, DiskError>;

/// Which side of the disk contract an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskOp {
    Read,
    Write,
}

impl fmt::Display for DiskOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskOp::Read => f.write_str("read"),
            DiskOp::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("invalid disk configuration: {0}")]
    Config(String),
    #[error("bucket `{0}` does not exist and auto-create is disabled")]
    MissingBucket(String),
    #[error("{op} request (offset {offset}, size {length}) out of bounds for disk size {size}")]
    OutOfBounds {
        op: DiskOp,
        offset: u64,
        length: u64,
        size: u64,
    },
    #[error("{op} of chunk {index} failed: {source}")]
    Backend {
        op: DiskOp,
        index: u64,
        #[source]
        source: BoxError,
    },
    #[error("bucket `{bucket}` {action} failed: {source}")]
    Bucket {
        bucket: String,
        action: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("chunk {index} holds {actual} bytes, expected {expected}")]
    CorruptChunk {
        index: u64,
        expected: usize,
        actual: usize,
    },
    #[error("chunk {index} is outside the device ({count} chunks)")]
    NoSuchChunk { index: u64, count: u64 },
    #[error("chunk buffer of {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("{op} deadline exceeded after {completed} of {total} chunks")]
    DeadlineExceeded {
        op: DiskOp,
        completed: usize,
        total: usize,
    },
}

impl DiskError {
    pub(crate) fn backend(op: DiskOp, index: u64, source: impl Into<BoxError>) -> Self {
        DiskError::Backend {
            op,
            index,
            source: source.into(),
        }
    }

    /// Errors that must stop the process before it serves traffic.
    pub fn is_config(&self) -> bool {
        matches!(self, DiskError::Config(_) | DiskError::MissingBucket(_))
    }
}
