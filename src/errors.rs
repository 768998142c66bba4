use thiserror::Error;

use crate::pattern::RecordId;

/// Every failure kind the storage-and-retrieval engine can surface.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("pattern length mismatch: {a} vs {b}")]
    PatternLengthMismatch { a: usize, b: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("corrupt segment: {0}")]
    CorruptSegment(String),

    #[error("segment I/O error: {0}")]
    SegmentIoError(#[from] std::io::Error),

    #[error("compaction failed: {0}")]
    CompactionFailed(String),

    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("metadata store error: {0}")]
    Json(#[from] serde_json::Error),
}
