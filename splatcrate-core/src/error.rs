//! Error types for splatcrate

use thiserror::Error;

/// Main error type for splatcrate operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Malformed PLY header: {0}")]
    HeaderMalformed(String),

    #[error("Truncated PLY body: expected {expected} records, read {read}")]
    TruncatedRecords { expected: usize, read: usize },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("Shader error: {0}")]
    Shader(String),

    #[error(transparent)]
    DescriptorPoolExhausted(#[from] PoolExhausted),
}

/// Returned when a descriptor pool cannot satisfy an allocation.
///
/// This is recoverable: the caller decides whether to reset the pool, skip the
/// allocation or escalate it into an [`Error`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("descriptor pool exhausted: {reason}")]
pub struct PoolExhausted {
    pub reason: String,
}

impl PoolExhausted {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}
