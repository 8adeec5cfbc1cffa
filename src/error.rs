//! Error types for the store pool.

use crate::types::StoreId;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No metadata store registered")]
    NoMetadataStore,

    #[error("Metadata store already registered (rejected store {0})")]
    MetadataAlreadyRegistered(StoreId),

    #[error("Store already registered: {0}")]
    DuplicateStore(StoreId),

    #[error("Store not found: {0}")]
    StoreNotFound(StoreId),

    #[error("No store at path: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Unsupported engine type: {0}")]
    UnsupportedEngine(String),

    #[error("Corrupt checkpoint: {0}")]
    CorruptCheckpoint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Batch {index} failed: {source}")]
    BatchFailed {
        index: usize,
        #[source]
        source: Box<PoolError>,
    },
}

impl PoolError {
    /// Wrap an error with the position of the batch that produced it.
    pub(crate) fn at_batch(index: usize, err: PoolError) -> Self {
        PoolError::BatchFailed {
            index,
            source: Box::new(err),
        }
    }

    /// The underlying error, looking through `BatchFailed`.
    pub fn root_cause(&self) -> &PoolError {
        match self {
            PoolError::BatchFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Index of the failing batch for multi-item apply errors.
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            PoolError::BatchFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(e: serde_json::Error) -> Self {
        PoolError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for PoolError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        PoolError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for PoolError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        PoolError::Deserialization(e.to_string())
    }
}

impl From<prost::DecodeError> for PoolError {
    fn from(e: prost::DecodeError) -> Self {
        PoolError::Deserialization(e.to_string())
    }
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
