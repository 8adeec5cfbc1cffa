//! Storage engines the pool holds open.
//!
//! The pool never looks inside a batch. It only needs an engine to read a
//! key, hand out batches bound to itself, and durably write those batches.
//! A batch can be dumped to an opaque byte string and loaded back into a
//! fresh batch of any engine, which is what makes replication possible.

mod log;
mod memory;

pub use self::log::LogEngine;
pub use self::memory::MemoryEngine;

use crate::config::EngineOptions;
use crate::error::{PoolError, Result};
use crate::types::{ENGINE_LOGKV, ENGINE_MEMORY};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Magic bytes for a batch dump.
const BATCH_MAGIC: &[u8; 4] = b"BAT\0";

/// Current batch dump format version.
const BATCH_VERSION: u8 = 1;

/// Dump header size (magic + version + payload length).
const BATCH_HEADER_SIZE: usize = 4 + 1 + 4;

/// An opened key-value store.
pub trait Engine: Send + Sync {
    /// Engine type tag.
    fn kind(&self) -> &'static str;

    /// Path the engine was opened at.
    fn path(&self) -> &Path;

    /// Read a key. `None` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Create an empty batch bound to this engine.
    fn new_batch(&self) -> Box<dyn Batch>;
}

/// A set of mutations applied together by the engine that created it.
pub trait Batch: Send {
    fn put(&mut self, key: &[u8], value: &[u8]);

    fn delete(&mut self, key: &[u8]);

    /// Binary dump of the pending operations.
    fn dump(&self) -> Result<Vec<u8>>;

    /// Replace the pending operations with the contents of a dump.
    ///
    /// On error the batch is left unchanged.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Durably apply the pending operations to the owning engine.
    fn write(&self) -> Result<()>;

    /// Number of pending operations.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Engine-independent buffer of pending mutations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push(WriteOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.ops.push(WriteOp::Delete { key: key.to_vec() });
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Encode the pending operations.
    ///
    /// Layout: magic, version, payload length (u32 LE), MessagePack payload,
    /// crc32 of the payload (u32 LE).
    pub fn dump(&self) -> Result<Vec<u8>> {
        let payload = rmp_serde::to_vec(&self.ops)?;

        let mut out = Vec::with_capacity(BATCH_HEADER_SIZE + payload.len() + 4);
        out.extend_from_slice(BATCH_MAGIC);
        out.push(BATCH_VERSION);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        Ok(out)
    }

    /// Replace the pending operations with a decoded dump.
    pub fn load(&mut self, data: &[u8]) -> Result<()> {
        self.ops = Self::decode(data)?;
        Ok(())
    }

    fn decode(data: &[u8]) -> Result<Vec<WriteOp>> {
        if data.len() < BATCH_HEADER_SIZE + 4 {
            return Err(PoolError::InvalidFormat(format!(
                "Batch dump too short: {} bytes",
                data.len()
            )));
        }
        if &data[0..4] != BATCH_MAGIC {
            return Err(PoolError::InvalidFormat("Invalid batch magic".into()));
        }
        if data[4] != BATCH_VERSION {
            return Err(PoolError::InvalidFormat(format!(
                "Unsupported batch version: {}",
                data[4]
            )));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&data[5..9]);
        let payload_len = u32::from_le_bytes(len_bytes) as usize;
        if data.len() != BATCH_HEADER_SIZE + payload_len + 4 {
            return Err(PoolError::InvalidFormat(format!(
                "Batch dump length mismatch: header says {} payload bytes, got {} total",
                payload_len,
                data.len()
            )));
        }

        let payload = &data[BATCH_HEADER_SIZE..BATCH_HEADER_SIZE + payload_len];
        let mut checksum_bytes = [0u8; 4];
        checksum_bytes.copy_from_slice(&data[BATCH_HEADER_SIZE + payload_len..]);
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(payload);
        if stored != computed {
            return Err(PoolError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        Ok(rmp_serde::from_slice(payload)?)
    }
}

/// Open an engine of the given type at `path`.
pub fn open_engine(kind: &str, path: &Path, options: &EngineOptions) -> Result<Arc<dyn Engine>> {
    match kind {
        ENGINE_LOGKV => Ok(Arc::new(LogEngine::open(path, options)?)),
        ENGINE_MEMORY => Ok(Arc::new(MemoryEngine::new(path))),
        other => Err(PoolError::UnsupportedEngine(other.to_string())),
    }
}
