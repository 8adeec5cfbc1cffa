//! Replication checkpoint kept in the metadata store.
//!
//! The checkpoint records the last replication unit that was fully applied.
//! It lives under a single fixed key and is overwritten on every apply; no
//! history is kept. Writers are expected to be a single apply loop: two
//! concurrent writers race and the last write wins.

use crate::error::{PoolError, Result};
use crate::pool::Pool;
use crate::types::StoreDescriptor;
use crate::wire::{self, BlockType};
use tracing::{debug, info};

/// Metadata key holding the last applied checkpoint.
pub const LAST_BLOCK_INFO_KEY: &[u8] = b"rpl_last_bk";

/// Metadata key holding the persisted store descriptors.
pub const DB_INFO_KEY: &[u8] = b"rpl_db_info";

/// Progress marker for replication.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub chain_id: String,
    pub env: String,
    /// Last applied block, -1 if none.
    pub block_num: i64,
    pub block_hash: String,
    /// Offset of the last consumed message, -1 if none.
    pub msg_offset: i64,
    pub block_type: BlockType,
    pub block_size: i64,
}

impl Checkpoint {
    /// The checkpoint of a follower that has applied nothing yet.
    pub fn not_started() -> Self {
        Self {
            block_num: -1,
            msg_offset: -1,
            ..Default::default()
        }
    }

    pub fn is_started(&self) -> bool {
        self.block_num != -1 || self.msg_offset != -1
    }
}

/// What the metadata store says about replication progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointState {
    /// No checkpoint has been written.
    NotStarted,
    Applied(Checkpoint),
}

impl Pool {
    /// Read the stored checkpoint, telling "never written" apart from a value.
    ///
    /// Bytes that do not decode are reported as `CorruptCheckpoint`.
    pub fn checkpoint_state(&self) -> Result<CheckpointState> {
        let meta = self.meta_engine()?;

        let bytes = match meta.get(LAST_BLOCK_INFO_KEY)? {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Ok(CheckpointState::NotStarted),
        };

        let cp = wire::decode_checkpoint(&bytes)
            .map_err(|e| PoolError::CorruptCheckpoint(e.to_string()))?;
        Ok(CheckpointState::Applied(cp))
    }

    /// Read the stored checkpoint.
    ///
    /// Returns [`Checkpoint::not_started`] (block and offset -1) when none has
    /// been written.
    pub fn read_checkpoint(&self) -> Result<Checkpoint> {
        match self.checkpoint_state()? {
            CheckpointState::NotStarted => Ok(Checkpoint::not_started()),
            CheckpointState::Applied(cp) => Ok(cp),
        }
    }

    /// Durably overwrite the stored checkpoint.
    pub fn write_checkpoint(&self, cp: &Checkpoint) -> Result<()> {
        let meta = self.meta_engine()?;

        let mut batch = meta.new_batch();
        batch.put(LAST_BLOCK_INFO_KEY, &wire::encode_checkpoint(cp));
        batch.write()?;

        debug!(
            block_num = cp.block_num,
            msg_offset = cp.msg_offset,
            block_hash = %cp.block_hash,
            "wrote checkpoint"
        );
        Ok(())
    }

    /// Durably record the current store descriptors in the metadata store.
    ///
    /// A follower reads them back with [`Pool::stored_descriptors`] and opens
    /// each one to rebuild its registry.
    pub fn persist_descriptors(&self) -> Result<()> {
        let descriptors = self.list_descriptors()?;
        let meta = self.meta_engine()?;

        let mut batch = meta.new_batch();
        batch.put(DB_INFO_KEY, &wire::encode_descriptors(&descriptors));
        batch.write()?;

        info!(stores = descriptors.len(), "persisted store descriptors");
        Ok(())
    }

    /// Store descriptors last written by [`Pool::persist_descriptors`].
    ///
    /// Empty if none were ever written.
    pub fn stored_descriptors(&self) -> Result<Vec<StoreDescriptor>> {
        let meta = self.meta_engine()?;
        match meta.get(DB_INFO_KEY)? {
            Some(bytes) => wire::decode_descriptors(&bytes),
            None => Ok(Vec::new()),
        }
    }
}
