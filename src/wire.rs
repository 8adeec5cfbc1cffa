//! Wire messages exchanged between leader and follower.
//!
//! The protobuf schema (package `pb`) is shared with other replicator
//! processes, so tags and field types must not change:
//!
//! ```text
//! message BlockInfo {
//!   enum BlockType { UNKNOWN = 0; DATA = 1; HEADER = 2; }
//!   string chain_id = 1; string env = 2; int64 block_num = 3;
//!   string block_hash = 4; int64 msg_offset = 5; BlockType block_type = 6;
//!   int64 block_size = 7;
//! }
//! message BatchItem  { int32 id = 1; bytes data = 2; }
//! message Block      { BlockInfo info = 1; repeated BatchItem batch_items = 2; }
//! message DBInfo     { int32 id = 1; string db_type = 2; string db_path = 3; bool is_meta = 4; }
//! message DBInfoList { repeated DBInfo db_infos = 1; }
//! ```

use crate::batch::WireBatchItem;
use crate::checkpoint::Checkpoint;
use crate::error::{PoolError, Result};
use crate::types::{StoreDescriptor, StoreId};
use prost::Message;
use std::path::PathBuf;

pub use pb::BlockType;

/// Generated-style protobuf messages.
pub mod pb {
    /// Kind of block a checkpoint refers to.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum BlockType {
        Unknown = 0,
        Data = 1,
        Header = 2,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockInfo {
        #[prost(string, tag = "1")]
        pub chain_id: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub env: ::prost::alloc::string::String,
        #[prost(int64, tag = "3")]
        pub block_num: i64,
        #[prost(string, tag = "4")]
        pub block_hash: ::prost::alloc::string::String,
        #[prost(int64, tag = "5")]
        pub msg_offset: i64,
        #[prost(enumeration = "BlockType", tag = "6")]
        pub block_type: i32,
        #[prost(int64, tag = "7")]
        pub block_size: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BatchItem {
        #[prost(int32, tag = "1")]
        pub id: i32,
        #[prost(bytes = "vec", tag = "2")]
        pub data: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Block {
        #[prost(message, optional, tag = "1")]
        pub info: ::core::option::Option<BlockInfo>,
        #[prost(message, repeated, tag = "2")]
        pub batch_items: ::prost::alloc::vec::Vec<BatchItem>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DbInfo {
        #[prost(int32, tag = "1")]
        pub id: i32,
        #[prost(string, tag = "2")]
        pub db_type: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub db_path: ::prost::alloc::string::String,
        #[prost(bool, tag = "4")]
        pub is_meta: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DbInfoList {
        #[prost(message, repeated, tag = "1")]
        pub db_infos: ::prost::alloc::vec::Vec<DbInfo>,
    }
}

impl From<&Checkpoint> for pb::BlockInfo {
    fn from(cp: &Checkpoint) -> Self {
        pb::BlockInfo {
            chain_id: cp.chain_id.clone(),
            env: cp.env.clone(),
            block_num: cp.block_num,
            block_hash: cp.block_hash.clone(),
            msg_offset: cp.msg_offset,
            block_type: cp.block_type as i32,
            block_size: cp.block_size,
        }
    }
}

impl From<pb::BlockInfo> for Checkpoint {
    /// Block types this build does not know map to `Unknown`.
    fn from(info: pb::BlockInfo) -> Self {
        let block_type = info.block_type();
        Checkpoint {
            chain_id: info.chain_id,
            env: info.env,
            block_num: info.block_num,
            block_hash: info.block_hash,
            msg_offset: info.msg_offset,
            block_type,
            block_size: info.block_size,
        }
    }
}

impl From<&WireBatchItem> for pb::BatchItem {
    fn from(item: &WireBatchItem) -> Self {
        pb::BatchItem {
            id: item.id.0,
            data: item.data.clone(),
        }
    }
}

impl From<pb::BatchItem> for WireBatchItem {
    fn from(item: pb::BatchItem) -> Self {
        WireBatchItem {
            id: StoreId(item.id),
            data: item.data,
        }
    }
}

impl From<&StoreDescriptor> for pb::DbInfo {
    fn from(desc: &StoreDescriptor) -> Self {
        pb::DbInfo {
            id: desc.id.0,
            db_type: desc.engine.clone(),
            db_path: desc.path.to_string_lossy().into_owned(),
            is_meta: desc.is_meta,
        }
    }
}

impl From<pb::DbInfo> for StoreDescriptor {
    fn from(info: pb::DbInfo) -> Self {
        StoreDescriptor {
            id: StoreId(info.id),
            engine: info.db_type,
            path: PathBuf::from(info.db_path),
            is_meta: info.is_meta,
        }
    }
}

/// Encode a checkpoint as a `BlockInfo` message.
pub fn encode_checkpoint(cp: &Checkpoint) -> Vec<u8> {
    pb::BlockInfo::from(cp).encode_to_vec()
}

/// Decode a `BlockInfo` message.
pub fn decode_checkpoint(bytes: &[u8]) -> Result<Checkpoint> {
    Ok(pb::BlockInfo::decode(bytes)?.into())
}

/// Encode descriptors as a `DBInfoList` message.
pub fn encode_descriptors(descriptors: &[StoreDescriptor]) -> Vec<u8> {
    pb::DbInfoList {
        db_infos: descriptors.iter().map(pb::DbInfo::from).collect(),
    }
    .encode_to_vec()
}

/// Decode a `DBInfoList` message.
pub fn decode_descriptors(bytes: &[u8]) -> Result<Vec<StoreDescriptor>> {
    let list = pb::DbInfoList::decode(bytes)?;
    Ok(list.db_infos.into_iter().map(StoreDescriptor::from).collect())
}

/// A checkpoint together with the batches that produced it.
///
/// This is the unit a leader ships to its followers. Moving the encoded
/// bytes between processes is up to the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicationUnit {
    pub checkpoint: Checkpoint,
    pub items: Vec<WireBatchItem>,
}

impl ReplicationUnit {
    pub fn new(checkpoint: Checkpoint, items: Vec<WireBatchItem>) -> Self {
        Self { checkpoint, items }
    }

    /// Encode as a `Block` message.
    pub fn encode(&self) -> Vec<u8> {
        pb::Block {
            info: Some(pb::BlockInfo::from(&self.checkpoint)),
            batch_items: self.items.iter().map(pb::BatchItem::from).collect(),
        }
        .encode_to_vec()
    }

    /// Decode a `Block` message. A block without checkpoint info is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let block = pb::Block::decode(bytes)?;
        let info = block
            .info
            .ok_or_else(|| PoolError::Deserialization("Block has no checkpoint info".into()))?;

        Ok(Self {
            checkpoint: info.into(),
            items: block.batch_items.into_iter().map(WireBatchItem::from).collect(),
        })
    }
}
