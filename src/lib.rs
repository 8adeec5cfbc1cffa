//! # Replication Store Pool
//!
//! The store registry and checkpoint/batch-shipping core of a database
//! replication agent.
//!
//! ## Core Concepts
//!
//! - **Pool**: Identifier-indexed registry of open key-value stores, one of
//!   which is designated the metadata store
//! - **Checkpoint**: The last replication unit fully applied, kept under a
//!   fixed key in the metadata store
//! - **Wire batches**: Per-store write batches dumped to opaque bytes so a
//!   follower can replay exactly the mutations a leader made
//!
//! ## Example
//!
//! ```ignore
//! use replpool::{
//!     apply_local_batches, to_wire_items, Pool, PoolConfig, ReplicationUnit, StoreId,
//! };
//!
//! // Leader
//! let leader = Pool::from_config(&PoolConfig::load("leader.json")?)?;
//! let mut batch = leader.new_batch(StoreId(1))?;
//! batch.batch.put(b"account:1", b"100");
//! let batches = vec![batch];
//! apply_local_batches(&batches)?;
//! let unit = ReplicationUnit::new(checkpoint, to_wire_items(&batches)?);
//! send(unit.encode());
//!
//! // Follower
//! let unit = ReplicationUnit::decode(&recv())?;
//! follower.apply_wire_items(&unit.items)?;
//! follower.write_checkpoint(&unit.checkpoint)?;
//! ```

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod types;
pub mod wire;

// Re-exports
pub use batch::{apply_local_batches, to_wire_items, AddressedBatch, WireBatchItem};
pub use checkpoint::{Checkpoint, CheckpointState, DB_INFO_KEY, LAST_BLOCK_INFO_KEY};
pub use config::{EngineOptions, PoolConfig};
pub use engine::{open_engine, Batch, Engine, LogEngine, MemoryEngine, WriteBatch, WriteOp};
pub use error::{PoolError, Result};
pub use pool::Pool;
pub use types::*;
pub use wire::{BlockType, ReplicationUnit};
