//! Shipping write batches between processes.
//!
//! A leader builds one batch per store for each replication unit, writes
//! them locally, and converts them to wire items. A follower applies the
//! wire items to its own stores with the same identifiers.
//!
//! Applying several batches is ordered and stops at the first failure.
//! Batches before the failing one stay committed and nothing is rolled back;
//! the error carries the index of the failing batch. Atomicity across stores
//! is not provided here.

use crate::engine::Batch;
use crate::error::{PoolError, Result};
use crate::pool::Pool;
use crate::types::StoreId;
use std::fmt;
use tracing::{debug, info};

/// A batch bound to a store, tagged with that store's identifier.
pub struct AddressedBatch {
    pub id: StoreId,
    pub batch: Box<dyn Batch>,
}

impl AddressedBatch {
    pub fn new(id: StoreId, batch: Box<dyn Batch>) -> Self {
        Self { id, batch }
    }
}

impl fmt::Debug for AddressedBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressedBatch")
            .field("id", &self.id)
            .field("ops", &self.batch.len())
            .finish()
    }
}

/// The transmissible form of one store's batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireBatchItem {
    pub id: StoreId,
    /// Opaque batch dump.
    pub data: Vec<u8>,
}

/// Convert batches to wire items, preserving input order.
///
/// Each item owns a fresh copy of its batch's dump.
pub fn to_wire_items(batches: &[AddressedBatch]) -> Result<Vec<WireBatchItem>> {
    batches
        .iter()
        .enumerate()
        .map(|(i, addressed)| {
            let data = addressed
                .batch
                .dump()
                .map_err(|e| PoolError::at_batch(i, e))?;
            Ok(WireBatchItem {
                id: addressed.id,
                data,
            })
        })
        .collect()
}

/// Durably write each batch to the store it was created from, in order.
pub fn apply_local_batches(batches: &[AddressedBatch]) -> Result<()> {
    for (i, addressed) in batches.iter().enumerate() {
        addressed
            .batch
            .write()
            .map_err(|e| PoolError::at_batch(i, e))?;
        debug!(store_id = %addressed.id, ops = addressed.batch.len(), "applied local batch");
    }
    Ok(())
}

impl Pool {
    /// Create an empty batch for the store registered under `id`.
    pub fn new_batch(&self, id: StoreId) -> Result<AddressedBatch> {
        let engine = self.engine(id)?;
        Ok(AddressedBatch::new(id, engine.new_batch()))
    }

    /// Apply wire items to their target stores, in order.
    ///
    /// An item addressed to an unregistered store fails with
    /// `StoreNotFound` and stops processing like any other failure.
    pub fn apply_wire_items(&self, items: &[WireBatchItem]) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            self.apply_wire_item(item)
                .map_err(|e| PoolError::at_batch(i, e))?;
        }
        info!(items = items.len(), "applied wire batches");
        Ok(())
    }

    fn apply_wire_item(&self, item: &WireBatchItem) -> Result<()> {
        let engine = self.engine(item.id)?;
        let mut batch = engine.new_batch();
        batch.load(&item.data)?;
        batch.write()?;
        debug!(store_id = %item.id, ops = batch.len(), bytes = item.data.len(), "applied wire batch");
        Ok(())
    }
}
