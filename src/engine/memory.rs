//! In-memory engine.

use super::{Batch, Engine, WriteBatch, WriteOp};
use crate::error::Result;
use crate::types::ENGINE_MEMORY;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Volatile store. The path only identifies it within a pool.
pub struct MemoryEngine {
    path: PathBuf,
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryEngine {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Engine for MemoryEngine {
    fn kind(&self) -> &'static str {
        ENGINE_MEMORY
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(MemoryBatch {
            data: Arc::clone(&self.data),
            ops: WriteBatch::new(),
        })
    }
}

struct MemoryBatch {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    ops: WriteBatch,
}

impl Batch for MemoryBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.put(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.ops.delete(key);
    }

    fn dump(&self) -> Result<Vec<u8>> {
        self.ops.dump()
    }

    fn load(&mut self, data: &[u8]) -> Result<()> {
        self.ops.load(data)
    }

    fn write(&self) -> Result<()> {
        let mut data = self.data.write();
        for op in self.ops.ops() {
            match op {
                WriteOp::Put { key, value } => {
                    data.insert(key.clone(), value.clone());
                }
                WriteOp::Delete { key } => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.ops.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_write_and_get() {
        let engine = MemoryEngine::new("mem://a");
        let mut batch = engine.new_batch();
        batch.put(b"k1", b"v1");
        batch.put(b"k2", b"v2");
        batch.delete(b"k1");

        // Nothing visible before write
        assert_eq!(engine.get(b"k2").unwrap(), None);

        batch.write().unwrap();
        assert_eq!(engine.get(b"k1").unwrap(), None);
        assert_eq!(engine.get(b"k2").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_load_into_other_engine() {
        let source = MemoryEngine::new("mem://src");
        let target = MemoryEngine::new("mem://dst");

        let mut batch = source.new_batch();
        batch.put(b"key", b"value");
        let dump = batch.dump().unwrap();

        let mut replayed = target.new_batch();
        replayed.load(&dump).unwrap();
        replayed.write().unwrap();

        assert_eq!(target.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert!(source.is_empty());
    }
}
