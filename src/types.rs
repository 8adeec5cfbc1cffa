//! Core types for the store pool.

use crate::engine::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Engine tag for the file-backed log-structured engine.
pub const ENGINE_LOGKV: &str = "logkv";

/// Engine tag for the in-memory engine.
pub const ENGINE_MEMORY: &str = "memory";

/// Caller-assigned identifier of a store within one pool.
///
/// Also the join key used on the wire to address batches.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(pub i32);

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.0)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for StoreId {
    fn from(id: i32) -> Self {
        StoreId(id)
    }
}

/// Self-describing form of a store handle.
///
/// Used to open stores discovered at runtime and to enumerate the
/// stores a pool currently holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDescriptor {
    pub id: StoreId,
    /// Engine type tag, e.g. `"logkv"`.
    pub engine: String,
    pub path: PathBuf,
    #[serde(default)]
    pub is_meta: bool,
}

impl StoreDescriptor {
    pub fn new(id: impl Into<StoreId>, engine: &str, path: impl AsRef<Path>, is_meta: bool) -> Self {
        Self {
            id: id.into(),
            engine: engine.to_string(),
            path: path.as_ref().to_path_buf(),
            is_meta,
        }
    }
}

/// An opened store together with the identity it was registered under.
#[derive(Clone)]
pub struct StoreHandle {
    pub id: StoreId,
    pub engine: Arc<dyn Engine>,
    pub path: PathBuf,
    pub kind: String,
    pub is_meta: bool,
}

impl StoreHandle {
    /// Descriptor for this handle.
    pub fn descriptor(&self) -> StoreDescriptor {
        StoreDescriptor {
            id: self.id,
            engine: self.kind.clone(),
            path: self.path.clone(),
            is_meta: self.is_meta,
        }
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("is_meta", &self.is_meta)
            .finish()
    }
}
