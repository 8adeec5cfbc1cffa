//! Registry of open stores.
//!
//! The pool maps store identifiers to open engines and designates at most
//! one of them as the metadata store, which holds the replication checkpoint.
//! Its lock guards only the mapping and the designation. Reads and writes of
//! store data clone the engine handle out of the map and run without the
//! pool lock held, so concurrency of data writes is whatever the engine
//! itself provides.

use crate::config::{EngineOptions, PoolConfig};
use crate::engine::{open_engine, Engine};
use crate::error::{PoolError, Result};
use crate::types::{StoreDescriptor, StoreHandle, StoreId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
struct PoolInner {
    stores: HashMap<StoreId, StoreHandle>,
    meta_id: Option<StoreId>,
}

/// The set of stores a replication agent holds open.
///
/// Construct one at startup and pass it (usually behind an `Arc`) to every
/// component that needs a store.
#[derive(Default)]
pub struct Pool {
    inner: RwLock<PoolInner>,
    options: EngineOptions,
}

impl Pool {
    /// Create an empty pool with default engine options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty pool whose dynamically opened engines use `options`.
    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            inner: RwLock::new(PoolInner::default()),
            options,
        }
    }

    /// Open and register every store listed in `config`.
    ///
    /// # Panics
    ///
    /// Panics if the config marks more than one store as metadata, like
    /// [`Pool::register`].
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        let pool = Self::with_options(config.engine.clone());
        for desc in &config.stores {
            let engine = open_engine(&desc.engine, &desc.path, &pool.options)?;
            pool.register(desc.id, &desc.path, &desc.engine, engine, desc.is_meta)?;
        }
        Ok(pool)
    }

    /// Register an already opened store under `id`.
    ///
    /// Fails with `DuplicateStore` if `id` is taken.
    ///
    /// # Panics
    ///
    /// Panics if `is_meta` is set and a metadata store is already designated.
    /// Local registration happens at startup, so two metadata stores is a
    /// configuration the process cannot run with.
    pub fn register(
        &self,
        id: StoreId,
        path: impl AsRef<Path>,
        kind: &str,
        engine: Arc<dyn Engine>,
        is_meta: bool,
    ) -> Result<()> {
        let path = path.as_ref();
        let mut inner = self.inner.write();

        if is_meta {
            if let Some(existing) = inner.meta_id {
                panic!(
                    "meta store already registered as {}, refusing to register {} as meta",
                    existing, id
                );
            }
        }
        if inner.stores.contains_key(&id) {
            return Err(PoolError::DuplicateStore(id));
        }

        inner.stores.insert(
            id,
            StoreHandle {
                id,
                engine,
                path: path.to_path_buf(),
                kind: kind.to_string(),
                is_meta,
            },
        );
        if is_meta {
            inner.meta_id = Some(id);
        }

        info!(store_id = %id, path = %path.display(), engine = kind, is_meta, "registered store");
        Ok(())
    }

    /// Open the store a descriptor points at, unless the pool already has it.
    ///
    /// A no-op if `descriptor.id` is registered. Also a no-op if some other
    /// identifier is already registered at the same path: the new identifier
    /// is dropped and will not resolve (see [`Pool::path_already_open`]).
    ///
    /// Descriptors usually come from the leader during catch-up, so a second
    /// metadata store is reported as `MetadataAlreadyRegistered` instead of
    /// aborting.
    pub fn open(&self, descriptor: &StoreDescriptor) -> Result<()> {
        let mut inner = self.inner.write();

        if inner.stores.contains_key(&descriptor.id) {
            return Ok(());
        }

        if let Some(existing) = Self::path_already_open(&inner, &descriptor.path) {
            warn!(
                store_id = %descriptor.id,
                existing = %existing,
                path = %descriptor.path.display(),
                "path already open under another id, ignoring descriptor"
            );
            return Ok(());
        }

        if descriptor.is_meta && inner.meta_id.is_some() {
            return Err(PoolError::MetadataAlreadyRegistered(descriptor.id));
        }

        let engine = open_engine(&descriptor.engine, &descriptor.path, &self.options)?;
        inner.stores.insert(
            descriptor.id,
            StoreHandle {
                id: descriptor.id,
                engine,
                path: descriptor.path.clone(),
                kind: descriptor.engine.clone(),
                is_meta: descriptor.is_meta,
            },
        );
        if descriptor.is_meta {
            inner.meta_id = Some(descriptor.id);
        }

        info!(
            store_id = %descriptor.id,
            path = %descriptor.path.display(),
            engine = %descriptor.engine,
            is_meta = descriptor.is_meta,
            "opened store"
        );
        Ok(())
    }

    /// The identifier already registered at `path`, if any.
    ///
    /// `open` treats a hit as "already open" and does not alias the new
    /// identifier to the existing handle.
    fn path_already_open(inner: &PoolInner, path: &Path) -> Option<StoreId> {
        inner
            .stores
            .values()
            .filter(|handle| handle.path == path)
            .map(|handle| handle.id)
            .min()
    }

    /// Look up a store handle.
    pub fn handle(&self, id: StoreId) -> Result<StoreHandle> {
        self.inner
            .read()
            .stores
            .get(&id)
            .cloned()
            .ok_or(PoolError::StoreNotFound(id))
    }

    /// Look up the engine registered under `id`.
    pub fn engine(&self, id: StoreId) -> Result<Arc<dyn Engine>> {
        self.inner
            .read()
            .stores
            .get(&id)
            .map(|handle| Arc::clone(&handle.engine))
            .ok_or(PoolError::StoreNotFound(id))
    }

    /// Identifier of the store registered at `path` (lowest id if several).
    pub fn id_by_path(&self, path: impl AsRef<Path>) -> Result<StoreId> {
        let path = path.as_ref();
        Self::path_already_open(&self.inner.read(), path)
            .ok_or_else(|| PoolError::PathNotFound(path.to_path_buf()))
    }

    /// Descriptors of every registered store, ordered by identifier.
    ///
    /// Requires a metadata store, since the list is only meaningful for a
    /// pool that can record replication progress.
    pub fn list_descriptors(&self) -> Result<Vec<StoreDescriptor>> {
        let inner = self.inner.read();
        if inner.meta_id.is_none() {
            return Err(PoolError::NoMetadataStore);
        }

        let mut descriptors: Vec<_> = inner.stores.values().map(StoreHandle::descriptor).collect();
        descriptors.sort_by_key(|desc| desc.id);
        Ok(descriptors)
    }

    /// Identifier of the metadata store, if one is designated.
    pub fn meta_id(&self) -> Option<StoreId> {
        self.inner.read().meta_id
    }

    /// Engine of the metadata store.
    pub(crate) fn meta_engine(&self) -> Result<Arc<dyn Engine>> {
        let inner = self.inner.read();
        let id = inner.meta_id.ok_or(PoolError::NoMetadataStore)?;
        let handle = inner.stores.get(&id).ok_or(PoolError::StoreNotFound(id))?;
        debug!(store_id = %id, "resolved metadata store");
        Ok(Arc::clone(&handle.engine))
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.inner.read().stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().stores.is_empty()
    }
}
