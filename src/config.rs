//! Pool and engine configuration.

use crate::error::Result;
use crate::types::StoreDescriptor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Options applied to every engine the pool opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// fsync the log after every batch write.
    pub sync_writes: bool,

    /// Value cache size (number of values) for file-backed engines.
    pub cache_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sync_writes: true,
            cache_capacity: 1024,
        }
    }
}

/// Startup configuration: engine options plus the stores to register.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub engine: EngineOptions,
    pub stores: Vec<StoreDescriptor>,
}

impl PoolConfig {
    /// Parse a JSON config document.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_json_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::types::{StoreId, ENGINE_LOGKV};
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config() {
        let json = br#"{
            "engine": { "sync_writes": false },
            "stores": [
                { "id": 0, "engine": "logkv", "path": "/data/meta", "is_meta": true },
                { "id": 1, "engine": "logkv", "path": "/data/state" }
            ]
        }"#;

        let config = PoolConfig::from_json_slice(json).unwrap();
        assert!(!config.engine.sync_writes);
        assert_eq!(config.engine.cache_capacity, 1024);
        assert_eq!(config.stores.len(), 2);
        assert_eq!(config.stores[0].id, StoreId(0));
        assert!(config.stores[0].is_meta);
        assert_eq!(config.stores[1].engine, ENGINE_LOGKV);
        assert_eq!(config.stores[1].path, PathBuf::from("/data/state"));
        assert!(!config.stores[1].is_meta);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PoolConfig::from_json_slice(b"{}").unwrap();
        assert_eq!(config, PoolConfig::default());
        assert!(config.engine.sync_writes);
    }

    #[test]
    fn test_malformed_config() {
        assert!(PoolConfig::from_json_slice(b"{ not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("pool.json");
        fs::write(
            &config_path,
            br#"{
                "engine": { "cache_capacity": 16 },
                "stores": [{ "id": 0, "engine": "memory", "path": "mem://meta", "is_meta": true }]
            }"#,
        )
        .unwrap();

        let config = PoolConfig::load(&config_path).unwrap();
        assert_eq!(config.engine.cache_capacity, 16);
        assert!(config.engine.sync_writes);
        assert_eq!(config.stores.len(), 1);
        assert_eq!(config.stores[0].path, PathBuf::from("mem://meta"));
        assert!(config.stores[0].is_meta);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = PoolConfig::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(PoolError::Io(_))));
    }
}
