//! Budget Engine Storage Layer - File-Based Snapshots
//!
//! Governance state lives in memory; the engine writes a snapshot after
//! mutations and loads it once on startup. Snapshots are written in two
//! formats: bincode for fast loading and JSON as a human-readable backup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),
}

/// File-based snapshot store for governance state
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    /// Open (and create if needed) the storage directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let data_dir = path.as_ref().to_path_buf();

        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)?;
        }

        Ok(Self { data_dir })
    }

    /// Save a snapshot under `name`
    ///
    /// Writes go through a temp file and rename so a crash mid-write never
    /// leaves a truncated snapshot behind.
    pub fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<(), StorageError> {
        let bin = bincode::serialize(data)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.write_atomic(&format!("{}.bin", name), &bin)?;

        let json = serde_json::to_string_pretty(data)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.write_atomic(&format!("{}.json", name), json.as_bytes())?;

        Ok(())
    }

    /// Load a snapshot (bincode first, JSON fallback)
    pub fn load<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<T, StorageError> {
        let bin_path = self.data_dir.join(format!("{}.bin", name));
        let json_path = self.data_dir.join(format!("{}.json", name));

        if bin_path.exists() {
            let data = fs::read(&bin_path)?;
            return bincode::deserialize(&data)
                .map_err(|e| StorageError::SerializationError(e.to_string()));
        }

        if json_path.exists() {
            let data = fs::read_to_string(&json_path)?;
            return serde_json::from_str(&data)
                .map_err(|e| StorageError::SerializationError(e.to_string()));
        }

        Err(StorageError::SnapshotNotFound(name.to_string()))
    }

    /// Check whether a snapshot exists
    pub fn exists(&self, name: &str) -> bool {
        self.data_dir.join(format!("{}.bin", name)).exists()
            || self.data_dir.join(format!("{}.json", name)).exists()
    }

    /// Delete a snapshot in both formats
    pub fn delete(&self, name: &str) -> Result<(), StorageError> {
        for ext in ["bin", "json"] {
            let path = self.data_dir.join(format!("{}.{}", name, ext));
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn write_atomic(&self, file_name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = self.data_dir.join(format!("{}.tmp", file_name));
        let dest = self.data_dir.join(file_name);
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct DummyState {
        height: u64,
        entries: Vec<String>,
    }

    fn sample() -> DummyState {
        DummyState {
            height: 43200,
            entries: vec!["a".to_string(), "b".to_string()],
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        store.save("governance", &sample()).unwrap();
        assert!(store.exists("governance"));

        let loaded: DummyState = store.load("governance").unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_json_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        store.save("governance", &sample()).unwrap();
        std::fs::remove_file(dir.path().join("governance.bin")).unwrap();

        let loaded: DummyState = store.load("governance").unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        let result: Result<DummyState, _> = store.load("nope");
        assert!(matches!(result, Err(StorageError::SnapshotNotFound(_))));
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        store.save("governance", &sample()).unwrap();
        store.delete("governance").unwrap();
        assert!(!store.exists("governance"));
    }
}
