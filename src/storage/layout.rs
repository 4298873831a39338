use std::path::{Path, PathBuf};
use std::fs;
use crate::core::error::Result;

/// Directory structure of one key-value store
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // Root directory of the store
    pub wal_dir: PathBuf,       // Write-ahead log location
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let wal_dir = base_dir.join("wal");

        fs::create_dir_all(&wal_dir)?;

        Ok(StorageLayout {
            base_dir,
            wal_dir,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.wal_dir.join("wal_00000000.log")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
