use std::path::PathBuf;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::RECORD_SIZE;
use crate::storage::kv_store::DuplicatePolicy;
use crate::storage::wal::SyncMode;

pub const USER_ITEMS_FILE: &str = "user_items.bin";
pub const ITEM_PRICES_FILE: &str = "item_prices.bin";
pub const USER_EXPENSES_FILE: &str = "user_expenses.csv";
pub const ITEM_STORE_DIR: &str = "item-prices";
pub const USER_STORE_DIR: &str = "user-items";

/// Run configuration, resolved once and passed by reference to every stage.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub file_size: u64,                 // Bytes per generated file
    pub block_size: u64,                // Bytes per I/O + transaction unit
    pub workers: usize,                 // Threads per worker pool
    pub num_users: u64,                 // Distinct user ids drawn from [0, num_users)
    pub num_items: u64,                 // Distinct item ids drawn from [0, num_items)

    pub item_duplicates: DuplicatePolicy,
    pub sync_mode: SyncMode,            // WAL durability for the scratch stores
    pub seed: Option<u64>,              // Fixed RNG seed for reproducible data
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            file_size: 1024 * 1024 * 1024,  // 1GB per file
            block_size: 10 * 1024 * 1024,   // 10MB blocks
            workers: 8,
            num_users: 1_000_000,
            num_items: 1_000_000,

            item_duplicates: DuplicatePolicy::KeepFirst,
            sync_mode: SyncMode::None,
            seed: None,
        }
    }
}

impl Config {
    /// Clamp the block size to the file size and reject layouts that would
    /// split a record or leave a partial block.
    pub fn validated(mut self) -> Result<Self> {
        if self.block_size > self.file_size {
            self.block_size = self.file_size;
        }

        let record = RECORD_SIZE as u64;
        let invalid = |msg: String| Err(Error::new(ErrorKind::InvalidArgument, msg));

        if self.file_size == 0 {
            return invalid("file size must be positive".to_string());
        }
        if self.file_size % record != 0 {
            return invalid(format!("file size {} is not a multiple of {}", self.file_size, record));
        }
        if self.block_size == 0 || self.block_size % record != 0 {
            return invalid(format!("block size {} is not a positive multiple of {}", self.block_size, record));
        }
        if self.file_size % self.block_size != 0 {
            return invalid(format!(
                "block size {} does not evenly divide file size {}",
                self.block_size, self.file_size
            ));
        }
        if self.workers == 0 {
            return invalid("worker count must be at least 1".to_string());
        }
        if self.num_users == 0 || self.num_items == 0 {
            return invalid("user and item cardinalities must be positive".to_string());
        }

        Ok(self)
    }

    pub fn record_count(&self) -> u64 {
        self.file_size / RECORD_SIZE as u64
    }

    pub fn block_count(&self) -> u64 {
        self.file_size / self.block_size
    }

    pub fn records_per_block(&self) -> u64 {
        self.block_size / RECORD_SIZE as u64
    }

    pub fn user_items_path(&self) -> PathBuf {
        self.data_dir.join(USER_ITEMS_FILE)
    }

    pub fn item_prices_path(&self) -> PathBuf {
        self.data_dir.join(ITEM_PRICES_FILE)
    }

    pub fn user_expenses_path(&self) -> PathBuf {
        self.data_dir.join(USER_EXPENSES_FILE)
    }

    pub fn item_store_dir(&self) -> PathBuf {
        self.data_dir.join(ITEM_STORE_DIR)
    }

    pub fn user_store_dir(&self) -> PathBuf {
        self.data_dir.join(USER_STORE_DIR)
    }
}
