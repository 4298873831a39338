#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use pricejoin::core::config::Config;
use pricejoin::core::types::{encode_pair, records, ExpenseRow, RECORD_SIZE};
use pricejoin::storage::kv_store::DuplicatePolicy;
use pricejoin::storage::wal::SyncMode;

/// Small dataset: one block of 100 records, 10 users, 5 items.
pub fn small_config(dir: &Path) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        file_size: 1600,
        block_size: 1600,
        workers: 4,
        num_users: 10,
        num_items: 5,
        item_duplicates: DuplicatePolicy::KeepFirst,
        sync_mode: SyncMode::None,
        seed: Some(7),
    }
}

/// Write `pairs` as a binary record file.
pub fn write_records(path: &Path, pairs: &[(u64, u64)]) {
    let mut bytes = vec![0u8; pairs.len() * RECORD_SIZE];
    for (slot, &(key, value)) in bytes.chunks_exact_mut(RECORD_SIZE).zip(pairs) {
        encode_pair(key, value, slot);
    }
    fs::write(path, bytes).unwrap();
}

pub fn read_records(path: &Path) -> Vec<(u64, u64)> {
    let bytes = fs::read(path).unwrap();
    records(&bytes).collect()
}

/// Totals by brute force: first price seen per item wins.
pub fn expected_totals(users: &[(u64, u64)], items: &[(u64, u64)]) -> HashMap<u64, u64> {
    let mut prices = HashMap::new();
    for &(item, price) in items {
        prices.entry(item).or_insert(price);
    }

    let mut totals = HashMap::new();
    for &(user, item) in users {
        *totals.entry(user).or_insert(0u64) += prices[&item];
    }
    totals
}

pub fn read_expenses(path: &Path) -> Vec<ExpenseRow> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader.deserialize().map(|row| row.unwrap()).collect()
}
