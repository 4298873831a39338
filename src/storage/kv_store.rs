use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::ops::Bound;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::StoreStats;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::transaction::Transaction;
use crate::storage::wal::{SyncMode, Wal};

/// What a unique-key store does when a put hits a key that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Abort the whole transaction with a `Conflict` error.
    FailFast,
    /// Keep the value with the lowest insert ordinal.
    #[default]
    KeepFirst,
    /// Keep the value with the highest insert ordinal.
    KeepLast,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail" | "fail-fast" => Ok(DuplicatePolicy::FailFast),
            "first" | "keep-first" => Ok(DuplicatePolicy::KeepFirst),
            "last" | "keep-last" => Ok(DuplicatePolicy::KeepLast),
            other => Err(format!("unknown duplicate policy '{}' (expected fail, first or last)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// One value per key.
    Unique(DuplicatePolicy),
    /// Any number of values per key, kept in commit order.
    Multi,
}

/// Result of applying one committed transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub sequence: u64,
    pub applied: usize,
    pub duplicates: usize,
}

/// Committed state. `ordinals` holds the insert ordinal of each unique-key value.
#[derive(Default)]
struct Table {
    values: BTreeMap<u64, Vec<u64>>,
    ordinals: HashMap<u64, u64>,
}

/// Embedded transactional key-value store.
///
/// Keys and values are u64. A committed transaction is applied to an ordered
/// in-memory table as a unit, so a block of puts is either entirely visible or
/// not at all. Commits are serialized by the commit mutex; readers only take
/// the table read lock.
///
/// Every put carries an insert ordinal (its position in the source data, or
/// commit order when the transaction was not placed). Unique-key duplicate
/// policies compare ordinals, so "first" and "last" do not depend on which
/// concurrent transaction commits first.
///
/// Stores opened with `open` log each commit to a WAL and replay it on the next
/// `open`. Stores opened with `open_scratch` keep no log: they live for one run
/// and are rebuilt from the source files, never recovered.
pub struct KvStore {
    name: String,
    layout: StorageLayout,
    mode: KeyMode,
    table: RwLock<Table>,
    wal: Mutex<Option<Wal>>,
    next_ordinal: AtomicU64,
    values: AtomicUsize,
    commits: AtomicU64,
    duplicates: AtomicU64,
    _lock: FileLock,
}

impl KvStore {
    /// Open (or create) the store rooted at `dir`, replaying any existing WAL.
    pub fn open(dir: PathBuf, name: &str, mode: KeyMode, sync_mode: SyncMode) -> Result<Self> {
        let layout = StorageLayout::new(dir)?;
        let lock = FileLock::acquire(&layout)?;
        let mut wal = Wal::open(&layout, sync_mode)?;
        let batches = wal.replay()?;

        let store = Self::with_parts(name, layout, mode, Some(wal), lock);

        if !batches.is_empty() {
            let mut table = store.table.write();
            for batch in &batches {
                store.apply(&mut table, batch.first_ordinal, &batch.entries);
                store.advance_ordinal(batch.first_ordinal, batch.entries.len());
                store.commits.fetch_add(1, Ordering::Relaxed);
            }
            info!(store = %store.name, batches = batches.len(), keys = table.values.len(), "recovered from WAL");
        }

        Ok(store)
    }

    /// Open an unlogged store in `dir` for single-run scratch data.
    pub fn open_scratch(dir: PathBuf, name: &str, mode: KeyMode) -> Result<Self> {
        let layout = StorageLayout::new(dir)?;
        let lock = FileLock::acquire(&layout)?;
        Ok(Self::with_parts(name, layout, mode, None, lock))
    }

    fn with_parts(name: &str, layout: StorageLayout, mode: KeyMode, wal: Option<Wal>, lock: FileLock) -> Self {
        KvStore {
            name: name.to_string(),
            layout,
            mode,
            table: RwLock::new(Table::default()),
            wal: Mutex::new(wal),
            next_ordinal: AtomicU64::new(0),
            values: AtomicUsize::new(0),
            commits: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            _lock: lock,
        }
    }

    /// Whether commits are written to a WAL.
    pub fn is_logged(&self) -> bool {
        self.wal.lock().is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    pub fn path(&self) -> &std::path::Path {
        self.layout.base_dir()
    }

    /// Begin a write transaction. Puts stay private until `commit`.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::begin(self)
    }

    /// Begin a read view over the committed table.
    pub fn read(&self) -> ReadTxn<'_> {
        ReadTxn {
            table: self.table.read(),
        }
    }

    /// First (or only) value for `key`.
    pub fn get_one(&self, key: u64) -> Option<u64> {
        self.read().get_one(key)
    }

    /// Every value stored under `key`, in commit order.
    pub fn get(&self, key: u64) -> Option<Vec<u64>> {
        self.read().get(key).map(|v| v.to_vec())
    }

    /// Forward cursor over distinct keys in ascending order.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            store: self,
            position: None,
            done: false,
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.table.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.len(),
            values: self.values.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates.load(Ordering::Relaxed),
        }
    }

    /// Force the WAL to disk. No-op for scratch stores.
    pub fn sync(&self) -> Result<()> {
        match self.wal.lock().as_mut() {
            Some(wal) => wal.sync(),
            None => Ok(()),
        }
    }

    /// Close the store and remove its directory.
    pub fn destroy(self) -> Result<()> {
        let dir = self.layout.base_dir.clone();
        let name = self.name.clone();
        drop(self);
        fs::remove_dir_all(&dir)
            .map_err(|e| Error::new(ErrorKind::Io, format!("failed to remove {} ({})", dir.display(), e)))?;
        debug!(store = %name, "store removed");
        Ok(())
    }

    /// Validate, log and apply one transaction's puts as a unit.
    ///
    /// Put `i` gets ordinal `first_ordinal + i`; without a placement the batch
    /// is ordered after everything committed so far.
    pub(crate) fn commit_batch(&self, first_ordinal: Option<u64>, entries: &[(u64, u64)]) -> Result<CommitOutcome> {
        if entries.is_empty() {
            return Ok(CommitOutcome::default());
        }

        let mut wal = self.wal.lock();

        if self.mode == KeyMode::Unique(DuplicatePolicy::FailFast) {
            self.check_conflicts(entries)?;
        }

        let first_ordinal = first_ordinal.unwrap_or_else(|| self.next_ordinal.load(Ordering::Relaxed));

        let sequence = match wal.as_mut() {
            Some(wal) => wal.append(first_ordinal, entries)
                .map_err(|e| e.during(&format!("{} commit", self.name)))?,
            None => self.commits.load(Ordering::Relaxed),
        };

        let (applied, duplicates) = {
            let mut table = self.table.write();
            self.apply(&mut table, first_ordinal, entries)
        };
        self.advance_ordinal(first_ordinal, entries.len());
        drop(wal);

        self.commits.fetch_add(1, Ordering::Relaxed);

        Ok(CommitOutcome {
            sequence,
            applied,
            duplicates,
        })
    }

    fn check_conflicts(&self, entries: &[(u64, u64)]) -> Result<()> {
        let table = self.table.read();
        let mut seen = HashSet::with_capacity(entries.len());

        for &(key, _) in entries {
            if table.values.contains_key(&key) || !seen.insert(key) {
                return Err(Error::new(
                    ErrorKind::Conflict,
                    format!("{}: key {} already exists", self.name, key),
                ));
            }
        }

        Ok(())
    }

    fn advance_ordinal(&self, first_ordinal: u64, puts: usize) {
        self.next_ordinal.fetch_max(first_ordinal + puts as u64, Ordering::Relaxed);
    }

    /// Apply puts to the table. Returns (values stored, duplicate puts).
    fn apply(&self, table: &mut Table, first_ordinal: u64, entries: &[(u64, u64)]) -> (usize, usize) {
        let mut added = 0usize;
        let mut duplicates = 0usize;

        for (&(key, value), ordinal) in entries.iter().zip(first_ordinal..) {
            match self.mode {
                KeyMode::Multi => {
                    table.values.entry(key).or_default().push(value);
                    added += 1;
                }
                KeyMode::Unique(policy) => match table.values.get_mut(&key) {
                    None => {
                        table.values.insert(key, vec![value]);
                        table.ordinals.insert(key, ordinal);
                        added += 1;
                    }
                    Some(existing) => {
                        duplicates += 1;
                        let stored = table.ordinals.entry(key).or_insert(ordinal);
                        let replace = match policy {
                            DuplicatePolicy::KeepFirst => ordinal < *stored,
                            DuplicatePolicy::KeepLast => ordinal > *stored,
                            DuplicatePolicy::FailFast => false,
                        };
                        if replace {
                            existing[0] = value;
                            *stored = ordinal;
                        }
                    }
                },
            }
        }

        self.values.fetch_add(added, Ordering::Relaxed);
        self.duplicates.fetch_add(duplicates as u64, Ordering::Relaxed);

        (added, duplicates)
    }
}

/// Consistent read view; holds the table read lock until dropped.
pub struct ReadTxn<'a> {
    table: RwLockReadGuard<'a, Table>,
}

impl<'a> ReadTxn<'a> {
    pub fn get(&self, key: u64) -> Option<&[u64]> {
        self.table.values.get(&key).map(|v| v.as_slice())
    }

    pub fn get_one(&self, key: u64) -> Option<u64> {
        self.table.values.get(&key).and_then(|v| v.first().copied())
    }

    pub fn len(&self) -> usize {
        self.table.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.values.is_empty()
    }
}

/// Forward cursor. Each step yields one key with its full value-set.
///
/// The cursor remembers its position by key and re-seeks on every step, so it
/// never holds the table lock between steps.
pub struct Cursor<'a> {
    store: &'a KvStore,
    position: Option<u64>,
    done: bool,
}

impl<'a> Cursor<'a> {
    /// Advance to the next key. `None` means end of data.
    pub fn next_entry(&mut self) -> Option<(u64, Vec<u64>)> {
        if self.done {
            return None;
        }

        let table = self.store.table.read();
        let lower = match self.position {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        match table.values.range((lower, Bound::Unbounded)).next() {
            Some((&key, values)) => {
                self.position = Some(key);
                Some((key, values.clone()))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl<'a> Iterator for Cursor<'a> {
    type Item = (u64, Vec<u64>);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry()
    }
}
