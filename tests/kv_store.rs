use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use pricejoin::ErrorKind;
use pricejoin::storage::kv_store::{DuplicatePolicy, KeyMode, KvStore};
use pricejoin::storage::transaction::TransactionState;
use pricejoin::storage::wal::SyncMode;

fn open(dir: &Path, mode: KeyMode) -> KvStore {
    KvStore::open(dir.join("store"), "test", mode, SyncMode::None).unwrap()
}

fn commit(store: &KvStore, puts: &[(u64, u64)]) -> pricejoin::Result<()> {
    let mut txn = store.begin();
    for &(k, v) in puts {
        txn.put(k, v)?;
    }
    txn.commit().map(|_| ())
}

#[test]
fn multimap_cursor_groups_every_value_by_key() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Multi);

    commit(&store, &[(3, 30), (1, 10), (3, 31)]).unwrap();
    commit(&store, &[(2, 20), (1, 11), (3, 32)]).unwrap();

    let entries: Vec<_> = store.cursor().collect();
    assert_eq!(
        entries,
        vec![(1, vec![10, 11]), (2, vec![20]), (3, vec![30, 31, 32])]
    );

    let stats = store.stats();
    assert_eq!(stats.keys, 3);
    assert_eq!(stats.values, 6);
    assert_eq!(stats.commits, 2);
}

#[test]
fn cursor_over_empty_store_ends_immediately() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Multi);

    let mut cursor = store.cursor();
    assert!(cursor.next_entry().is_none());
    assert!(cursor.next_entry().is_none());
}

#[test]
fn keep_first_never_overwrites() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Unique(DuplicatePolicy::KeepFirst));

    commit(&store, &[(7, 100)]).unwrap();
    commit(&store, &[(7, 999), (8, 5)]).unwrap();

    assert_eq!(store.get_one(7), Some(100));
    assert_eq!(store.get_one(8), Some(5));
    assert_eq!(store.stats().duplicates_skipped, 1);
}

#[test]
fn keep_first_applies_within_one_transaction() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Unique(DuplicatePolicy::KeepFirst));

    commit(&store, &[(4, 1), (4, 2), (4, 3)]).unwrap();

    assert_eq!(store.get(4), Some(vec![1]));
    assert_eq!(store.stats().duplicates_skipped, 2);
}

#[test]
fn keep_last_replaces() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Unique(DuplicatePolicy::KeepLast));

    commit(&store, &[(7, 100)]).unwrap();
    commit(&store, &[(7, 999)]).unwrap();

    assert_eq!(store.get(7), Some(vec![999]));
}

fn commit_at(store: &KvStore, first: u64, puts: &[(u64, u64)]) {
    let mut txn = store.begin().at_ordinal(first);
    for &(k, v) in puts {
        txn.put(k, v).unwrap();
    }
    txn.commit().unwrap();
}

#[test]
fn keep_first_follows_placement_not_commit_order() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Unique(DuplicatePolicy::KeepFirst));

    // The later block of the file commits first
    commit_at(&store, 100, &[(7, 999), (8, 5)]);
    commit_at(&store, 0, &[(9, 1), (7, 100)]);
    commit_at(&store, 200, &[(7, 555)]);

    assert_eq!(store.get(7), Some(vec![100]));
    assert_eq!(store.get_one(8), Some(5));
    assert_eq!(store.stats().duplicates_skipped, 2);
}

#[test]
fn keep_last_follows_placement_not_commit_order() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Unique(DuplicatePolicy::KeepLast));

    commit_at(&store, 200, &[(7, 555)]);
    commit_at(&store, 0, &[(7, 100)]);
    commit_at(&store, 100, &[(7, 999)]);

    assert_eq!(store.get(7), Some(vec![555]));
}

#[test]
fn unplaced_commits_follow_placed_ones() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Unique(DuplicatePolicy::KeepLast));

    commit_at(&store, 50, &[(1, 10), (2, 20)]);
    commit(&store, &[(1, 11)]).unwrap();

    assert_eq!(store.get_one(1), Some(11));
}

#[test]
fn replay_keeps_placement_order() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(dir.path(), KeyMode::Unique(DuplicatePolicy::KeepFirst));
        commit_at(&store, 10, &[(3, 30)]);
        commit_at(&store, 0, &[(3, 3)]);
        store.sync().unwrap();
    }

    let store = open(dir.path(), KeyMode::Unique(DuplicatePolicy::KeepFirst));
    assert_eq!(store.get_one(3), Some(3));
}

#[test]
fn scratch_store_writes_no_wal() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("scratch");
    let store = KvStore::open_scratch(root.clone(), "scratch", KeyMode::Multi).unwrap();
    assert!(!store.is_logged());

    commit(&store, &[(1, 10), (1, 11)]).unwrap();
    commit(&store, &[(2, 20)]).unwrap();
    store.sync().unwrap();

    assert_eq!(store.get(1), Some(vec![10, 11]));
    assert_eq!(store.stats().commits, 2);
    assert!(!root.join("wal").join("wal_00000000.log").exists());

    store.destroy().unwrap();
    assert!(!root.exists());
}

#[test]
fn fail_fast_aborts_the_whole_transaction() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Unique(DuplicatePolicy::FailFast));

    commit(&store, &[(7, 100)]).unwrap();
    let err = commit(&store, &[(8, 1), (7, 999)]).unwrap_err();

    assert_eq!(err.kind, ErrorKind::Conflict);
    assert_eq!(store.get_one(7), Some(100));
    assert_eq!(store.get_one(8), None, "no put from the failed block is visible");
    assert_eq!(store.stats().commits, 1);
}

#[test]
fn rolled_back_and_dropped_transactions_leave_no_trace() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Multi);

    let mut txn = store.begin();
    txn.put(1, 1).unwrap();
    assert_eq!(txn.state(), TransactionState::Active);
    assert_eq!(txn.pending(), 1);
    txn.rollback();

    {
        let mut txn = store.begin();
        txn.put(2, 2).unwrap();
    }

    assert!(store.is_empty());
    assert_eq!(store.stats().commits, 0);
}

#[test]
fn reopening_replays_committed_batches() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(dir.path(), KeyMode::Multi);
        commit(&store, &[(1, 10), (1, 11)]).unwrap();
        commit(&store, &[(2, 20)]).unwrap();
        store.sync().unwrap();
    }

    let store = open(dir.path(), KeyMode::Multi);
    assert_eq!(store.get(1), Some(vec![10, 11]));
    assert_eq!(store.get(2), Some(vec![20]));
    assert_eq!(store.stats().commits, 2);
}

#[test]
fn torn_wal_tail_is_discarded() {
    let dir = TempDir::new().unwrap();
    let wal = dir.path().join("store").join("wal").join("wal_00000000.log");
    {
        let store = open(dir.path(), KeyMode::Multi);
        commit(&store, &[(1, 10)]).unwrap();
    }
    let intact = fs::metadata(&wal).unwrap().len();

    // Half a frame header from an interrupted commit
    let mut file = OpenOptions::new().append(true).open(&wal).unwrap();
    file.write_all(&[0x40, 0x00, 0x00]).unwrap();
    drop(file);

    let store = open(dir.path(), KeyMode::Multi);
    assert_eq!(store.get(1), Some(vec![10]));
    assert_eq!(fs::metadata(&wal).unwrap().len(), intact);

    // The log is still appendable after the repair
    commit(&store, &[(2, 20)]).unwrap();
    drop(store);
    let store = open(dir.path(), KeyMode::Multi);
    assert_eq!(store.len(), 2);
}

#[test]
fn corrupted_wal_frame_is_an_error() {
    let dir = TempDir::new().unwrap();
    let wal = dir.path().join("store").join("wal").join("wal_00000000.log");
    {
        let store = open(dir.path(), KeyMode::Multi);
        commit(&store, &[(1, 10)]).unwrap();
    }

    let mut bytes = fs::read(&wal).unwrap();
    bytes[8] ^= 0xFF;
    fs::write(&wal, bytes).unwrap();

    let err = KvStore::open(dir.path().join("store"), "test", KeyMode::Multi, SyncMode::None)
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::Corrupt);
}

#[cfg(unix)]
#[test]
fn store_directory_has_a_single_opener() {
    let dir = TempDir::new().unwrap();
    let _first = open(dir.path(), KeyMode::Multi);

    let second = KvStore::open(dir.path().join("store"), "again", KeyMode::Multi, SyncMode::None);
    assert!(second.is_err());
}

#[test]
fn destroy_removes_the_directory() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Multi);
    commit(&store, &[(1, 1)]).unwrap();

    store.destroy().unwrap();
    assert!(!dir.path().join("store").exists());
}

#[test]
fn concurrent_block_commits_are_all_applied() {
    let dir = TempDir::new().unwrap();
    let store = open(dir.path(), KeyMode::Multi);

    std::thread::scope(|s| {
        for block in 0..8u64 {
            let store = &store;
            s.spawn(move || {
                let puts: Vec<_> = (0..100u64).map(|i| (i % 10, block * 100 + i)).collect();
                commit(store, &puts).unwrap();
            });
        }
    });

    assert_eq!(store.len(), 10);
    assert_eq!(store.stats().values, 800);
    for (_, values) in store.cursor() {
        assert_eq!(values.len(), 80);
    }
}
