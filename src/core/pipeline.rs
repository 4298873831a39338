use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Instant;
use tracing::info;
use crate::aggregate::aggregator::aggregate_expenses;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{GenerateReport, ProcessReport};
use crate::generate::generator::generate_files;
use crate::ingest::ingester::ingest_file;
use crate::storage::kv_store::{KeyMode, KvStore};
use crate::storage::wal::SyncMode;

/// Run stages, in order. A failure ends the run where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Generating,
    Ingesting,
    Joining,
    Draining,
    Done,
}

/// Top-level driver for `generate`, `process` and `clean`.
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Pipeline {
            config: config.validated()?,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write the two binary data files unless they already exist.
    pub fn generate(&self) -> Result<GenerateReport> {
        transition(RunState::Idle, RunState::Generating);
        let report = generate_files(&self.config)?;
        transition(RunState::Generating, RunState::Done);
        Ok(report)
    }

    /// Load both data files into fresh stores, join them into the expenses
    /// CSV, then drop the stores.
    pub fn process(&self) -> Result<ProcessReport> {
        let config = &self.config;
        let start = Instant::now();

        fs::create_dir_all(&config.data_dir)?;

        transition(RunState::Idle, RunState::Ingesting);

        let items = Arc::new(open_fresh(
            &config.item_store_dir(),
            "item-prices",
            KeyMode::Unique(config.item_duplicates),
            config,
        )?);
        let users = Arc::new(open_fresh(&config.user_store_dir(), "user-items", KeyMode::Multi, config)?);

        let abort = AtomicBool::new(false);
        let (item_report, user_report) = thread::scope(|s| {
            let abort = &abort;
            let item_loader = {
                let items = items.clone();
                s.spawn(move || ingest_file(config, "item-prices", config.item_prices_path(), items, abort))
            };
            let user_loader = {
                let users = users.clone();
                s.spawn(move || ingest_file(config, "user-items", config.user_items_path(), users, abort))
            };
            (join_stage(item_loader), join_stage(user_loader))
        });
        let (item_report, user_report) = first_cause(item_report, user_report)?;

        transition(RunState::Ingesting, RunState::Joining);

        let rows = aggregate_expenses(config, items.clone(), &users)?;

        transition(RunState::Joining, RunState::Draining);

        let item_stats = items.stats();
        let user_stats = users.stats();

        release(items)?.destroy()?;
        release(users)?.destroy()?;

        let report = ProcessReport {
            items: item_report,
            users: user_report,
            distinct_items: item_stats.keys,
            distinct_users: user_stats.keys,
            duplicate_items: item_stats.duplicates_skipped,
            rows,
            elapsed: start.elapsed(),
        };

        transition(RunState::Draining, RunState::Done);
        info!(rows = report.rows, elapsed_ms = report.elapsed.as_millis() as u64, "done");

        Ok(report)
    }

    /// Remove everything under the data directory and recreate it empty.
    pub fn clean(&self) -> Result<()> {
        clean_data_dir(&self.config.data_dir)
    }
}

fn transition(from: RunState, to: RunState) {
    info!(from = ?from, to = ?to, "run state");
}

/// Open a store in an empty directory, discarding leftovers of an aborted run.
///
/// The stores are rebuilt from the data files on every run, so with
/// `SyncMode::None` nothing would ever be replayed and the store runs without
/// a WAL. Other sync modes keep the log for its durability on disk.
fn open_fresh(dir: &Path, name: &str, mode: KeyMode, config: &Config) -> Result<KvStore> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .map_err(|e| Error::new(ErrorKind::Io, format!("failed to clear {} ({})", dir.display(), e)))?;
    }
    let store = match config.sync_mode {
        SyncMode::None => KvStore::open_scratch(dir.to_path_buf(), name, mode),
        sync_mode => KvStore::open(dir.to_path_buf(), name, mode, sync_mode),
    };
    store.map_err(|e| e.during(&format!("open {}", name)))
}

/// Combine the two loader results, reporting the failure that caused an abort
/// rather than the abort itself.
fn first_cause<A, B>(a: Result<A>, b: Result<B>) -> Result<(A, B)> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(a), Err(b)) if a.kind == ErrorKind::Aborted => Err(b),
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

fn join_stage<T>(handle: thread::ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    handle.join().unwrap_or_else(|_| {
        Err(Error::new(ErrorKind::Internal, "ingestion thread panicked".to_string()))
    })
}

fn release(store: Arc<KvStore>) -> Result<KvStore> {
    Arc::try_unwrap(store).map_err(|store| {
        Error::new(ErrorKind::Internal, format!("{} is still in use", store.name()))
    })
}

pub fn clean_data_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|e| Error::new(ErrorKind::Io, format!("failed to remove {} ({})", path.display(), e)))?;
        }
    }

    fs::create_dir_all(dir)
        .map_err(|e| Error::new(ErrorKind::Io, format!("failed to re-create {} ({})", dir.display(), e)))?;
    info!(dir = %dir.display(), "data directory cleaned");
    Ok(())
}
