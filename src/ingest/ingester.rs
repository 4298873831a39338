use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::progress::Progress;
use crate::core::stats::IngestReport;
use crate::core::types::{records, RECORD_SIZE};
use crate::memory::buffer_pool::{BufferPool, PooledBuffer};
use crate::parallel::pool::WorkerPool;
use crate::storage::kv_store::KvStore;

/// Loads one binary record file into a store.
///
/// The file is read sequentially, one block per read, and each filled block
/// is handed synchronously to an idle worker, which decodes it and commits it
/// as one transaction. Blocks may commit out of file order, but each commit is
/// placed at its block's record position so duplicate keys resolve by file
/// order. The source file is deleted once every block has committed.
///
/// `abort` is shared with sibling loaders: a failing loader raises it and the
/// others stop reading at their next block.
pub struct Ingester<'a> {
    config: &'a Config,
    label: &'static str,
    path: PathBuf,
    store: Arc<KvStore>,
    abort: &'a AtomicBool,
}

impl<'a> Ingester<'a> {
    pub fn new(
        config: &'a Config,
        label: &'static str,
        path: PathBuf,
        store: Arc<KvStore>,
        abort: &'a AtomicBool,
    ) -> Self {
        Ingester { config, label, path, store, abort }
    }

    pub fn run(self) -> Result<IngestReport> {
        let abort = self.abort;
        let result = self.load();
        if let Err(e) = &result {
            if e.kind != ErrorKind::Aborted {
                abort.store(true, Ordering::SeqCst);
            }
        }
        result
    }

    fn load(self) -> Result<IngestReport> {
        let config = self.config;
        let mut file = File::open(&self.path)
            .map_err(|e| Error::from(e).during(&format!("open {}", self.path.display())))?;

        let len = file.metadata()?.len();
        if len != config.file_size {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("{} is {} bytes, expected {}", self.path.display(), len, config.file_size),
            ));
        }

        let buffers = BufferPool::new(config.workers + 1, config.block_size as usize);
        let store = self.store.clone();
        let per_block = config.records_per_block();
        let pool = WorkerPool::start(self.label, config.workers, 0, move |(index, block): (u64, PooledBuffer)| {
            store_block(&store, index * per_block, &block)
        })?;

        let blocks = config.block_count();
        let mut progress = Progress::new(self.label, blocks);

        for i in 0..blocks {
            if self.abort.load(Ordering::SeqCst) {
                warn!(stage = self.label, block = i, "stopping, another loader failed");
                return Err(Error::new(
                    ErrorKind::Aborted,
                    format!("{} stopped at block {} of {}", self.label, i, blocks),
                ));
            }

            let mut buf = buffers.get()?;
            file.read_exact(&mut buf)
                .map_err(|e| Error::from(e).during(&format!("read {}", self.path.display())))?;

            pool.submit((i, buf))?;

            progress.update(i + 1, (i + 1) * config.block_size);
        }

        let committed = pool.wait()?;
        drop(file);

        remove_source(&self.path)?;

        let report = IngestReport {
            records: committed * config.records_per_block(),
            blocks: committed,
        };
        info!(stage = self.label, records = report.records, blocks = report.blocks, "ingested");

        Ok(report)
    }
}

/// Decode one block and commit all of its records in a single transaction.
/// `first_record` is the file position of the block's first record.
pub fn store_block(store: &KvStore, first_record: u64, block: &[u8]) -> Result<()> {
    let mut txn = store.begin()
        .with_capacity(block.len() / RECORD_SIZE)
        .at_ordinal(first_record);

    for (key, value) in records(block) {
        txn.put(key, value)?;
    }

    let outcome = txn.commit()
        .map_err(|e| e.during(&format!("{} block commit", store.name())))?;

    debug!(
        store = store.name(),
        sequence = outcome.sequence,
        applied = outcome.applied,
        duplicates = outcome.duplicates,
        "block committed"
    );

    Ok(())
}

fn remove_source(path: &Path) -> Result<()> {
    fs::remove_file(path)
        .map_err(|e| Error::new(ErrorKind::Io, format!("failed to remove {} ({})", path.display(), e)))
}

/// Load `path` into `store` using `config.workers` workers. Stops early with
/// `Aborted` once `abort` is raised, leaving the source file in place.
pub fn ingest_file(
    config: &Config,
    label: &'static str,
    path: PathBuf,
    store: Arc<KvStore>,
    abort: &AtomicBool,
) -> Result<IngestReport> {
    Ingester::new(config, label, path, store, abort).run()
}
