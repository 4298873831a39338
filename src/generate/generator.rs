use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::Path;
use std::time::Instant;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::progress::Progress;
use crate::core::stats::GenerateReport;
use crate::core::types::{Record, MAX_PRICE, RECORD_SIZE};

/// Writes the `user_items.bin` / `item_prices.bin` pair block by block.
///
/// Each block is filled from one stream of synthetic records, then both files
/// are written in parallel and the next block starts only once both writes are
/// done. Both files must be generated together: if either already exists the
/// whole run is skipped.
pub struct Generator<'a> {
    config: &'a Config,
    rng: StdRng,
}

impl<'a> Generator<'a> {
    pub fn new(config: &'a Config) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Generator { config, rng }
    }

    pub fn run(mut self) -> Result<GenerateReport> {
        let config = self.config;
        fs::create_dir_all(&config.data_dir)
            .map_err(|e| Error::from(e).during(&format!("create {}", config.data_dir.display())))?;

        let user_path = config.user_items_path();
        let item_path = config.item_prices_path();

        if user_path.exists() || item_path.exists() {
            for path in [&user_path, &item_path] {
                if !path.exists() {
                    warn!(missing = %path.display(), "data file pair is incomplete, run clean and regenerate");
                }
            }
            info!("data files exist - skipping generation");
            return Ok(GenerateReport::skipped());
        }

        let Some(mut user_items) = create_sized(&user_path, config.file_size)? else {
            info!("data files appeared concurrently - skipping generation");
            return Ok(GenerateReport::skipped());
        };
        let Some(mut item_prices) = create_sized(&item_path, config.file_size)? else {
            drop(user_items);
            fs::remove_file(&user_path)?;
            info!("data files appeared concurrently - skipping generation");
            return Ok(GenerateReport::skipped());
        };

        info!(records = config.record_count(), blocks = config.block_count(), "generating data files...");

        let start = Instant::now();
        let block_size = config.block_size as usize;
        let mut user_block = vec![0u8; block_size];
        let mut item_block = vec![0u8; block_size];
        let mut progress = Progress::new("generate", config.block_count());

        for block in 0..config.block_count() {
            self.fill_block(&mut user_block, &mut item_block);

            let (user_written, item_written) = rayon::join(
                || user_items.write_all(&user_block),
                || item_prices.write_all(&item_block),
            );
            user_written.map_err(|e| Error::from(e).during(&format!("write {}", user_path.display())))?;
            item_written.map_err(|e| Error::from(e).during(&format!("write {}", item_path.display())))?;

            progress.update(block + 1, (block + 1) * config.block_size);
        }

        user_items.sync_all()
            .map_err(|e| Error::from(e).during(&format!("sync {}", user_path.display())))?;
        item_prices.sync_all()
            .map_err(|e| Error::from(e).during(&format!("sync {}", item_path.display())))?;

        let report = GenerateReport {
            records: config.record_count(),
            bytes_per_file: config.file_size,
            skipped: false,
            elapsed: start.elapsed(),
        };

        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            "done ({:.0} records/sec)", report.records_per_sec()
        );

        Ok(report)
    }

    /// Fill both blocks from the same record stream.
    fn fill_block(&mut self, user_block: &mut [u8], item_block: &mut [u8]) {
        let users = self.config.num_users;
        let items = self.config.num_items;

        for (user_slot, item_slot) in user_block
            .chunks_exact_mut(RECORD_SIZE)
            .zip(item_block.chunks_exact_mut(RECORD_SIZE))
        {
            let record = Record {
                user_id: self.rng.gen_range(0..users),
                item_id: self.rng.gen_range(0..items),
                price: self.rng.gen_range(0..MAX_PRICE),
            };
            record.encode_into(user_slot, item_slot);
        }
    }
}

/// Create `path` exclusively and pre-size it. `None` if it already exists.
fn create_sized(path: &Path, size: u64) -> Result<Option<File>> {
    let file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == IoErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(Error::from(e).during(&format!("create {}", path.display()))),
    };

    file.set_len(size).map_err(|e| {
        Error::new(ErrorKind::Io, format!("failed to allocate space for {} ({})", path.display(), e))
    })?;

    Ok(Some(file))
}

/// Generate both data files for `config`.
pub fn generate_files(config: &Config) -> Result<GenerateReport> {
    Generator::new(config).run()
}
