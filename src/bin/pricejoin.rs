use std::path::PathBuf;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use pricejoin::core::config::Config;
use pricejoin::storage::kv_store::DuplicatePolicy;
use pricejoin::storage::wal::SyncMode;
use pricejoin::{Pipeline, Result};

#[derive(Parser, Debug)]
#[command(name = "pricejoin", about = "Generate purchase data and total every user's expenses")]
struct Cli {
    /// Directory holding data files, stores and the output CSV
    #[arg(long, env = "DATA_DIR", default_value = "./data", global = true)]
    data_dir: PathBuf,

    /// Bytes per generated file
    #[arg(long, env = "FILE_SIZE", default_value_t = 1024 * 1024 * 1024, global = true)]
    file_size: u64,

    /// Bytes per block (clamped to the file size)
    #[arg(long, env = "BLOCK_SIZE", default_value_t = 10 * 1024 * 1024, global = true)]
    block_size: u64,

    /// Workers per pool
    #[arg(long, env = "MAX_CPUS", default_value_t = default_workers(), global = true)]
    workers: usize,

    #[arg(long, env = "UNIQUE_USERS", default_value_t = 1_000_000, global = true)]
    users: u64,

    #[arg(long, env = "UNIQUE_ITEMS", default_value_t = 1_000_000, global = true)]
    items: u64,

    /// What to do with repeated item ids: fail, first or last
    #[arg(long, env = "ITEM_DUPLICATES", default_value = "first", global = true)]
    item_duplicates: DuplicatePolicy,

    /// Store WAL sync: none, batch or immediate
    #[arg(long, env = "STORE_SYNC", default_value = "none", global = true)]
    sync: SyncMode,

    /// Seed for reproducible data
    #[arg(long, env = "SEED", global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate user_items.bin and item_prices.bin
    Generate,
    /// Process the data files into user_expenses.csv
    Process,
    /// Remove every generated file and store from the data directory
    Clean,
}

fn default_workers() -> usize {
    num_cpus::get().min(8)
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            data_dir: self.data_dir.clone(),
            file_size: self.file_size,
            block_size: self.block_size,
            workers: self.workers,
            num_users: self.users,
            num_items: self.items,
            item_duplicates: self.item_duplicates,
            sync_mode: self.sync,
            seed: self.seed,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        error!(command = ?cli.command, "{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let pipeline = Pipeline::new(cli.config())?;

    match cli.command {
        Command::Generate => {
            let report = pipeline.generate()?;
            if !report.skipped {
                info!(records = report.records, bytes = report.bytes_per_file, "generated");
            }
        }
        Command::Process => {
            let report = pipeline.process()?;
            info!(
                items = report.items.records,
                users = report.users.records,
                distinct_items = report.distinct_items,
                distinct_users = report.distinct_users,
                duplicate_items = report.duplicate_items,
                rows = report.rows,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "processed"
            );
        }
        Command::Clean => pipeline.clean()?,
    }

    Ok(())
}
