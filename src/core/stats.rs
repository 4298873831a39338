use std::time::Duration;
use serde::{Serialize, Deserialize};

/// Outcome of a `generate` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateReport {
    pub records: u64,
    pub bytes_per_file: u64,
    pub skipped: bool,
    pub elapsed: Duration,
}

impl GenerateReport {
    pub fn skipped() -> Self {
        GenerateReport {
            records: 0,
            bytes_per_file: 0,
            skipped: true,
            elapsed: Duration::ZERO,
        }
    }

    /// Records written per second, counting both files.
    pub fn records_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        (2 * self.records) as f64 / secs
    }
}

/// Outcome of loading one binary file into its store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub records: u64,
    pub blocks: u64,
}

/// Snapshot of a key-value store's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub keys: usize,
    pub values: usize,
    pub commits: u64,
    pub duplicates_skipped: u64,
}

/// Outcome of a `process` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    pub items: IngestReport,
    pub users: IngestReport,
    pub distinct_items: usize,
    pub distinct_users: usize,
    pub duplicate_items: u64,
    pub rows: u64,
    pub elapsed: Duration,
}
