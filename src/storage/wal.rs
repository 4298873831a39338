use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::storage::layout::StorageLayout;
use crate::core::error::{Error, ErrorKind, Result};

/// Frame header: payload length + crc32 of the payload.
const FRAME_HEADER: usize = 8;

/// Sanity bound on a single committed batch.
const MAX_FRAME: usize = 512 * 1024 * 1024;

const BATCH_SYNC_BYTES: u64 = 1024 * 1024;

/// Write-ahead log of committed transactions
pub struct Wal {
    pub file: File,
    pub position: u64,
    pub sync_mode: SyncMode,
    pub sequence: u64,
    unsynced: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    Immediate,  // fsync after every commit
    Batch,      // fsync once a megabyte has accumulated
    #[default]
    None,       // Let OS handle it
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(SyncMode::Immediate),
            "batch" => Ok(SyncMode::Batch),
            "none" => Ok(SyncMode::None),
            other => Err(format!("unknown sync mode '{}' (expected none, batch or immediate)", other)),
        }
    }
}

/// One committed transaction: every `(key, value)` put it carried, in order.
/// Put `i` sits at position `first_ordinal + i` in the store's insert order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalBatch {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub first_ordinal: u64,
    pub entries: Vec<(u64, u64)>,
}

impl Wal {
    pub fn open(storage: &StorageLayout, sync_mode: SyncMode) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(storage.wal_path())?;
        let position = file.metadata()?.len();

        Ok(Wal {
            file,
            position,
            sync_mode,
            sequence: 0,
            unsynced: 0,
        })
    }

    /// Append one batch as a single frame. Returns the batch sequence number.
    pub fn append(&mut self, first_ordinal: u64, entries: &[(u64, u64)]) -> Result<u64> {
        let batch = WalBatch {
            sequence: self.sequence,
            timestamp: Utc::now(),
            first_ordinal,
            entries: entries.to_vec(),
        };

        let data = bincode::serialize(&batch)?;
        let checksum = crc32fast::hash(&data);

        let mut frame = Vec::with_capacity(FRAME_HEADER + data.len());
        frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
        frame.extend_from_slice(&checksum.to_le_bytes());
        frame.extend_from_slice(&data);
        self.file.write_all(&frame)?;

        self.sequence += 1;
        self.position += frame.len() as u64;
        self.unsynced += frame.len() as u64;

        match self.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batch if self.unsynced >= BATCH_SYNC_BYTES => self.sync()?,
            _ => {}
        }

        Ok(batch.sequence)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Read every intact batch from the start of the log.
    ///
    /// A frame cut short at the end of the file is a torn write from an
    /// interrupted commit: it is dropped and the log truncated behind the last
    /// whole frame. A checksum mismatch on a complete frame is corruption.
    pub fn replay(&mut self) -> Result<Vec<WalBatch>> {
        let mut batches = Vec::new();
        let len = self.file.metadata()?.len();
        let mut good = 0u64;

        self.file.seek(SeekFrom::Start(0))?;

        loop {
            let mut header = [0u8; FRAME_HEADER];
            if !read_full(&mut self.file, &mut header)? {
                break;
            }

            let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let checksum = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if size > MAX_FRAME {
                return Err(Error::new(
                    ErrorKind::Corrupt,
                    format!("WAL frame at offset {} claims {} bytes", good, size),
                ));
            }

            let mut data = vec![0u8; size];
            if !read_full(&mut self.file, &mut data)? {
                break;
            }

            if crc32fast::hash(&data) != checksum {
                return Err(Error::new(
                    ErrorKind::Corrupt,
                    format!("WAL checksum mismatch at offset {}", good),
                ));
            }

            let batch: WalBatch = bincode::deserialize(&data)?;
            good += (FRAME_HEADER + size) as u64;
            batches.push(batch);
        }

        if good < len {
            warn!(dropped = len - good, "discarding torn WAL tail");
            self.file.set_len(good)?;
        }

        self.position = good;
        self.sequence = batches.last().map(|b| b.sequence + 1).unwrap_or(0);

        Ok(batches)
    }
}

/// Fill `buf` completely. Returns false when the file ends first.
fn read_full(file: &mut File, buf: &mut [u8]) -> Result<bool> {
    match file.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(Error::new(ErrorKind::Io, format!("Failed to read WAL: {}", e))),
    }
}
