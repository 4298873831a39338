use std::fs::File;
use std::path::Path;
use std::thread::{self, JoinHandle};
use crossbeam::channel::{bounded, Sender};
use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::ExpenseRow;

/// Single owner of the output CSV.
///
/// Rows arrive over a channel from any number of aggregation workers and are
/// written by one dedicated thread, so the file needs no lock.
pub struct ExpenseWriter {
    sender: Option<Sender<ExpenseRow>>,
    handle: Option<JoinHandle<Result<u64>>>,
}

impl ExpenseWriter {
    pub fn create(path: &Path, capacity: usize) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| Error::new(ErrorKind::Io, format!("failed to create {} ({})", path.display(), e)))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);

        let (sender, receiver) = bounded::<ExpenseRow>(capacity);

        let handle = thread::Builder::new()
            .name("expense-writer".to_string())
            .spawn(move || -> Result<u64> {
                let mut rows = 0u64;
                for row in receiver {
                    writer.serialize(row)?;
                    rows += 1;
                }
                writer.flush()?;
                let file = writer.into_inner()
                    .map_err(|e| Error::new(ErrorKind::Io, format!("failed to flush expenses ({})", e.error())))?;
                file.sync_all()?;
                debug!(rows, "expense writer closed");
                Ok(rows)
            })?;

        Ok(ExpenseWriter {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// A handle workers use to submit finished rows.
    pub fn rows(&self) -> RowSender {
        RowSender {
            sender: self.sender.clone(),
        }
    }

    /// Close the channel, wait for every queued row to be written, and return
    /// the row count. Only returns once all `RowSender`s are dropped.
    pub fn finish(mut self) -> Result<u64> {
        self.sender.take();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| {
                Error::new(ErrorKind::Internal, "expense writer panicked".to_string())
            })?,
            None => Ok(0),
        }
    }
}

impl Drop for ExpenseWriter {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[derive(Clone)]
pub struct RowSender {
    sender: Option<Sender<ExpenseRow>>,
}

impl RowSender {
    pub fn send(&self, row: ExpenseRow) -> Result<()> {
        let sender = self.sender.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::InvalidState, "expense writer is closed".to_string())
        })?;
        sender.send(row).map_err(|_| {
            Error::new(ErrorKind::Io, "expense writer stopped".to_string())
        })
    }
}
