use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};

/// Fixed-size pool of worker threads consuming typed units of work.
///
/// Producers `submit` into a bounded channel; a full channel blocks the
/// producer, which is the only backpressure in the pipeline. Capacity 0 makes
/// every submit a synchronous handoff to an idle worker.
///
/// The first error returned by the work function stops the pool: workers stop
/// taking items, the channel disconnects, and both `submit` and `wait` report
/// that error.
pub struct WorkerPool<T> {
    name: String,
    sender: Option<Sender<T>>,
    handles: Vec<JoinHandle<()>>,
    failure: Arc<Mutex<Option<Error>>>,
    aborted: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn start<F>(name: &str, workers: usize, capacity: usize, work: F) -> Result<Self>
    where
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        if workers == 0 {
            return Err(Error::new(ErrorKind::InvalidArgument, format!("{}: pool needs at least one worker", name)));
        }

        let (sender, receiver) = bounded::<T>(capacity);
        let work = Arc::new(work);
        let failure = Arc::new(Mutex::new(None));
        let aborted = Arc::new(AtomicBool::new(false));
        let processed = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::with_capacity(workers);

        for i in 0..workers {
            let receiver = receiver.clone();
            let work = work.clone();
            let failure = failure.clone();
            let aborted = aborted.clone();
            let processed = processed.clone();

            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || {
                    while let Ok(item) = receiver.recv() {
                        if aborted.load(Ordering::Acquire) {
                            break;
                        }

                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(item)))
                            .unwrap_or_else(|_| Err(Error::new(ErrorKind::Internal, "worker panicked".to_string())));

                        if let Err(e) = outcome {
                            let mut slot = failure.lock();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            aborted.store(true, Ordering::Release);
                            break;
                        }

                        processed.fetch_add(1, Ordering::Relaxed);
                    }
                })?;

            handles.push(handle);
        }

        debug!(pool = name, workers, capacity, "worker pool started");

        Ok(WorkerPool {
            name: name.to_string(),
            sender: Some(sender),
            handles,
            failure,
            aborted,
            processed,
        })
    }

    /// Hand one unit of work to the pool, blocking while the channel is full.
    pub fn submit(&self, item: T) -> Result<()> {
        if self.aborted.load(Ordering::Acquire) {
            return Err(self.failure_snapshot());
        }

        let sender = self.sender.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::InvalidState, format!("{}: pool is closed", self.name))
        })?;

        sender.send(item).map_err(|_| self.failure_snapshot())
    }

    /// Items completed so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Close the channel, let workers drain what is queued, and join them.
    /// Returns the number of items processed, or the first worker error.
    pub fn wait(mut self) -> Result<u64> {
        self.sender.take();

        for handle in std::mem::take(&mut self.handles) {
            if handle.join().is_err() {
                let mut slot = self.failure.lock();
                if slot.is_none() {
                    *slot = Some(Error::new(ErrorKind::Internal, format!("{}: worker thread died", self.name)));
                }
            }
        }

        if let Some(e) = self.failure.lock().take() {
            return Err(e);
        }

        let processed = self.processed();
        debug!(pool = %self.name, processed, "worker pool drained");
        Ok(processed)
    }

    fn failure_snapshot(&self) -> Error {
        match self.failure.lock().as_ref() {
            Some(e) => Error::new(e.kind, e.context.clone()),
            None => Error::new(ErrorKind::Internal, format!("{}: workers stopped", self.name)),
        }
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
