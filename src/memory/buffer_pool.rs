use std::ops::{Deref, DerefMut};
use crossbeam::channel::{unbounded, Receiver, Sender};
use crate::core::error::{Error, ErrorKind, Result};

/// Fixed set of reusable block buffers.
///
/// A buffer leaves the pool by value and goes back when its `PooledBuffer` is
/// dropped, wherever that happens, so the reader can never overwrite a block
/// a worker is still decoding and memory stays at `count * size`.
pub struct BufferPool {
    free: Receiver<Vec<u8>>,
    home: Sender<Vec<u8>>,
    pub size: usize,
    pub count: usize,
}

impl BufferPool {
    pub fn new(count: usize, size: usize) -> Self {
        let (home, free) = unbounded();

        for _ in 0..count {
            // Receiver is alive, send cannot fail
            let _ = home.send(vec![0u8; size]);
        }

        BufferPool { free, home, size, count }
    }

    /// Take a free buffer, blocking until one is returned.
    pub fn get(&self) -> Result<PooledBuffer> {
        let data = self.free.recv().map_err(|_| {
            Error::new(ErrorKind::Internal, "buffer pool disconnected".to_string())
        })?;

        Ok(PooledBuffer {
            data,
            home: self.home.clone(),
        })
    }

    /// Buffers currently sitting in the pool.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

/// A block buffer on loan from a `BufferPool`.
pub struct PooledBuffer {
    data: Vec<u8>,
    home: Sender<Vec<u8>>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        let _ = self.home.send(data);
    }
}
