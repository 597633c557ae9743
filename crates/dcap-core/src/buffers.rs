//! Rented byte buffers.
//!
//! A [`PooledBuffer`] goes back to the [`BufferPool`] it was rented from when
//! it is dropped. Drop runs exactly once per value, so each rental is returned
//! exactly once. Cloning rents a second buffer; clones never share storage.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

const DEFAULT_MAX_RETAINED: usize = 8;

/// Counters used by diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub rented: usize,
    pub returned: usize,
    pub retained: usize,
}

impl PoolStats {
    pub fn outstanding(&self) -> usize {
        self.rented - self.returned
    }
}

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    max_retained: usize,
    rented: AtomicUsize,
    returned: AtomicUsize,
}

/// Reusable storage for frame-sized allocations.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(max_retained: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                max_retained,
                rented: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
            }),
        }
    }

    /// Process-wide pool used by capture streams.
    pub fn shared() -> BufferPool {
        static SHARED: OnceLock<BufferPool> = OnceLock::new();
        SHARED
            .get_or_init(|| BufferPool::new(DEFAULT_MAX_RETAINED))
            .clone()
    }

    /// Rent a zero-filled buffer of exactly `len` bytes.
    pub fn rent(&self, len: usize) -> PooledBuffer {
        let recycled = {
            let mut free = self.inner.free.lock().unwrap_or_else(|e| e.into_inner());
            free.iter()
                .position(|b| b.capacity() >= len)
                .map(|i| free.swap_remove(i))
        };
        let mut data = recycled.unwrap_or_else(|| Vec::with_capacity(len));
        data.clear();
        data.resize(len, 0);
        self.inner.rented.fetch_add(1, Ordering::AcqRel);
        PooledBuffer {
            data,
            pool: self.clone(),
        }
    }

    /// Rent a buffer holding a copy of `src`.
    pub fn rent_copy(&self, src: &[u8]) -> PooledBuffer {
        let mut buffer = self.rent(src.len());
        buffer.copy_from_slice(src);
        buffer
    }

    pub fn stats(&self) -> PoolStats {
        let retained = self
            .inner
            .free
            .lock()
            .map(|f| f.len())
            .unwrap_or_else(|e| e.into_inner().len());
        PoolStats {
            rented: self.inner.rented.load(Ordering::Acquire),
            returned: self.inner.returned.load(Ordering::Acquire),
            retained,
        }
    }

    fn give_back(&self, data: Vec<u8>) {
        self.inner.returned.fetch_add(1, Ordering::AcqRel);
        let mut free = self.inner.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.inner.max_retained {
            free.push(data);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        BufferPool::new(DEFAULT_MAX_RETAINED)
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool").field("stats", &self.stats()).finish()
    }
}

/// A byte buffer on loan from a [`BufferPool`].
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: BufferPool,
}

impl PooledBuffer {
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

impl Clone for PooledBuffer {
    fn clone(&self) -> Self {
        self.pool.rent_copy(&self.data)
    }
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
        self.pool.give_back(data);
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.data.len()).finish()
    }
}
