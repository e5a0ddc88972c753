//! Process-wide buffer pool for request bodies.
//!
//! Body reads check out a buffer, fill it, copy the result out and drop the
//! checkout, which returns the buffer to the pool on every exit path.
//!
//! The pool never holds more than `capacity` idle buffers. A buffer that
//! grew past `buffer_size` is replaced by a fresh one on return.

use object_pool::Pool;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, OnceLock};

const DEFAULT_POOL_CAPACITY: usize = 1024;
const DEFAULT_BUFFER_SIZE: usize = 4096;

static GLOBAL: OnceLock<BufferPool> = OnceLock::new();

/// Size the process-wide pool. Only the first call has an effect; returns
/// `false` if the pool was already initialised.
pub fn init(capacity: usize, buffer_size: usize) -> bool {
    GLOBAL.set(BufferPool::with_capacity(capacity, buffer_size)).is_ok()
}

/// The process-wide pool, created with defaults if `init` was never called.
pub fn global() -> &'static BufferPool {
    GLOBAL.get_or_init(|| BufferPool::with_capacity(DEFAULT_POOL_CAPACITY, DEFAULT_BUFFER_SIZE))
}

/// A pool of reusable byte buffers.
#[derive(Clone)]
pub struct BufferPool {
    pool: Arc<Pool<Vec<u8>>>,
    capacity: usize,
    buffer_size: usize,
}

impl BufferPool {
    pub fn with_capacity(capacity: usize, buffer_size: usize) -> Self {
        let pool = Pool::new(capacity, move || Vec::with_capacity(buffer_size));
        Self {
            pool: Arc::new(pool),
            capacity,
            buffer_size,
        }
    }

    /// Check out an empty buffer.
    pub fn get(&self) -> PooledBuf {
        let buffer_size = self.buffer_size;
        let (pool, mut buf) = self
            .pool
            .pull_owned(move || Vec::with_capacity(buffer_size))
            .detach();
        buf.clear();
        PooledBuf {
            buf,
            pool,
            capacity: self.capacity,
            buffer_size,
        }
    }

    /// Buffers currently idle in the pool.
    pub fn available(&self) -> usize {
        self.pool.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("available", &self.pool.len())
            .field("capacity", &self.capacity)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

/// A checked-out buffer; returns to its pool when dropped.
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: Arc<Pool<Vec<u8>>>,
    capacity: usize,
    buffer_size: usize,
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if self.pool.len() >= self.capacity {
            return;
        }
        let buf = if self.buf.capacity() > self.buffer_size {
            Vec::with_capacity(self.buffer_size)
        } else {
            std::mem::take(&mut self.buf)
        };
        self.pool.attach(buf);
    }
}
