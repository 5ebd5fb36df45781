//! Reusable read-ahead buffers for the handshake phase
//!
//! Buffers are borrowed at connection start and handed back as soon as the
//! backend has been bootstrapped, well before the relay. A returned buffer is
//! cleared, so the next borrower never sees another connection's bytes.

use bytes::BytesMut;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Free-list cache of read buffers. Unbounded; [`ReaderPool::shrink_to`] lets
/// an owner reclaim idle entries.
pub struct ReaderPool {
    free: Mutex<Vec<BytesMut>>,
    buffer_size: usize,
    allocations: AtomicU64,
    reuses: AtomicU64,
    returns: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub allocations: u64,
    pub reuses: u64,
    pub returns: u64,
    pub idle: usize,
}

impl ReaderPool {
    pub fn new(buffer_size: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            buffer_size,
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            returns: AtomicU64::new(0),
        })
    }

    /// Borrow a clean buffer, allocating one if the cache is empty
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let reused = self.free.lock().ok().and_then(|mut free| free.pop());

        let buf = match reused {
            Some(buf) => {
                self.reuses.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(self.buffer_size)
            }
        };

        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut buf: BytesMut) {
        buf.clear();
        // Only buffers of the nominal size go back on the free list
        if buf.capacity() > self.buffer_size {
            return;
        }
        if let Ok(mut free) = self.free.lock() {
            free.push(buf);
            self.returns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of buffers waiting for reuse
    pub fn idle(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }

    /// Drop idle buffers beyond `max_idle`
    pub fn shrink_to(&self, max_idle: usize) {
        if let Ok(mut free) = self.free.lock() {
            free.truncate(max_idle);
            free.shrink_to_fit();
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            idle: self.idle(),
        }
    }
}

/// A borrowed buffer; returned to its pool on drop
pub struct PooledBuffer {
    buf: BytesMut,
    pool: Arc<ReaderPool>,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
