//! Bounded capture of worker output.
//!
//! The worker's stdout and stderr are pumped into a single ring of fixed size.
//! Only the most recent `capacity` bytes are retained, so a chatty worker can run
//! for days without growing the supervisor's memory, and a crash dump still
//! shows the tail that matters.
//!
//! Readers (crash dumps, `logs()`) share a read lock; the pump tasks take the
//! write lock per chunk.

use std::sync::{PoisonError, RwLock};

/// Default retention window: 32 MiB.
pub const DEFAULT_LOG_CAPACITY: usize = 32 * 1024 * 1024;

/// Fixed-capacity circular byte buffer holding the last `capacity` bytes written.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    inner: RwLock<Ring>,
}

#[derive(Debug)]
struct Ring {
    data: Vec<u8>,
    pos: usize,
    size: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(Ring {
                data: vec![0; capacity],
                pos: 0,
                size: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a chunk, overwriting the oldest bytes once full.
    ///
    /// Always returns `bytes.len()`. A chunk longer than the capacity keeps only
    /// its trailing `capacity` bytes.
    pub fn append(&self, bytes: &[u8]) -> usize {
        let written = bytes.len();
        if self.capacity == 0 || bytes.is_empty() {
            return written;
        }

        let chunk = if bytes.len() > self.capacity {
            &bytes[bytes.len() - self.capacity..]
        } else {
            bytes
        };
        let n = chunk.len();

        // Capture is best-effort: a writer that panicked mid-copy leaves at worst
        // garbled log bytes, never a broken invariant on pos/size.
        let mut ring = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let pos = ring.pos;

        let head = n.min(self.capacity - pos);
        ring.data[pos..pos + head].copy_from_slice(&chunk[..head]);
        if head < n {
            ring.data[..n - head].copy_from_slice(&chunk[head..]);
        }

        ring.pos = (pos + n) % self.capacity;
        ring.size = (ring.size + n).min(self.capacity);

        written
    }

    /// Retained bytes in chronological order.
    pub fn snapshot(&self) -> Vec<u8> {
        let ring = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        if ring.size < self.capacity {
            return ring.data[..ring.size].to_vec();
        }

        let mut out = Vec::with_capacity(self.capacity);
        out.extend_from_slice(&ring.data[ring.pos..]);
        out.extend_from_slice(&ring.data[..ring.pos]);
        out
    }

    /// Snapshot decoded as UTF-8, replacing invalid sequences.
    ///
    /// The window may start in the middle of a multi-byte character once the
    /// ring has wrapped.
    pub fn snapshot_lossy(&self) -> String {
        String::from_utf8_lossy(&self.snapshot()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
