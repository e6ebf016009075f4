//! Blocking Ring Buffer Implementation

use crate::RingBufferError;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default buffer capacity (32768 samples, ~1 s at 30 kHz)
pub const DEFAULT_CAPACITY: usize = 32_768;

/// Point-in-time view of the buffer's cursors and counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    /// Total slots
    pub capacity: usize,
    /// Unread samples
    pub len: usize,
    /// Next slot the producer writes
    pub write_index: usize,
    /// Next slot the consumer reads
    pub read_index: usize,
    /// Samples accepted by `write` since construction
    pub total_written: u64,
    /// Samples handed out by reads since construction
    pub total_read: u64,
    /// Unread samples lost to overflow since construction
    pub overwritten: u64,
}

/// State guarded by the buffer lock
struct Inner<T> {
    storage: Box<[T]>,
    write_cursor: usize,
    read_cursor: usize,
    /// Unread samples. Tracked explicitly so every slot is usable and a
    /// full buffer is distinguishable from an empty one.
    len: usize,
    interrupted: bool,
    overflowing: bool,
    total_written: u64,
    total_read: u64,
    overwritten: u64,
}

impl<T> Inner<T> {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn stats(&self) -> RingStats {
        RingStats {
            capacity: self.capacity(),
            len: self.len,
            write_index: self.write_cursor,
            read_index: self.read_cursor,
            total_written: self.total_written,
            total_read: self.total_read,
            overwritten: self.overwritten,
        }
    }
}

impl<T: Copy> Inner<T> {
    /// Copy `data` in at the write cursor, returning how many unread samples
    /// were overwritten.
    fn push_slice(&mut self, data: &[T]) -> usize {
        let capacity = self.capacity();
        let count = data.len();

        // Anything before the newest `capacity` samples would be overwritten
        // within this same call, so skip straight past it.
        let skipped = count.saturating_sub(capacity);
        let kept = &data[skipped..];
        let start = (self.write_cursor + skipped) % capacity;

        let first = (capacity - start).min(kept.len());
        self.storage[start..start + first].copy_from_slice(&kept[..first]);
        let rest = &kept[first..];
        self.storage[..rest.len()].copy_from_slice(rest);

        self.write_cursor = (self.write_cursor + count) % capacity;

        let held = self.len + count;
        let lost = held.saturating_sub(capacity);
        self.len = held.min(capacity);
        if lost > 0 {
            // Full: the oldest surviving sample sits right at the write cursor
            self.read_cursor = self.write_cursor;
        }

        self.total_written += count as u64;
        self.overwritten += lost as u64;
        lost
    }

    /// Copy `out.len()` samples out at the read cursor. Caller guarantees
    /// `out.len() <= self.len`.
    fn pop_into(&mut self, out: &mut [T]) {
        let capacity = self.capacity();
        let count = out.len();

        let first = (capacity - self.read_cursor).min(count);
        out[..first].copy_from_slice(&self.storage[self.read_cursor..self.read_cursor + first]);
        out[first..].copy_from_slice(&self.storage[..count - first]);

        self.read_cursor = (self.read_cursor + count) % capacity;
        self.len -= count;
        self.total_read += count as u64;
    }
}

/// Bounded ring buffer with a non-blocking producer and a blocking consumer.
///
/// All state lives behind a single lock paired with a condition variable.
/// `write` copies samples in and wakes waiting readers; `read` parks until
/// enough samples are available. The lock is never held across a wait or
/// across any call into caller code.
///
/// Overflow policy: writing into a full buffer overwrites the oldest unread
/// samples. After writing `n` samples the buffer holds the newest
/// `min(len + n, capacity)` samples in order. Lost samples are counted and
/// reported, never reordered.
pub struct RingBuffer<T> {
    inner: Mutex<Inner<T>>,
    data_available: Condvar,
    capacity: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer holding up to `capacity` samples
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        Ok(Self::allocate(capacity))
    }

    /// Create a buffer with default capacity (32768 samples)
    pub fn with_default_capacity() -> Self {
        Self::allocate(DEFAULT_CAPACITY)
    }

    fn allocate(capacity: usize) -> Self {
        let storage = vec![T::default(); capacity].into_boxed_slice();
        debug!("Allocated ring buffer with {} slots", capacity);
        Self {
            inner: Mutex::new(Inner {
                storage,
                write_cursor: 0,
                read_cursor: 0,
                len: 0,
                interrupted: false,
                overflowing: false,
                total_written: 0,
                total_read: 0,
                overwritten: 0,
            }),
            data_available: Condvar::new(),
            capacity,
        }
    }
}

impl<T: Copy> RingBuffer<T> {
    /// Write samples into the buffer.
    ///
    /// Never blocks. Returns the number of unread samples this call
    /// overwrote (zero unless the buffer overflowed).
    pub fn write(&self, data: &[T]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let (lost, entered_overflow, left_overflow) = {
            let mut inner = self.inner.lock();
            let lost = inner.push_slice(data);
            let was_overflowing = inner.overflowing;
            inner.overflowing = lost > 0;
            (lost, lost > 0 && !was_overflowing, lost == 0 && was_overflowing)
        };
        self.data_available.notify_all();

        if entered_overflow {
            warn!(
                "Ring buffer overflow: {} unread samples overwritten (capacity {})",
                lost, self.capacity
            );
        } else if left_overflow {
            debug!("Ring buffer recovered from overflow");
        }

        lost
    }

    /// Read exactly `out.len()` samples, blocking until they are available.
    ///
    /// Returns the number of samples copied. Fails with
    /// [`RingBufferError::Interrupted`] if [`interrupt`](Self::interrupt) is
    /// called while the request cannot be satisfied; samples that are
    /// already available are still handed out after an interrupt.
    ///
    /// Requests larger than the capacity can never be satisfied. They panic
    /// in debug builds; release builds fill only the first `capacity`
    /// samples of `out` and return that count.
    pub fn read(&self, out: &mut [T]) -> Result<usize, RingBufferError> {
        let out = self.clamp_request(out);
        let requested = out.len();

        let mut inner = self.inner.lock();
        while inner.len < requested {
            if inner.interrupted {
                return Err(RingBufferError::Interrupted {
                    requested,
                    available: inner.len,
                });
            }
            self.data_available.wait(&mut inner);
        }
        inner.pop_into(out);
        Ok(requested)
    }

    /// Like [`read`](Self::read) but gives up after `timeout`
    pub fn read_timeout(&self, out: &mut [T], timeout: Duration) -> Result<usize, RingBufferError> {
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => return self.read(out),
        };
        let out = self.clamp_request(out);
        let requested = out.len();

        let mut inner = self.inner.lock();
        while inner.len < requested {
            if inner.interrupted {
                return Err(RingBufferError::Interrupted {
                    requested,
                    available: inner.len,
                });
            }
            if self.data_available.wait_until(&mut inner, deadline).timed_out()
                && inner.len < requested
            {
                return Err(RingBufferError::Timeout(timeout));
            }
        }
        inner.pop_into(out);
        Ok(requested)
    }

    /// Read `out.len()` samples only if they are already available
    pub fn try_read(&self, out: &mut [T]) -> Option<usize> {
        let out = self.clamp_request(out);
        let mut inner = self.inner.lock();
        if inner.len < out.len() {
            return None;
        }
        inner.pop_into(out);
        Some(out.len())
    }

    fn clamp_request<'a>(&self, out: &'a mut [T]) -> &'a mut [T] {
        debug_assert!(
            out.len() <= self.capacity,
            "read of {} samples exceeds ring capacity {}",
            out.len(),
            self.capacity
        );
        let count = out.len().min(self.capacity);
        &mut out[..count]
    }
}

impl<T> RingBuffer<T> {
    /// Wake every waiting reader and make pending and future reads that
    /// cannot be satisfied fail with [`RingBufferError::Interrupted`].
    pub fn interrupt(&self) {
        self.inner.lock().interrupted = true;
        self.data_available.notify_all();
        debug!("Ring buffer interrupted");
    }

    /// Clear a previous [`interrupt`](Self::interrupt)
    pub fn resume(&self) {
        self.inner.lock().interrupted = false;
    }

    /// Check whether readers are currently interrupted
    pub fn is_interrupted(&self) -> bool {
        self.inner.lock().interrupted
    }

    /// Current write cursor (diagnostics only)
    pub fn write_index(&self) -> usize {
        self.inner.lock().write_cursor
    }

    /// Current read cursor (diagnostics only)
    pub fn read_index(&self) -> usize {
        self.inner.lock().read_cursor
    }

    /// Get the number of unread samples
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots that can be written without overwriting unread samples
    pub fn free(&self) -> usize {
        self.capacity - self.len()
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Get total samples written
    pub fn total_written(&self) -> u64 {
        self.inner.lock().total_written
    }

    /// Get total samples read
    pub fn total_read(&self) -> u64 {
        self.inner.lock().total_read
    }

    /// Get total unread samples lost to overflow
    pub fn overwritten(&self) -> u64 {
        self.inner.lock().overwritten
    }

    /// Snapshot cursors and counters under one lock
    pub fn stats(&self) -> RingStats {
        self.inner.lock().stats()
    }

    /// Discard all unread samples
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.read_cursor = inner.write_cursor;
        inner.len = 0;
        inner.overflowing = false;
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
