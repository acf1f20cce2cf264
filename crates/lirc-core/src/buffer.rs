//! Chunked ring buffer shared between a backend and its readers.
//!
//! A [`RingBuffer`] holds `capacity` fixed-size chunks. Writers (a polling
//! thread or an interrupt-path decoder) append whole chunks; readers pop
//! them in FIFO order. The buffer never overwrites unread data: a write that
//! does not fit is refused as a whole, so producers check [`RingBuffer::available`]
//! first and drop the batch themselves.
//!
//! # Wake-ups
//!
//! Head, tail and fill live behind one `parking_lot::Mutex`, and blocked
//! readers sleep on a `Condvar` paired with that mutex. Every accepted write
//! notifies the condvar while the state lock is held by the writer, and a
//! reader evaluates its wake condition under the same lock before sleeping.
//! A write can therefore never slip between a reader's "empty" check and
//! its wait.
//!
//! Out-of-band conditions (device detached, signal delivered) are raised by
//! flipping an atomic and then calling [`RingBuffer::wake_all`], which takes
//! the state lock before notifying for the same reason.

use crate::error::{LircError, Result};
use crate::features::LircT;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct RingState {
    data: Vec<u8>,
    head: usize,
    tail: usize,
    fill: usize,
}

/// Fixed-capacity FIFO of fixed-size chunks with blocking readers.
#[derive(Debug)]
pub struct RingBuffer {
    chunk_size: usize,
    capacity: usize,
    state: Mutex<RingState>,
    readable: Condvar,
}

impl RingBuffer {
    /// Allocate a buffer of `capacity` chunks of `chunk_size` bytes.
    pub fn new(chunk_size: usize, capacity: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(LircError::invalid("ring buffer chunk size must be non-zero"));
        }
        if capacity == 0 {
            return Err(LircError::invalid("ring buffer capacity must be non-zero"));
        }
        let bytes = chunk_size.checked_mul(capacity).ok_or_else(|| LircError::NoMemory {
            message: format!("{} chunks of {} bytes", capacity, chunk_size),
        })?;

        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|e| LircError::NoMemory {
                message: e.to_string(),
            })?;
        data.resize(bytes, 0);

        Ok(Self {
            chunk_size,
            capacity,
            state: Mutex::new(RingState {
                data,
                head: 0,
                tail: 0,
                fill: 0,
            }),
            readable: Condvar::new(),
        })
    }

    /// Buffer of `capacity` timing records (`lirc_t`).
    pub fn for_records(capacity: usize) -> Result<Self> {
        Self::new(std::mem::size_of::<LircT>(), capacity)
    }

    /// Bytes per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total chunks the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Chunks currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().fill
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().fill == 0
    }

    /// True if no chunk can be added.
    pub fn is_full(&self) -> bool {
        self.state.lock().fill == self.capacity
    }

    /// Free chunks (`capacity - fill`).
    pub fn available(&self) -> usize {
        self.capacity - self.state.lock().fill
    }

    /// Drop all queued chunks. Blocked readers are not woken.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.head = 0;
        state.tail = 0;
        state.fill = 0;
    }

    /// Append one chunk. Returns `false` (and writes nothing) if the buffer
    /// is full or `chunk` is not exactly one chunk long.
    pub fn write_one(&self, chunk: &[u8]) -> bool {
        self.write_n(chunk)
    }

    /// Append a batch of whole chunks atomically.
    ///
    /// Either every chunk is queued and readers are woken, or nothing is
    /// written and `false` is returned (insufficient space or a length that
    /// is not a multiple of the chunk size).
    pub fn write_n(&self, chunks: &[u8]) -> bool {
        if chunks.is_empty() || chunks.len() % self.chunk_size != 0 {
            return false;
        }
        let count = chunks.len() / self.chunk_size;

        let mut state = self.state.lock();
        if self.capacity - state.fill < count {
            return false;
        }
        for chunk in chunks.chunks_exact(self.chunk_size) {
            let start = state.tail * self.chunk_size;
            state.data[start..start + self.chunk_size].copy_from_slice(chunk);
            state.tail = (state.tail + 1) % self.capacity;
            state.fill += 1;
        }
        self.readable.notify_all();
        true
    }

    /// Append timing records as one atomic batch (chunk size must be 4).
    pub fn write_records(&self, records: &[LircT]) -> bool {
        if self.chunk_size != std::mem::size_of::<LircT>() {
            return false;
        }
        let bytes: Vec<u8> = records.iter().flat_map(|r| r.to_ne_bytes()).collect();
        self.write_n(&bytes)
    }

    /// Pop the oldest chunk into `dest`. Returns `false` if empty or if
    /// `dest` is shorter than one chunk.
    pub fn read_one(&self, dest: &mut [u8]) -> bool {
        if dest.len() < self.chunk_size {
            return false;
        }
        let mut state = self.state.lock();
        self.pop_locked(&mut state, dest)
    }

    /// Pop the oldest timing record.
    pub fn read_record(&self) -> Option<LircT> {
        if self.chunk_size != std::mem::size_of::<LircT>() {
            return None;
        }
        let mut raw = [0u8; 4];
        self.read_one(&mut raw).then(|| LircT::from_ne_bytes(raw))
    }

    /// Wake every blocked reader so it re-evaluates its wait condition.
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.readable.notify_all();
    }

    /// Copy whole chunks into `dest`, blocking while the buffer is empty.
    ///
    /// Returns as soon as at least one chunk has been copied and the buffer
    /// runs dry. When nothing has been copied yet: non-blocking callers get
    /// [`LircError::WouldBlock`]; blocking callers sleep. `check` runs under
    /// the buffer lock before every sleep and after every wake-up, and its
    /// error aborts the read (a partial count still wins over the error).
    pub fn read_wait<F>(&self, dest: &mut [u8], nonblocking: bool, mut check: F) -> Result<usize>
    where
        F: FnMut() -> Result<()>,
    {
        let mut written = 0;
        let mut state = self.state.lock();

        while written + self.chunk_size <= dest.len() {
            if state.fill > 0 {
                self.pop_locked(&mut state, &mut dest[written..]);
                written += self.chunk_size;
                continue;
            }
            if written > 0 {
                break;
            }
            if nonblocking {
                return Err(LircError::WouldBlock);
            }
            check()?;
            self.readable.wait(&mut state);
            if state.fill == 0 {
                check()?;
            }
        }
        Ok(written)
    }

    /// Block until the buffer is non-empty, `check` fails, or `timeout`
    /// elapses. Returns `true` if data is available.
    pub fn wait_readable<F>(&self, timeout: Option<Duration>, mut check: F) -> Result<bool>
    where
        F: FnMut() -> Result<()>,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if state.fill > 0 {
                return Ok(true);
            }
            check()?;
            match deadline {
                Some(deadline) => {
                    if self.readable.wait_until(&mut state, deadline).timed_out() {
                        return Ok(state.fill > 0);
                    }
                }
                None => self.readable.wait(&mut state),
            }
        }
    }

    fn pop_locked(&self, state: &mut RingState, dest: &mut [u8]) -> bool {
        if state.fill == 0 {
            return false;
        }
        let start = state.head * self.chunk_size;
        dest[..self.chunk_size].copy_from_slice(&state.data[start..start + self.chunk_size]);
        state.head = (state.head + 1) % self.capacity;
        state.fill -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(matches!(
            RingBuffer::new(0, 8),
            Err(LircError::InvalidArgument { .. })
        ));
        assert!(RingBuffer::new(4, 0).is_err());
    }

    #[test]
    fn test_fifo_order_with_wrap() {
        let rb = RingBuffer::new(2, 3).unwrap();
        assert!(rb.write_n(&[1, 1, 2, 2]));
        let mut out = [0u8; 2];
        assert!(rb.read_one(&mut out));
        assert_eq!(out, [1, 1]);

        // Wraps around the end of storage
        assert!(rb.write_n(&[3, 3, 4, 4]));
        assert!(rb.is_full());

        for expected in [2u8, 3, 4] {
            assert!(rb.read_one(&mut out));
            assert_eq!(out, [expected, expected]);
        }
        assert!(rb.is_empty());
        assert!(!rb.read_one(&mut out));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let rb = RingBuffer::for_records(4).unwrap();
        assert!(rb.write_records(&[1, 2, 3]));
        assert_eq!(rb.available(), 1);

        assert!(!rb.write_records(&[4, 5]));
        assert_eq!(rb.len(), 3);

        assert_eq!(rb.read_record(), Some(1));
        assert_eq!(rb.read_record(), Some(2));
        assert_eq!(rb.read_record(), Some(3));
        assert_eq!(rb.read_record(), None);
    }

    #[test]
    fn test_partial_chunk_rejected() {
        let rb = RingBuffer::new(4, 4).unwrap();
        assert!(!rb.write_n(&[1, 2, 3]));
        assert!(!rb.write_one(&[]));
        assert!(rb.is_empty());
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let rb = RingBuffer::new(1, 4).unwrap();
        assert!(rb.write_n(&[1, 2, 3]));
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.available(), 4);
        assert!(rb.write_n(&[9, 9, 9, 9]));
    }

    #[test]
    fn test_read_wait_nonblocking() {
        let rb = RingBuffer::new(4, 4).unwrap();
        let mut dest = [0u8; 8];
        assert_eq!(
            rb.read_wait(&mut dest, true, || Ok(())),
            Err(LircError::WouldBlock)
        );

        assert!(rb.write_records(&[7]));
        assert_eq!(rb.read_wait(&mut dest, true, || Ok(())), Ok(4));
        assert_eq!(&dest[..4], &7u32.to_ne_bytes());
    }

    #[test]
    fn test_read_wait_blocks_until_write() {
        let rb = Arc::new(RingBuffer::for_records(8).unwrap());
        let reader = {
            let rb = Arc::clone(&rb);
            thread::spawn(move || {
                let mut dest = [0u8; 4];
                rb.read_wait(&mut dest, false, || Ok(())).map(|n| (n, dest))
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(rb.write_records(&[42]));

        let (n, dest) = reader.join().unwrap().unwrap();
        assert_eq!(n, 4);
        assert_eq!(u32::from_ne_bytes(dest), 42);
    }

    #[test]
    fn test_check_aborts_blocked_read() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let rb = Arc::new(RingBuffer::for_records(8).unwrap());
        let gone = Arc::new(AtomicBool::new(false));
        let reader = {
            let rb = Arc::clone(&rb);
            let gone = Arc::clone(&gone);
            thread::spawn(move || {
                let mut dest = [0u8; 4];
                rb.read_wait(&mut dest, false, || {
                    if gone.load(Ordering::SeqCst) {
                        Err(LircError::NoDevice { minor: 0 })
                    } else {
                        Ok(())
                    }
                })
            })
        };

        thread::sleep(Duration::from_millis(20));
        gone.store(true, Ordering::SeqCst);
        rb.wake_all();

        assert_eq!(reader.join().unwrap(), Err(LircError::NoDevice { minor: 0 }));
    }

    #[test]
    fn test_wait_readable_timeout() {
        let rb = RingBuffer::for_records(2).unwrap();
        assert_eq!(rb.wait_readable(Some(Duration::from_millis(5)), || Ok(())), Ok(false));
        assert!(rb.write_records(&[1]));
        assert_eq!(rb.wait_readable(Some(Duration::from_millis(5)), || Ok(())), Ok(true));
    }
}
