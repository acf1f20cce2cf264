//! Test backends shared by the lirc-core integration tests.

#![allow(dead_code)]

use lirc_core::{
    DriverDescriptor, LircDriver, LircError, Registry, Result, RingBuffer, Sampler,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle hooks that count their calls.
#[derive(Debug, Default)]
pub struct CountingDriver {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_open: AtomicBool,
}

impl CountingDriver {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl LircDriver for CountingDriver {
    fn on_open(&self) -> Result<()> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(LircError::invalid("hardware refused"));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sampler that hands out queued chunks, one per call.
#[derive(Debug, Default)]
pub struct ScriptedSampler {
    pending: Mutex<VecDeque<Vec<u8>>>,
    pub calls: AtomicUsize,
    pub gone: AtomicBool,
}

impl ScriptedSampler {
    pub fn push(&self, chunk: &[u8]) {
        self.pending.lock().push_back(chunk.to_vec());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Sampler for ScriptedSampler {
    fn sample(&self, buffer: &RingBuffer) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.gone.load(Ordering::SeqCst) {
            return Err(LircError::NoDevice { minor: 0 });
        }
        let mut pending = self.pending.lock();
        match pending.pop_front() {
            Some(chunk) if buffer.write_one(&chunk) => Ok(()),
            Some(chunk) => {
                pending.push_front(chunk);
                Err(LircError::NoData)
            }
            None => Err(LircError::NoData),
        }
    }
}

/// A registered driver whose buffer the test fills directly.
pub struct BufferedDevice {
    pub minor: usize,
    pub buffer: Arc<RingBuffer>,
    pub driver: Arc<CountingDriver>,
}

/// Register a 32-bit-code driver with its own buffer of `chunks` chunks.
pub fn register_buffered(registry: &Registry, chunks: usize) -> BufferedDevice {
    let buffer = Arc::new(RingBuffer::new(4, chunks).expect("Failed to create buffer"));
    let driver = Arc::new(CountingDriver::default());
    let minor = registry
        .register(
            DriverDescriptor::new("buffered", 32, driver.clone()).with_buffer(Arc::clone(&buffer)),
        )
        .expect("Failed to register driver");
    BufferedDevice {
        minor,
        buffer,
        driver,
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
