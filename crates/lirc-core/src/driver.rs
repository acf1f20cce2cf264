//! Backend driver traits and the registration descriptor.
//!
//! A backend plugs into the registry through a [`DriverDescriptor`]: the
//! mandatory [`LircDriver`] lifecycle hooks plus optional capability objects.
//!
//! - [`Sampler`]: polled by the registry's polling thread (`sample_rate > 0`,
//!   or event-driven through an [`EventQueue`])
//! - [`FileOperations`]: replaces parts of the generic character-device path
//! - an external [`RingBuffer`] the backend fills from its own context
//!
//! Capabilities are plain `Option<Arc<dyn Trait>>` fields, so a backend can
//! use different objects for each of them.

use crate::buffer::RingBuffer;
use crate::error::{LircError, Result};
use crate::features::Features;
use crate::ioctl::{IoctlReply, IoctlRequest};
use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle hooks every backend provides.
pub trait LircDriver: Send + Sync {
    /// Called when the device is opened (`set_use_inc`). An error aborts
    /// the open.
    fn on_open(&self) -> Result<()> {
        Ok(())
    }

    /// Called when the device is closed while still attached (`set_use_dec`),
    /// and once more when the driver is unregistered while open.
    fn on_close(&self) {}
}

/// Time- or event-driven data source (`add_to_buf`).
pub trait Sampler: Send + Sync {
    /// Add data to `buffer`.
    ///
    /// Return `Ok(())` when something was added (the polling thread calls
    /// again right away), [`LircError::NoData`] when there is nothing more
    /// this tick, or [`LircError::NoDevice`] to stop the polling thread.
    fn sample(&self, buffer: &RingBuffer) -> Result<()>;
}

bitflags! {
    /// Which [`FileOperations`] methods a backend overrides.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileOps: u32 {
        /// Custom open
        const OPEN = 1 << 0;
        /// Custom release
        const RELEASE = 1 << 1;
        /// Custom read
        const READ = 1 << 2;
        /// Custom write
        const WRITE = 1 << 3;
        /// Custom poll
        const POLL = 1 << 4;
        /// Custom ioctl, tried before the generic commands
        const IOCTL = 1 << 5;
    }
}

bitflags! {
    /// Readiness reported by `poll`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollFlags: u32 {
        /// Data to read
        const IN = 0x0001;
        /// Error condition (device detached)
        const ERR = 0x0008;
        /// Normal data to read
        const RDNORM = 0x0040;
    }
}

/// Pending-signal flag for one open handle.
///
/// Raising it aborts the handle's blocking waits with
/// [`LircError::Interrupted`], like a signal delivered to a process
/// sleeping in `read(2)`.
#[derive(Debug, Default)]
pub struct Signal {
    pending: AtomicBool,
}

impl Signal {
    /// New signal with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a signal as pending.
    pub fn raise(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    /// Consume the pending signal.
    pub fn clear(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }

    /// True if a signal is pending.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Consume a pending signal, reporting it as [`LircError::Interrupted`].
    pub fn check(&self) -> Result<()> {
        if self.pending.swap(false, Ordering::SeqCst) {
            Err(LircError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Per-call context handed to custom file operations.
#[derive(Debug, Clone, Copy)]
pub struct FileContext<'a> {
    /// Minor number of the device
    pub minor: usize,
    /// `O_NONBLOCK` was requested
    pub nonblocking: bool,
    /// Signal state of the calling handle
    pub signal: &'a Signal,
}

/// Custom character-device operations.
///
/// Only the methods listed by [`FileOperations::provides`] are called; the
/// defaults exist so implementors override just what they need.
pub trait FileOperations: Send + Sync {
    /// Overridden operations.
    fn provides(&self) -> FileOps;

    /// Custom open.
    fn open(&self, _ctx: &FileContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Custom release.
    fn release(&self, _ctx: &FileContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Custom read.
    fn read(&self, _ctx: &FileContext<'_>, _dest: &mut [u8]) -> Result<usize> {
        Err(LircError::invalid("read not implemented"))
    }

    /// Custom write (transmit).
    fn write(&self, _ctx: &FileContext<'_>, _data: &[u8]) -> Result<usize> {
        Err(LircError::invalid("write not implemented"))
    }

    /// Custom poll.
    fn poll(&self, _ctx: &FileContext<'_>) -> PollFlags {
        PollFlags::empty()
    }

    /// Custom ioctl. Return [`LircError::NoIoctlCommand`] to fall through
    /// to the generic commands.
    fn ioctl(&self, _ctx: &FileContext<'_>, _request: IoctlRequest) -> Result<IoctlReply> {
        Err(LircError::NoIoctlCommand)
    }
}

/// External wake-up source for event-driven backends (`get_queue`).
///
/// The backend calls [`EventQueue::notify`] when it has data; the polling
/// thread blocks on the queue instead of a timer.
#[derive(Debug, Default)]
pub struct EventQueue {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl EventQueue {
    /// New queue with no pending event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that data is ready.
    pub fn notify(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Current event generation.
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Wake waiters without producing an event (used on stop).
    pub(crate) fn wake(&self) {
        let _generation = self.generation.lock();
        self.cond.notify_all();
    }

    /// Block until the generation moves past `seen` or `stop` is set.
    pub(crate) fn wait(&self, seen: &mut u64, stop: &AtomicBool) {
        let mut generation = self.generation.lock();
        while *generation == *seen && !stop.load(Ordering::SeqCst) {
            self.cond.wait(&mut generation);
        }
        *seen = *generation;
    }
}

/// Capabilities a descriptor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Polled through a [`Sampler`]
    Sampled,
    /// Polling thread driven by an [`EventQueue`]
    EventDriven,
    /// Custom [`FileOperations`]
    CustomIo,
    /// Backend-supplied [`RingBuffer`]
    ExternalBuffer,
}

/// Registration request for one device (`struct lirc_driver`).
pub struct DriverDescriptor {
    /// Driver name, used in logs
    pub name: String,
    /// Requested minor, `None` for the first free slot
    pub minor: Option<usize>,
    /// Bits per logical code
    pub code_length: u32,
    /// Chunks in the buffer, 0 for the default
    pub buffer_size: usize,
    /// Polling rate in Hz, 0 for event-driven
    pub sample_rate: u32,
    /// Capability word, empty to derive it from `code_length`
    pub features: Features,
    /// Lifecycle hooks
    pub driver: Arc<dyn LircDriver>,
    /// Sampling callback
    pub sampler: Option<Arc<dyn Sampler>>,
    /// External wake-up queue
    pub event_queue: Option<Arc<EventQueue>>,
    /// Custom file operations
    pub file_ops: Option<Arc<dyn FileOperations>>,
    /// Backend-owned buffer
    pub buffer: Option<Arc<RingBuffer>>,
    /// Opaque backend data returned by `private_data`
    pub data: Option<Arc<dyn Any + Send + Sync>>,
}

impl DriverDescriptor {
    /// Descriptor with no capabilities and an auto-assigned minor.
    pub fn new(name: impl Into<String>, code_length: u32, driver: Arc<dyn LircDriver>) -> Self {
        Self {
            name: name.into(),
            minor: None,
            code_length,
            buffer_size: 0,
            sample_rate: 0,
            features: Features::empty(),
            driver,
            sampler: None,
            event_queue: None,
            file_ops: None,
            buffer: None,
            data: None,
        }
    }

    /// Request a specific minor.
    pub fn with_minor(mut self, minor: usize) -> Self {
        self.minor = Some(minor);
        self
    }

    /// Set the buffer size in chunks.
    pub fn with_buffer_size(mut self, chunks: usize) -> Self {
        self.buffer_size = chunks;
        self
    }

    /// Declare the capability word.
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Poll `sampler` at `rate` Hz.
    pub fn with_sampler(mut self, rate: u32, sampler: Arc<dyn Sampler>) -> Self {
        self.sample_rate = rate;
        self.sampler = Some(sampler);
        self
    }

    /// Run `sampler` whenever `queue` is notified.
    pub fn with_event_queue(mut self, queue: Arc<EventQueue>, sampler: Arc<dyn Sampler>) -> Self {
        self.event_queue = Some(queue);
        self.sampler = Some(sampler);
        self
    }

    /// Override file operations.
    pub fn with_file_ops(mut self, ops: Arc<dyn FileOperations>) -> Self {
        self.file_ops = Some(ops);
        self
    }

    /// Use a backend-owned buffer.
    pub fn with_buffer(mut self, buffer: Arc<RingBuffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Attach opaque backend data.
    pub fn with_data(mut self, data: Arc<dyn Any + Send + Sync>) -> Self {
        self.data = Some(data);
        self
    }

    /// Declared capabilities.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.sampler.is_some() && self.sample_rate > 0 {
            caps.push(Capability::Sampled);
        }
        if self.event_queue.is_some() {
            caps.push(Capability::EventDriven);
        }
        if self.file_ops.is_some() {
            caps.push(Capability::CustomIo);
        }
        if self.buffer.is_some() {
            caps.push(Capability::ExternalBuffer);
        }
        caps
    }

    /// Operations overridden by the custom file operations, if any.
    pub fn file_ops_provided(&self) -> FileOps {
        self.file_ops
            .as_ref()
            .map(|ops| ops.provides())
            .unwrap_or_else(FileOps::empty)
    }
}

impl fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("name", &self.name)
            .field("minor", &self.minor)
            .field("code_length", &self.code_length)
            .field("buffer_size", &self.buffer_size)
            .field("sample_rate", &self.sample_rate)
            .field("features", &self.features)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    struct Nop;
    impl LircDriver for Nop {}

    struct Reader;
    impl FileOperations for Reader {
        fn provides(&self) -> FileOps {
            FileOps::READ | FileOps::POLL
        }
    }

    #[test]
    fn test_descriptor_capabilities() {
        let desc = DriverDescriptor::new("nop", 8, Arc::new(Nop));
        assert!(desc.capabilities().is_empty());
        assert_eq!(desc.file_ops_provided(), FileOps::empty());

        let desc = desc
            .with_file_ops(Arc::new(Reader))
            .with_buffer(Arc::new(RingBuffer::new(1, 4).unwrap()));
        assert_eq!(
            desc.capabilities(),
            vec![Capability::CustomIo, Capability::ExternalBuffer]
        );
        assert!(desc.file_ops_provided().contains(FileOps::READ));
    }

    #[test]
    fn test_signal() {
        let signal = Signal::new();
        assert!(signal.check().is_ok());
        signal.raise();
        assert!(signal.is_pending());
        assert_eq!(signal.check(), Err(LircError::Interrupted));
        // Delivered once
        assert!(!signal.is_pending());
        assert!(signal.check().is_ok());

        signal.raise();
        signal.clear();
        assert!(signal.check().is_ok());
    }

    #[test]
    fn test_event_queue_wakes_waiter() {
        let queue = Arc::new(EventQueue::new());
        let stop = Arc::new(AtomicBool::new(false));
        let waiter = {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut seen = 0;
                queue.wait(&mut seen, &stop);
                seen
            })
        };
        thread::sleep(Duration::from_millis(10));
        queue.notify();
        assert_eq!(waiter.join().unwrap(), 1);
    }

    #[test]
    fn test_event_queue_stop() {
        let queue = Arc::new(EventQueue::new());
        let stop = Arc::new(AtomicBool::new(false));
        let waiter = {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut seen = queue.generation();
                queue.wait(&mut seen, &stop);
            })
        };
        thread::sleep(Duration::from_millis(10));
        stop.store(true, Ordering::SeqCst);
        queue.wake();
        waiter.join().unwrap();
    }
}
