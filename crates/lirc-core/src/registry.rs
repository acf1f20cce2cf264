//! Driver registry: minor slots, registration and deferred teardown.
//!
//! # Slot lifecycle
//!
//! ```text
//! EMPTY --register--> ATTACHED --unregister (closed)--> EMPTY
//!                        |
//!                        +--unregister (open)--> DETACHED --last close--> EMPTY
//! ```
//!
//! A detached slot keeps its minor reserved until the last handle closes,
//! so memory reachable from an open handle is never released underneath it.
//! All slot changes happen under one registry lock; each ring buffer has its
//! own lock, so I/O on one device does not contend with registration of
//! another.

use crate::buffer::RingBuffer;
use crate::device::{DeviceHandle, OpenOptions};
use crate::driver::{DriverDescriptor, EventQueue, FileOperations, FileOps, LircDriver, Sampler};
use crate::error::{LircError, Result};
use crate::features::Features;
use crate::poll_thread::PollingThread;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default number of minor slots (`MAX_IRCTL_DEVICES`).
pub const MAX_IRCTL_DEVICES: usize = 4;

/// Default scheduler tick rate used to quantize polling intervals.
pub const DEFAULT_HZ: u32 = 100;

/// Bytes of key data a default buffer holds (`BUFLEN`).
pub const BUFLEN: usize = 16;

/// Registry sizing and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Number of minor slots
    #[serde(default = "default_max_devices")]
    pub max_devices: usize,
    /// Scheduler tick rate (Hz); also the highest allowed sample rate
    #[serde(default = "default_hz")]
    pub hz: u32,
}

fn default_max_devices() -> usize {
    MAX_IRCTL_DEVICES
}

fn default_hz() -> u32 {
    DEFAULT_HZ
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_devices: MAX_IRCTL_DEVICES,
            hz: DEFAULT_HZ,
        }
    }
}

/// One registered device (`struct irctl`).
pub(crate) struct Irctl {
    pub(crate) minor: usize,
    pub(crate) name: String,
    pub(crate) code_length: u32,
    pub(crate) features: Features,
    pub(crate) chunk_size: usize,
    pub(crate) poll_interval: Option<Duration>,
    pub(crate) buffer: Arc<RingBuffer>,
    pub(crate) driver: Arc<dyn LircDriver>,
    pub(crate) sampler: Option<Arc<dyn Sampler>>,
    pub(crate) event_queue: Option<Arc<EventQueue>>,
    pub(crate) file_ops: Option<Arc<dyn FileOperations>>,
    pub(crate) fops: FileOps,
    pub(crate) data: Option<Arc<dyn Any + Send + Sync>>,
    attached: AtomicBool,
    open_count: AtomicUsize,
}

impl Irctl {
    pub(crate) fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open_count.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Irctl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Irctl")
            .field("minor", &self.minor)
            .field("name", &self.name)
            .field("code_length", &self.code_length)
            .field("features", &self.features)
            .field("chunk_size", &self.chunk_size)
            .field("attached", &self.is_attached())
            .field("open_count", &self.open_count())
            .finish()
    }
}

#[derive(Debug)]
struct Slot {
    irctl: Arc<Irctl>,
    poller: Option<PollingThread>,
}

#[derive(Debug)]
struct RegistryInner {
    config: RegistryConfig,
    slots: Mutex<Vec<Option<Slot>>>,
}

/// Table of registered IR devices indexed by minor number.
///
/// Cloning is cheap and every clone refers to the same table.
#[derive(Debug, Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        let slots = (0..config.max_devices).map(|_| None).collect();
        Self {
            inner: Arc::new(RegistryInner {
                config,
                slots: Mutex::new(slots),
            }),
        }
    }

    /// Registry settings.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Number of minor slots.
    pub fn max_devices(&self) -> usize {
        self.inner.config.max_devices
    }

    /// Register a driver and return its minor (`lirc_register_driver`).
    ///
    /// Nothing is left behind on failure.
    pub fn register(&self, desc: DriverDescriptor) -> Result<usize> {
        self.validate(&desc)?;

        let mut slots = self.inner.slots.lock();
        let minor = match desc.minor {
            Some(minor) => {
                if slots[minor].is_some() {
                    return Err(LircError::Busy {
                        name: format!("minor {}", minor),
                    });
                }
                minor
            }
            None => slots
                .iter()
                .position(Option::is_none)
                .ok_or(LircError::NoFreeSlots {
                    max: self.max_devices(),
                })?,
        };

        let buffer = match &desc.buffer {
            Some(buffer) => Arc::clone(buffer),
            None => {
                let bytes_in_key = desc.code_length.div_ceil(8) as usize;
                let chunks = if desc.buffer_size > 0 {
                    desc.buffer_size
                } else {
                    BUFLEN / bytes_in_key
                };
                Arc::new(RingBuffer::new(bytes_in_key, chunks)?)
            }
        };

        let features = if desc.features.is_empty() {
            Features::default_for_code_length(desc.code_length)
        } else {
            desc.features
        };

        let poll_interval = (desc.sample_rate > 0).then(|| self.tick_interval(desc.sample_rate));
        let fops = desc.file_ops_provided();

        let irctl = Arc::new(Irctl {
            minor,
            name: desc.name,
            code_length: desc.code_length,
            features,
            chunk_size: buffer.chunk_size(),
            poll_interval,
            buffer,
            driver: desc.driver,
            sampler: desc.sampler,
            event_queue: desc.event_queue,
            file_ops: desc.file_ops,
            fops,
            data: desc.data,
            attached: AtomicBool::new(true),
            open_count: AtomicUsize::new(0),
        });

        let poller = if irctl.poll_interval.is_some() || irctl.event_queue.is_some() {
            Some(PollingThread::spawn(Arc::clone(&irctl))?)
        } else {
            None
        };

        info!(
            minor,
            name = %irctl.name,
            code_length = irctl.code_length,
            chunk_size = irctl.chunk_size,
            chunks = irctl.buffer.capacity(),
            polled = poller.is_some(),
            "Registered LIRC driver"
        );

        slots[minor] = Some(Slot { irctl, poller });
        Ok(minor)
    }

    /// Unregister the driver on `minor` (`lirc_unregister_driver`).
    ///
    /// Stops and joins the polling thread. If the device is open, blocked
    /// readers are woken with "no device" and teardown waits for the last
    /// close.
    pub fn unregister(&self, minor: usize) -> Result<()> {
        if minor >= self.max_devices() {
            return Err(LircError::bad_request(format!(
                "minor {} out of range (max {})",
                minor,
                self.max_devices()
            )));
        }

        let mut slots = self.inner.slots.lock();
        let slot = match slots[minor].as_mut() {
            Some(slot) if slot.irctl.is_attached() => slot,
            _ => return Err(LircError::NotFound { minor }),
        };

        if let Some(mut poller) = slot.poller.take() {
            poller.stop();
        }

        let ir = Arc::clone(&slot.irctl);
        ir.attached.store(false, Ordering::SeqCst);

        if ir.is_open() {
            debug!(minor, name = %ir.name, "Releasing open device");
            ir.buffer.wake_all();
            ir.driver.on_close();
        } else {
            slots[minor] = None;
        }

        info!(minor, name = %ir.name, deferred = ir.is_open(), "Unregistered LIRC driver");
        Ok(())
    }

    /// Open the device on `minor` with default options.
    pub fn open(&self, minor: usize) -> Result<DeviceHandle> {
        self.open_with(minor, OpenOptions::new())
    }

    /// Open the device on `minor`.
    ///
    /// Devices are exclusive: a second open fails with [`LircError::Busy`]
    /// unless the backend supplies its own open.
    pub fn open_with(&self, minor: usize, options: OpenOptions) -> Result<DeviceHandle> {
        if minor >= self.max_devices() {
            return Err(LircError::NoDevice { minor });
        }

        let slots = self.lock_interruptible(&options)?;
        let ir = match slots[minor].as_ref() {
            Some(slot) => Arc::clone(&slot.irctl),
            None => return Err(LircError::NoDevice { minor }),
        };

        if !ir.is_attached() {
            return Err(LircError::NoDevice { minor });
        }

        if ir.fops.contains(FileOps::OPEN) {
            drop(slots);
            let mut handle = DeviceHandle::new(self.clone(), ir, options);
            handle.custom_open()?;
            return Ok(handle);
        }

        if ir.is_open() {
            return Err(LircError::Busy {
                name: ir.name.clone(),
            });
        }

        ir.open_count.fetch_add(1, Ordering::SeqCst);
        let result = ir.driver.on_open();
        match &result {
            Ok(()) => ir.buffer.clear(),
            Err(_) => {
                ir.open_count.fetch_sub(1, Ordering::SeqCst);
            }
        }
        if let Some(poller) = slots[minor].as_ref().and_then(|s| s.poller.as_ref()) {
            poller.wake();
        }
        drop(slots);

        result?;
        debug!(minor, name = %ir.name, "Opened LIRC device");
        Ok(DeviceHandle::new(self.clone(), ir, options))
    }

    /// Close bookkeeping for a generic handle (`irctl_close`).
    pub(crate) fn release(&self, ir: &Arc<Irctl>) {
        let mut slots = self.inner.slots.lock();

        let _ = ir
            .open_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        if ir.is_attached() {
            ir.driver.on_close();
        } else if !ir.is_open() {
            let owned = slots[ir.minor]
                .as_ref()
                .is_some_and(|slot| Arc::ptr_eq(&slot.irctl, ir));
            if owned {
                slots[ir.minor] = None;
                debug!(minor = ir.minor, name = %ir.name, "Deferred teardown complete");
            }
        }
        debug!(minor = ir.minor, name = %ir.name, "Closed LIRC device");
    }

    /// Opaque backend data of the driver on `minor` (`get_private_data`).
    pub fn private_data(&self, minor: usize) -> Option<Arc<dyn Any + Send + Sync>> {
        let slots = self.inner.slots.lock();
        slots
            .get(minor)?
            .as_ref()
            .filter(|slot| slot.irctl.is_attached())
            .and_then(|slot| slot.irctl.data.clone())
    }

    /// True if an attached driver occupies `minor`.
    pub fn is_registered(&self, minor: usize) -> bool {
        let slots = self.inner.slots.lock();
        slots
            .get(minor)
            .and_then(Option::as_ref)
            .is_some_and(|slot| slot.irctl.is_attached())
    }

    /// True if `minor` is held, attached or pending teardown.
    pub fn is_occupied(&self, minor: usize) -> bool {
        let slots = self.inner.slots.lock();
        slots.get(minor).is_some_and(Option::is_some)
    }

    /// Minors with an attached driver.
    pub fn registered_minors(&self) -> Vec<usize> {
        let slots = self.inner.slots.lock();
        slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_some_and(|s| s.irctl.is_attached()))
            .map(|(minor, _)| minor)
            .collect()
    }

    /// True if the polling thread of `minor` is alive.
    pub fn is_polling(&self, minor: usize) -> bool {
        let slots = self.inner.slots.lock();
        slots
            .get(minor)
            .and_then(Option::as_ref)
            .and_then(|slot| slot.poller.as_ref())
            .is_some_and(PollingThread::is_running)
    }

    /// Polling interval for `sample_rate`, quantized to scheduler ticks.
    fn tick_interval(&self, sample_rate: u32) -> Duration {
        let hz = u64::from(self.inner.config.hz);
        let jiffies = hz / u64::from(sample_rate);
        Duration::from_nanos(jiffies * 1_000_000_000 / hz)
    }

    fn validate(&self, desc: &DriverDescriptor) -> Result<()> {
        let max = self.max_devices();
        if let Some(minor) = desc.minor {
            if minor >= max {
                return Err(LircError::bad_request(format!(
                    "\"minor\" must be between 0 and {}",
                    max - 1
                )));
            }
        }

        let max_bits = (BUFLEN * 8) as u32;
        if desc.code_length < 1 || desc.code_length > max_bits {
            return Err(LircError::bad_request(format!(
                "code length {} outside 1..={}",
                desc.code_length, max_bits
            )));
        }

        let fops = desc.file_ops_provided();
        if desc.sample_rate != 0 {
            let hz = self.inner.config.hz;
            if desc.sample_rate < 2 || desc.sample_rate > hz {
                return Err(LircError::bad_request(format!(
                    "sample rate {} outside 2..={}",
                    desc.sample_rate, hz
                )));
            }
            if desc.sampler.is_none() {
                return Err(LircError::bad_request("sampled driver needs a sampler"));
            }
        } else if desc.event_queue.is_some() {
            if desc.sampler.is_none() {
                return Err(LircError::bad_request("event-driven driver needs a sampler"));
            }
        } else if desc.buffer.is_none() {
            if !fops.contains(FileOps::READ) {
                return Err(LircError::bad_request(
                    "driver needs a sample rate, an event queue, a buffer or a custom read",
                ));
            }
            if !fops.contains(FileOps::READ | FileOps::POLL | FileOps::IOCTL) {
                return Err(LircError::bad_request(
                    "custom I/O without a buffer must provide read, poll and ioctl",
                ));
            }
        }
        Ok(())
    }

    /// Take the registry lock, giving up if the caller's signal fires.
    fn lock_interruptible(&self, options: &OpenOptions) -> Result<MutexGuard<'_, Vec<Option<Slot>>>> {
        loop {
            if let Some(guard) = self.inner.slots.try_lock_for(Duration::from_millis(5)) {
                return Ok(guard);
            }
            options.signal().check()?;
        }
    }
}
