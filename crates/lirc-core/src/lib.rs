//! `lirc-core`
//!
//! Generic infrared remote-control device core.
//!
//! Hardware backends register with a [`Registry`] and feed decoded IR data
//! into a per-device [`RingBuffer`]. User code opens a minor and gets a
//! [`DeviceHandle`] with character-device semantics: exclusive open,
//! blocking or non-blocking chunked reads, poll, and ioctl.
//!
//! ## Backends
//!
//! - **Sampled**: a [`Sampler`] called by a per-driver polling thread at a
//!   fixed rate
//! - **Event-driven**: the same thread blocks on an [`EventQueue`] instead
//!   of a timer
//! - **Buffer-owning**: the backend fills its own [`RingBuffer`] from
//!   interrupt context and overrides [`FileOperations`] as needed
//!
//! ## Example
//!
//! ```rust
//! use lirc_core::{DriverDescriptor, LircDriver, Registry, RingBuffer};
//! use std::sync::Arc;
//!
//! struct Remote;
//! impl LircDriver for Remote {}
//!
//! # fn main() -> lirc_core::Result<()> {
//! let registry = Registry::default();
//! let buffer = Arc::new(RingBuffer::new(4, 8)?);
//! let minor = registry.register(
//!     DriverDescriptor::new("remote", 32, Arc::new(Remote)).with_buffer(Arc::clone(&buffer)),
//! )?;
//!
//! let handle = registry.open(minor)?;
//! buffer.write_one(&[1, 2, 3, 4]);
//! let mut code = [0u8; 4];
//! assert_eq!(handle.read(&mut code)?, 4);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod compat;
pub mod device;
pub mod driver;
pub mod error;
pub mod features;
pub mod ioctl;
pub mod poll_thread;
pub mod registry;

pub use buffer::RingBuffer;
pub use compat::compat_ioctl;
pub use device::{DeviceHandle, Interrupter, OpenOptions};
pub use driver::{
    Capability, DriverDescriptor, EventQueue, FileContext, FileOperations, FileOps, LircDriver,
    PollFlags, Sampler, Signal,
};
pub use error::{LircError, Result};
pub use features::{Features, LircT, Mode, TimingRecord, PULSE_BIT, PULSE_MASK};
pub use ioctl::{IoctlArg, IoctlReply, IoctlRequest, ScdValue};
pub use registry::{Registry, RegistryConfig, BUFLEN, DEFAULT_HZ, MAX_IRCTL_DEVICES};
