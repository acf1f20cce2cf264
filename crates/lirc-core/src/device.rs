//! Character-device front end.
//!
//! A [`DeviceHandle`] is one open file on a minor. Each operation goes to the
//! backend's [`FileOperations`](crate::driver::FileOperations) when it
//! overrides that operation, and to the generic ring-buffer path otherwise.

use crate::buffer::RingBuffer;
use crate::driver::{FileContext, FileOps, PollFlags, Signal};
use crate::error::{LircError, Result};
use crate::features::{Features, Mode};
use crate::ioctl::{IoctlArg, IoctlReply, IoctlRequest};
use crate::registry::{Irctl, Registry};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Flags and signal source for [`Registry::open_with`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    nonblocking: bool,
    signal: Arc<Signal>,
}

impl OpenOptions {
    /// Blocking open with a fresh signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open with `O_NONBLOCK`.
    pub fn nonblocking(mut self, nonblocking: bool) -> Self {
        self.nonblocking = nonblocking;
        self
    }

    /// Share a signal with the opener, so the open itself and later reads
    /// can be interrupted from another thread.
    pub fn with_signal(mut self, signal: Arc<Signal>) -> Self {
        self.signal = signal;
        self
    }

    /// Signal attached to this open.
    pub fn signal(&self) -> &Arc<Signal> {
        &self.signal
    }
}

/// Interrupts blocking calls on one handle, like a signal sent to the
/// process sleeping in them.
#[derive(Debug, Clone)]
pub struct Interrupter {
    signal: Arc<Signal>,
    buffer: Arc<RingBuffer>,
}

impl Interrupter {
    /// Raise the signal and wake the handle's blocked readers.
    pub fn interrupt(&self) {
        self.signal.raise();
        self.buffer.wake_all();
    }
}

/// An open LIRC device.
///
/// Dropping the handle closes it.
#[derive(Debug)]
pub struct DeviceHandle {
    registry: Registry,
    ir: Arc<Irctl>,
    nonblocking: bool,
    signal: Arc<Signal>,
    closed: bool,
}

impl DeviceHandle {
    pub(crate) fn new(registry: Registry, ir: Arc<Irctl>, options: OpenOptions) -> Self {
        Self {
            registry,
            ir,
            nonblocking: options.nonblocking,
            signal: options.signal,
            closed: false,
        }
    }

    /// Run the backend's own open. On failure the handle is inert and
    /// dropping it does not call release.
    pub(crate) fn custom_open(&mut self) -> Result<()> {
        let result = match &self.ir.file_ops {
            Some(ops) => ops.open(&self.context()),
            None => Ok(()),
        };
        if result.is_err() {
            self.closed = true;
        }
        result
    }

    fn context(&self) -> FileContext<'_> {
        FileContext {
            minor: self.ir.minor,
            nonblocking: self.nonblocking,
            signal: &self.signal,
        }
    }

    fn overrides(&self, op: FileOps) -> bool {
        self.ir.fops.contains(op)
    }

    fn attached_check(&self) -> Result<()> {
        if self.ir.is_attached() {
            Ok(())
        } else {
            Err(LircError::NoDevice { minor: self.ir.minor })
        }
    }

    /// Minor number of the device.
    pub fn minor(&self) -> usize {
        self.ir.minor
    }

    /// Driver name.
    pub fn name(&self) -> &str {
        &self.ir.name
    }

    /// Capability word of the device.
    pub fn features(&self) -> Features {
        self.ir.features
    }

    /// Bits per logical code.
    pub fn code_length(&self) -> u32 {
        self.ir.code_length
    }

    /// Bytes per chunk; reads must be a multiple of this.
    pub fn chunk_size(&self) -> usize {
        self.ir.chunk_size
    }

    /// False once the driver has been unregistered.
    pub fn is_attached(&self) -> bool {
        self.ir.is_attached()
    }

    /// True if the handle was opened with `O_NONBLOCK`.
    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    /// Toggle `O_NONBLOCK`.
    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.nonblocking = nonblocking;
    }

    /// Backend data attached at registration (`lirc_get_pdata`).
    pub fn driver_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.ir.data.clone()
    }

    /// Handle for interrupting blocking calls from another thread.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            signal: Arc::clone(&self.signal),
            buffer: Arc::clone(&self.ir.buffer),
        }
    }

    /// Read whole chunks into `dest`.
    ///
    /// Blocks until at least one chunk is available unless the handle is
    /// non-blocking. Returns the number of bytes copied; a partial count
    /// is returned when the buffer runs dry. A read started on a detached
    /// device fails with [`LircError::NoDevice`]; a reader already asleep
    /// when the device detaches still takes records queued before it wakes.
    pub fn read(&self, dest: &mut [u8]) -> Result<usize> {
        if self.overrides(FileOps::READ) {
            if let Some(ops) = &self.ir.file_ops {
                return ops.read(&self.context(), dest);
            }
        }

        self.attached_check()?;
        if dest.len() % self.ir.chunk_size != 0 {
            return Err(LircError::invalid(format!(
                "read length {} is not a multiple of {}",
                dest.len(),
                self.ir.chunk_size
            )));
        }

        let result = self.ir.buffer.read_wait(dest, self.nonblocking, || {
            self.signal.check()?;
            self.attached_check()
        });
        trace!(minor = self.ir.minor, result = ?result, "read");
        result
    }

    /// Transmit `data` through the backend.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        if self.overrides(FileOps::WRITE) {
            if let Some(ops) = &self.ir.file_ops {
                return ops.write(&self.context(), data);
            }
        }
        self.attached_check()?;
        Err(LircError::invalid("device cannot transmit"))
    }

    /// Current readiness.
    pub fn poll(&self) -> PollFlags {
        if self.overrides(FileOps::POLL) {
            if let Some(ops) = &self.ir.file_ops {
                return ops.poll(&self.context());
            }
        }
        if !self.ir.is_attached() {
            return PollFlags::ERR;
        }
        if self.ir.buffer.is_empty() {
            PollFlags::empty()
        } else {
            PollFlags::IN | PollFlags::RDNORM
        }
    }

    /// Wait up to `timeout` (forever for `None`) for the device to become
    /// readable or detached.
    ///
    /// Returns empty flags on timeout and [`LircError::Interrupted`] if the
    /// handle's signal fires.
    pub fn poll_timeout(&self, timeout: Option<Duration>) -> Result<PollFlags> {
        if self.overrides(FileOps::POLL) {
            return Ok(self.poll());
        }
        let waited = self.ir.buffer.wait_readable(timeout, || {
            self.signal.check()?;
            self.attached_check()
        });
        match waited {
            Ok(_) => Ok(self.poll()),
            Err(LircError::NoDevice { .. }) => Ok(PollFlags::ERR),
            Err(e) => Err(e),
        }
    }

    /// Issue a decoded ioctl.
    ///
    /// The backend sees the request first; [`LircError::NoIoctlCommand`]
    /// from it falls through to the generic commands.
    pub fn ioctl(&self, request: IoctlRequest) -> Result<IoctlReply> {
        if self.overrides(FileOps::IOCTL) {
            if let Some(ops) = &self.ir.file_ops {
                match ops.ioctl(&self.context(), request) {
                    Err(LircError::NoIoctlCommand) => {}
                    result => return result,
                }
            }
        }

        self.attached_check()?;

        let features = self.ir.features;
        let reply = match request {
            IoctlRequest::GetFeatures => IoctlReply::Value(u64::from(features.bits())),
            IoctlRequest::GetRecMode => {
                if !features.can_receive() {
                    return Err(LircError::not_supported("device cannot receive"));
                }
                IoctlReply::Value(u64::from(features.rec_modes().bits()))
            }
            IoctlRequest::SetRecMode(mode) => {
                if !features.can_receive() {
                    return Err(LircError::not_supported("device cannot receive"));
                }
                let requested = u32::try_from(mode)
                    .ok()
                    .map(|m| Features::from_rec_mode(Mode::from_bits_retain(m)));
                match requested {
                    Some(rec) if rec.intersects(features) => IoctlReply::Done,
                    _ => {
                        return Err(LircError::invalid(format!(
                            "receive mode 0x{:x} not supported",
                            mode
                        )))
                    }
                }
            }
            IoctlRequest::GetLength => IoctlReply::Value(u64::from(self.ir.code_length)),
            other => {
                debug!(minor = self.ir.minor, cmd = other.name(), "Unhandled ioctl");
                return Err(LircError::invalid(format!(
                    "unsupported ioctl 0x{:08x}",
                    other.code()
                )));
            }
        };
        Ok(reply)
    }

    /// Issue an ioctl from its raw command word.
    pub fn ioctl_raw(&self, cmd: u32, arg: IoctlArg) -> Result<IoctlReply> {
        self.ioctl(IoctlRequest::from_raw(cmd, arg)?)
    }

    /// Close the handle.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.overrides(FileOps::RELEASE) {
            if let Some(ops) = &self.ir.file_ops {
                return ops.release(&self.context());
            }
        }
        self.registry.release(&self.ir);
        Ok(())
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close_inner() {
            warn!(minor = self.ir.minor, error = %e, "Close on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverDescriptor, LircDriver};

    struct Nop;
    impl LircDriver for Nop {}

    fn setup(features: Features) -> (Registry, Arc<RingBuffer>, usize) {
        let registry = Registry::default();
        let buffer = Arc::new(RingBuffer::for_records(8).unwrap());
        let minor = registry
            .register(
                DriverDescriptor::new("dev", 32, Arc::new(Nop))
                    .with_buffer(Arc::clone(&buffer))
                    .with_features(features),
            )
            .unwrap();
        (registry, buffer, minor)
    }

    #[test]
    fn test_read_length_must_be_chunk_multiple() {
        let (registry, _buffer, minor) = setup(Features::REC_MODE2);
        let handle = registry.open(minor).unwrap();
        let mut dest = [0u8; 6];
        assert!(matches!(
            handle.read(&mut dest),
            Err(LircError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_generic_ioctls() {
        let (registry, _buffer, minor) = setup(Features::REC_MODE2 | Features::REC_LIRCCODE);
        let handle = registry.open(minor).unwrap();

        let features = handle.ioctl(IoctlRequest::GetFeatures).unwrap().value().unwrap();
        assert_eq!(
            features as u32,
            (Features::REC_MODE2 | Features::REC_LIRCCODE).bits()
        );
        assert_eq!(
            handle.ioctl(IoctlRequest::GetRecMode).unwrap(),
            IoctlReply::Value(u64::from((Mode::MODE2 | Mode::LIRCCODE).bits()))
        );
        assert_eq!(handle.ioctl(IoctlRequest::GetLength).unwrap(), IoctlReply::Value(32));

        assert_eq!(
            handle
                .ioctl(IoctlRequest::SetRecMode(u64::from(Mode::MODE2.bits())))
                .unwrap(),
            IoctlReply::Done
        );
        assert!(matches!(
            handle.ioctl(IoctlRequest::SetRecMode(u64::from(Mode::RAW.bits()))),
            Err(LircError::InvalidArgument { .. })
        ));
        assert!(matches!(
            handle.ioctl(IoctlRequest::SetSendCarrier(38_000)),
            Err(LircError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_rec_mode_without_receiver() {
        let (registry, _buffer, minor) = setup(Features::SEND_PULSE);
        let handle = registry.open(minor).unwrap();
        assert!(matches!(
            handle.ioctl(IoctlRequest::GetRecMode),
            Err(LircError::NotSupported { .. })
        ));
        assert!(matches!(
            handle.ioctl(IoctlRequest::SetRecMode(4)),
            Err(LircError::NotSupported { .. })
        ));
    }

    #[test]
    fn test_poll_reports_data_and_detach() {
        let (registry, buffer, minor) = setup(Features::REC_MODE2);
        let handle = registry.open(minor).unwrap();
        assert_eq!(handle.poll(), PollFlags::empty());

        assert!(buffer.write_records(&[7]));
        assert_eq!(handle.poll(), PollFlags::IN | PollFlags::RDNORM);

        registry.unregister(minor).unwrap();
        assert_eq!(handle.poll(), PollFlags::ERR);
        assert!(handle.ioctl(IoctlRequest::GetFeatures).unwrap_err().is_no_device());
    }

    #[test]
    fn test_poll_timeout_expires() {
        let (registry, _buffer, minor) = setup(Features::REC_MODE2);
        let handle = registry.open(minor).unwrap();
        let flags = handle.poll_timeout(Some(Duration::from_millis(20))).unwrap();
        assert!(flags.is_empty());
    }

    #[test]
    fn test_default_write_rejected() {
        let (registry, _buffer, minor) = setup(Features::REC_MODE2);
        let handle = registry.open(minor).unwrap();
        assert!(matches!(
            handle.write(&[0, 0, 0, 0]),
            Err(LircError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_drop_closes() {
        let (registry, _buffer, minor) = setup(Features::REC_MODE2);
        {
            let _handle = registry.open(minor).unwrap();
            assert!(registry.open(minor).unwrap_err().is_busy());
        }
        registry.open(minor).unwrap().close().unwrap();
    }
}
