//! Error types for LIRC operations.
//!
//! Every failure the registry, the character-device front end or a backend can
//! report is a variant of [`LircError`]. The outermost callers translate these
//! into the platform errno space with [`LircError::errno`] (or by converting
//! into [`std::io::Error`]).

use thiserror::Error;

/// Result type alias for LIRC operations.
pub type Result<T> = std::result::Result<T, LircError>;

/// Errors that can occur when registering drivers or doing device I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LircError {
    /// Registration descriptor is malformed (bad minor, code length,
    /// sample rate or missing callback)
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Minor number already in use, or device already open
    #[error("Device '{name}' is busy")]
    Busy { name: String },

    /// Buffer allocation failed
    #[error("Out of memory: {message}")]
    NoMemory { message: String },

    /// Every minor slot of the registry is occupied
    #[error("No free minor slots (max {max})")]
    NoFreeSlots { max: usize },

    /// The polling thread could not be started
    #[error("Failed to start polling thread: {message}")]
    ChildProcessFailed { message: String },

    /// Minor slot was never registered, or was already unregistered
    #[error("No driver registered on minor {minor}")]
    NotFound { minor: usize },

    /// Device does not exist or has been detached
    #[error("No such device (minor {minor})")]
    NoDevice { minor: usize },

    /// Argument rejected (bad length, unknown command, invalid mode)
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Non-blocking operation would have to wait
    #[error("Operation would block")]
    WouldBlock,

    /// Blocking wait interrupted by a signal
    #[error("Interrupted while waiting")]
    Interrupted,

    /// Function not implemented by the device (ENOSYS)
    #[error("Not implemented: {message}")]
    NotSupported { message: String },

    /// Operation not supported in the current hardware configuration (ENOTSUPP)
    #[error("Operation not supported: {message}")]
    OperationNotSupported { message: String },

    /// Backend does not handle this ioctl; generic handling should follow
    #[error("ioctl command not handled by backend")]
    NoIoctlCommand,

    /// Sampling callback had nothing to add
    #[error("No data available")]
    NoData,
}

// Linux ENOTSUPP (kernel-internal, not exported by libc)
const ENOTSUPP: i32 = 524;
// Linux ENOIOCTLCMD (kernel-internal)
const ENOIOCTLCMD: i32 = 515;

impl LircError {
    /// Convenience constructor for [`LircError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`LircError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`LircError::NotSupported`].
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`LircError::OperationNotSupported`].
    pub fn operation_not_supported(message: impl Into<String>) -> Self {
        Self::OperationNotSupported {
            message: message.into(),
        }
    }

    /// Linux errno for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::BadRequest { .. } => libc::EBADRQC,
            Self::Busy { .. } => libc::EBUSY,
            Self::NoMemory { .. } | Self::NoFreeSlots { .. } => libc::ENOMEM,
            Self::ChildProcessFailed { .. } => libc::ECHILD,
            Self::NotFound { .. } => libc::ENOENT,
            Self::NoDevice { .. } => libc::ENODEV,
            Self::InvalidArgument { .. } => libc::EINVAL,
            Self::WouldBlock => libc::EWOULDBLOCK,
            Self::Interrupted => libc::EINTR,
            Self::NotSupported { .. } => libc::ENOSYS,
            Self::OperationNotSupported { .. } => ENOTSUPP,
            Self::NoIoctlCommand => ENOIOCTLCMD,
            Self::NoData => libc::ENODATA,
        }
    }

    /// Check if this error means "try again later".
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    /// Check if this error reports a missing or detached device.
    pub fn is_no_device(&self) -> bool {
        matches!(self, Self::NoDevice { .. })
    }

    /// Check if this error indicates contention.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

impl From<LircError> for std::io::Error {
    fn from(err: LircError) -> Self {
        match err {
            LircError::WouldBlock => std::io::Error::from(std::io::ErrorKind::WouldBlock),
            LircError::Interrupted => std::io::Error::from(std::io::ErrorKind::Interrupted),
            other => std::io::Error::from_raw_os_error(other.errno()),
        }
    }
}
