//! ioctl command surface.
//!
//! Requests are modelled as a typed [`IoctlRequest`]; the Linux `_IOC`
//! command words are kept so that raw `(cmd, arg)` pairs coming from a
//! foreign caller can be decoded with [`IoctlRequest::from_raw`].

use crate::error::{LircError, Result};
use serde::{Deserialize, Serialize};

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;
const IOC_SIZEMASK: u32 = (1 << 14) - 1;

pub(crate) const IOC_NONE: u32 = 0;
pub(crate) const IOC_WRITE: u32 = 1;
pub(crate) const IOC_READ: u32 = 2;

/// ioctl type byte used by every LIRC command.
pub const LIRC_IOC_TYPE: u32 = b'i' as u32;

/// Size of `unsigned long` on the native 64-bit ABI.
pub(crate) const ULONG_NATIVE: u32 = 8;
/// Size of `unsigned long` for 32-bit callers.
pub(crate) const ULONG_COMPAT: u32 = 4;
/// Size of `unsigned int`, identical on both ABIs.
const UINT: u32 = 4;
/// Size of the start-code detection argument (four `unsigned int`).
const SCD_SIZE: u32 = 16;

/// Encode an ioctl command word.
pub const fn ioc(dir: u32, nr: u32, size: u32) -> u32 {
    (dir << IOC_DIRSHIFT)
        | ((size & IOC_SIZEMASK) << IOC_SIZESHIFT)
        | (LIRC_IOC_TYPE << IOC_TYPESHIFT)
        | (nr << IOC_NRSHIFT)
}

/// Command number field of an ioctl word.
pub const fn ioc_nr(cmd: u32) -> u32 {
    cmd & 0xff
}

/// Argument size field of an ioctl word.
pub const fn ioc_size(cmd: u32) -> u32 {
    (cmd >> IOC_SIZESHIFT) & IOC_SIZEMASK
}

/// Direction field of an ioctl word.
pub const fn ioc_dir(cmd: u32) -> u32 {
    cmd >> IOC_DIRSHIFT
}

/// Type field of an ioctl word.
pub const fn ioc_type(cmd: u32) -> u32 {
    (cmd >> IOC_TYPESHIFT) & 0xff
}

/// Command numbers (`_IOC_NR`) of the LIRC ioctls.
pub mod nr {
    #![allow(missing_docs)]
    pub const GET_FEATURES: u32 = 0x00;
    pub const GET_SEND_MODE: u32 = 0x01;
    pub const GET_REC_MODE: u32 = 0x02;
    pub const GET_SEND_CARRIER: u32 = 0x03;
    pub const GET_REC_CARRIER: u32 = 0x04;
    pub const GET_SEND_DUTY_CYCLE: u32 = 0x05;
    pub const GET_REC_DUTY_CYCLE: u32 = 0x06;
    pub const GET_REC_RESOLUTION: u32 = 0x07;
    pub const GET_LENGTH: u32 = 0x0f;
    pub const SET_SEND_MODE: u32 = 0x11;
    pub const SET_REC_MODE: u32 = 0x12;
    pub const SET_SEND_CARRIER: u32 = 0x13;
    pub const SET_REC_CARRIER: u32 = 0x14;
    pub const SET_SEND_DUTY_CYCLE: u32 = 0x15;
    pub const SET_REC_DUTY_CYCLE: u32 = 0x16;
    pub const SET_TRANSMITTER_MASK: u32 = 0x17;
    pub const SET_REC_DUTY_CYCLE_RANGE: u32 = 0x1e;
    pub const SET_REC_CARRIER_RANGE: u32 = 0x1f;
    pub const NOTIFY_DECODE: u32 = 0x20;
    pub const SCD_CONFIGURE: u32 = 0x21;
    pub const SCD_ENABLE: u32 = 0x22;
    pub const SCD_DISABLE: u32 = 0x23;
    pub const SCD_STATUS: u32 = 0x24;
    pub const SCD_GET_VALUE: u32 = 0x25;
}

/// Start-code detection settings exchanged by `SCD_CONFIGURE` and
/// `SCD_GET_VALUE` (`struct lirc_scd_s`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScdValue {
    /// Start code symbols, MSB first; its bit length is the code length
    pub code: u32,
    /// Alternative start code, 0 when unused
    #[serde(default)]
    pub alt_code: u32,
    /// Nominal symbol time in microseconds
    pub nominal_time: u32,
    /// Noise recovery enable
    #[serde(default)]
    pub noise_recovery: u32,
}

/// Argument passed with a raw ioctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlArg {
    /// No argument (or a pure out-parameter)
    None,
    /// Integer argument
    Value(u64),
    /// Start-code detection argument
    Scd(ScdValue),
}

impl IoctlArg {
    fn value(self) -> u64 {
        match self {
            Self::Value(v) => v,
            _ => 0,
        }
    }
}

/// A decoded LIRC ioctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum IoctlRequest {
    GetFeatures,
    GetSendMode,
    GetRecMode,
    GetSendCarrier,
    GetRecCarrier,
    GetSendDutyCycle,
    GetRecDutyCycle,
    GetRecResolution,
    GetLength,
    SetSendMode(u64),
    SetRecMode(u64),
    SetSendCarrier(u32),
    SetRecCarrier(u32),
    SetSendDutyCycle(u32),
    SetRecDutyCycle(u32),
    SetTransmitterMask(u32),
    SetRecDutyCycleRange(u32),
    SetRecCarrierRange(u32),
    NotifyDecode,
    ScdConfigure(ScdValue),
    ScdEnable,
    ScdDisable,
    ScdStatus,
    ScdGetValue,
    /// Command outside the LIRC set; left to the backend
    Other { cmd: u32, arg: u64 },
}

/// Result of a successful ioctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlReply {
    /// Command completed, nothing to return
    Done,
    /// Integer result written to the caller's argument
    Value(u64),
    /// Start-code detection settings
    Scd(ScdValue),
}

impl IoctlReply {
    /// Integer payload, if any.
    pub fn value(self) -> Option<u64> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl IoctlRequest {
    /// Native (64-bit `unsigned long`) command word for this request.
    pub fn code(&self) -> u32 {
        use nr::*;
        match self {
            Self::GetFeatures => ioc(IOC_READ, GET_FEATURES, ULONG_NATIVE),
            Self::GetSendMode => ioc(IOC_READ, GET_SEND_MODE, ULONG_NATIVE),
            Self::GetRecMode => ioc(IOC_READ, GET_REC_MODE, ULONG_NATIVE),
            Self::GetSendCarrier => ioc(IOC_READ, GET_SEND_CARRIER, UINT),
            Self::GetRecCarrier => ioc(IOC_READ, GET_REC_CARRIER, UINT),
            Self::GetSendDutyCycle => ioc(IOC_READ, GET_SEND_DUTY_CYCLE, UINT),
            Self::GetRecDutyCycle => ioc(IOC_READ, GET_REC_DUTY_CYCLE, UINT),
            Self::GetRecResolution => ioc(IOC_READ, GET_REC_RESOLUTION, UINT),
            Self::GetLength => ioc(IOC_READ, GET_LENGTH, ULONG_NATIVE),
            Self::SetSendMode(_) => ioc(IOC_WRITE, SET_SEND_MODE, ULONG_NATIVE),
            Self::SetRecMode(_) => ioc(IOC_WRITE, SET_REC_MODE, ULONG_NATIVE),
            Self::SetSendCarrier(_) => ioc(IOC_WRITE, SET_SEND_CARRIER, UINT),
            Self::SetRecCarrier(_) => ioc(IOC_WRITE, SET_REC_CARRIER, UINT),
            Self::SetSendDutyCycle(_) => ioc(IOC_WRITE, SET_SEND_DUTY_CYCLE, UINT),
            Self::SetRecDutyCycle(_) => ioc(IOC_WRITE, SET_REC_DUTY_CYCLE, UINT),
            Self::SetTransmitterMask(_) => ioc(IOC_WRITE, SET_TRANSMITTER_MASK, UINT),
            Self::SetRecDutyCycleRange(_) => ioc(IOC_WRITE, SET_REC_DUTY_CYCLE_RANGE, UINT),
            Self::SetRecCarrierRange(_) => ioc(IOC_WRITE, SET_REC_CARRIER_RANGE, UINT),
            Self::NotifyDecode => ioc(IOC_NONE, NOTIFY_DECODE, 0),
            Self::ScdConfigure(_) => ioc(IOC_WRITE, SCD_CONFIGURE, SCD_SIZE),
            Self::ScdEnable => ioc(IOC_NONE, SCD_ENABLE, 0),
            Self::ScdDisable => ioc(IOC_NONE, SCD_DISABLE, 0),
            Self::ScdStatus => ioc(IOC_READ, SCD_STATUS, ULONG_NATIVE),
            Self::ScdGetValue => ioc(IOC_READ, SCD_GET_VALUE, SCD_SIZE),
            Self::Other { cmd, .. } => *cmd,
        }
    }

    /// Decode a native command word and its argument.
    ///
    /// Words that are not LIRC commands become [`IoctlRequest::Other`];
    /// a LIRC command number with the wrong argument size is rejected.
    pub fn from_raw(cmd: u32, arg: IoctlArg) -> Result<Self> {
        if ioc_type(cmd) != LIRC_IOC_TYPE {
            return Ok(Self::Other {
                cmd,
                arg: arg.value(),
            });
        }
        let v = arg.value();
        let request = match ioc_nr(cmd) {
            nr::GET_FEATURES => Self::GetFeatures,
            nr::GET_SEND_MODE => Self::GetSendMode,
            nr::GET_REC_MODE => Self::GetRecMode,
            nr::GET_SEND_CARRIER => Self::GetSendCarrier,
            nr::GET_REC_CARRIER => Self::GetRecCarrier,
            nr::GET_SEND_DUTY_CYCLE => Self::GetSendDutyCycle,
            nr::GET_REC_DUTY_CYCLE => Self::GetRecDutyCycle,
            nr::GET_REC_RESOLUTION => Self::GetRecResolution,
            nr::GET_LENGTH => Self::GetLength,
            nr::SET_SEND_MODE => Self::SetSendMode(v),
            nr::SET_REC_MODE => Self::SetRecMode(v),
            nr::SET_SEND_CARRIER => Self::SetSendCarrier(v as u32),
            nr::SET_REC_CARRIER => Self::SetRecCarrier(v as u32),
            nr::SET_SEND_DUTY_CYCLE => Self::SetSendDutyCycle(v as u32),
            nr::SET_REC_DUTY_CYCLE => Self::SetRecDutyCycle(v as u32),
            nr::SET_TRANSMITTER_MASK => Self::SetTransmitterMask(v as u32),
            nr::SET_REC_DUTY_CYCLE_RANGE => Self::SetRecDutyCycleRange(v as u32),
            nr::SET_REC_CARRIER_RANGE => Self::SetRecCarrierRange(v as u32),
            nr::NOTIFY_DECODE => Self::NotifyDecode,
            nr::SCD_CONFIGURE => match arg {
                IoctlArg::Scd(value) => Self::ScdConfigure(value),
                _ => return Err(LircError::invalid("SCD_CONFIGURE needs an SCD argument")),
            },
            nr::SCD_ENABLE => Self::ScdEnable,
            nr::SCD_DISABLE => Self::ScdDisable,
            nr::SCD_STATUS => Self::ScdStatus,
            nr::SCD_GET_VALUE => Self::ScdGetValue,
            _ => return Ok(Self::Other { cmd, arg: v }),
        };
        if request.code() != cmd {
            return Err(LircError::invalid(format!(
                "ioctl 0x{:08x}: unexpected direction or argument size",
                cmd
            )));
        }
        Ok(request)
    }

    /// Command word a 32-bit caller uses for this request, when it
    /// differs from the native one.
    pub fn compat_code(&self) -> Option<u32> {
        let native = self.code();
        if ioc_type(native) == LIRC_IOC_TYPE && ioc_size(native) == ULONG_NATIVE {
            Some(ioc(ioc_dir(native), ioc_nr(native), ULONG_COMPAT))
        } else {
            None
        }
    }

    /// Human readable command name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetFeatures => "GET_FEATURES",
            Self::GetSendMode => "GET_SEND_MODE",
            Self::GetRecMode => "GET_REC_MODE",
            Self::GetSendCarrier => "GET_SEND_CARRIER",
            Self::GetRecCarrier => "GET_REC_CARRIER",
            Self::GetSendDutyCycle => "GET_SEND_DUTY_CYCLE",
            Self::GetRecDutyCycle => "GET_REC_DUTY_CYCLE",
            Self::GetRecResolution => "GET_REC_RESOLUTION",
            Self::GetLength => "GET_LENGTH",
            Self::SetSendMode(_) => "SET_SEND_MODE",
            Self::SetRecMode(_) => "SET_REC_MODE",
            Self::SetSendCarrier(_) => "SET_SEND_CARRIER",
            Self::SetRecCarrier(_) => "SET_REC_CARRIER",
            Self::SetSendDutyCycle(_) => "SET_SEND_DUTY_CYCLE",
            Self::SetRecDutyCycle(_) => "SET_REC_DUTY_CYCLE",
            Self::SetTransmitterMask(_) => "SET_TRANSMITTER_MASK",
            Self::SetRecDutyCycleRange(_) => "SET_REC_DUTY_CYCLE_RANGE",
            Self::SetRecCarrierRange(_) => "SET_REC_CARRIER_RANGE",
            Self::NotifyDecode => "NOTIFY_DECODE",
            Self::ScdConfigure(_) => "SCD_CONFIGURE",
            Self::ScdEnable => "SCD_ENABLE",
            Self::ScdDisable => "SCD_DISABLE",
            Self::ScdStatus => "SCD_STATUS",
            Self::ScdGetValue => "SCD_GET_VALUE",
            Self::Other { .. } => "???",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_words_match_linux_abi() {
        // _IOR('i', 0, unsigned long) on LP64
        assert_eq!(IoctlRequest::GetFeatures.code(), 0x8008_6900);
        // _IOW('i', 0x12, unsigned long)
        assert_eq!(IoctlRequest::SetRecMode(0).code(), 0x4008_6912);
        // _IOW('i', 0x13, unsigned int)
        assert_eq!(IoctlRequest::SetSendCarrier(0).code(), 0x4004_6913);
        // _IO('i', 0x22)
        assert_eq!(IoctlRequest::ScdEnable.code(), 0x0000_6922);
        // _IOW('i', 0x21, struct lirc_scd_s)
        assert_eq!(
            IoctlRequest::ScdConfigure(ScdValue::default()).code(),
            0x4010_6921
        );
    }

    #[test]
    fn test_from_raw() {
        let req = IoctlRequest::from_raw(0x4008_6912, IoctlArg::Value(4)).unwrap();
        assert_eq!(req, IoctlRequest::SetRecMode(4));

        let req = IoctlRequest::from_raw(0x8008_690f, IoctlArg::None).unwrap();
        assert_eq!(req, IoctlRequest::GetLength);

        // Not an 'i' command
        let req = IoctlRequest::from_raw(0x5401, IoctlArg::Value(1)).unwrap();
        assert!(matches!(req, IoctlRequest::Other { cmd: 0x5401, .. }));

        // Wrong size for an unsigned long command
        assert!(IoctlRequest::from_raw(0x8004_6900, IoctlArg::None).is_err());

        // Configure without a payload
        assert!(IoctlRequest::from_raw(0x4010_6921, IoctlArg::Value(0)).is_err());
    }

    #[test]
    fn test_compat_code() {
        assert_eq!(IoctlRequest::GetFeatures.compat_code(), Some(0x8004_6900));
        assert_eq!(IoctlRequest::SetSendCarrier(0).compat_code(), None);
        assert_eq!(IoctlRequest::ScdEnable.compat_code(), None);
    }
}
