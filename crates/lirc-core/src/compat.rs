//! ioctl adapter for 32-bit callers.
//!
//! A 32-bit program encodes `unsigned long` arguments as 4 bytes, so six
//! command words differ from the native ones. Those are re-encoded with the
//! native size, dispatched, and their results narrowed back to `u32`.
//! Commands that already take an `unsigned int` pass through unchanged.

use crate::device::DeviceHandle;
use crate::error::{LircError, Result};
use crate::ioctl::{
    ioc, ioc_dir, ioc_nr, ioc_size, ioc_type, nr, IoctlArg, IoctlReply, IoctlRequest, LIRC_IOC_TYPE,
    ULONG_COMPAT, ULONG_NATIVE,
};
use tracing::error;

/// Dispatch a 32-bit ioctl on `handle`.
///
/// Returns the value to store in the caller's `__u32` argument for read
/// commands, `None` for commands that return nothing.
pub fn compat_ioctl(handle: &DeviceHandle, cmd32: u32, arg32: u32) -> Result<Option<u32>> {
    if ioc_type(cmd32) != LIRC_IOC_TYPE {
        return unknown(cmd32);
    }

    let cmd = match ioc_nr(cmd32) {
        nr::GET_FEATURES
        | nr::GET_SEND_MODE
        | nr::GET_REC_MODE
        | nr::GET_LENGTH
        | nr::SET_SEND_MODE
        | nr::SET_REC_MODE
            if ioc_size(cmd32) == ULONG_COMPAT =>
        {
            ioc(ioc_dir(cmd32), ioc_nr(cmd32), ULONG_NATIVE)
        }
        nr::GET_SEND_CARRIER
        | nr::GET_REC_CARRIER
        | nr::GET_SEND_DUTY_CYCLE
        | nr::GET_REC_DUTY_CYCLE
        | nr::GET_REC_RESOLUTION
        | nr::SET_SEND_CARRIER
        | nr::SET_REC_CARRIER
        | nr::SET_SEND_DUTY_CYCLE
        | nr::SET_REC_DUTY_CYCLE
        | nr::SET_TRANSMITTER_MASK
        | nr::SET_REC_DUTY_CYCLE_RANGE
        | nr::SET_REC_CARRIER_RANGE => cmd32,
        _ => return unknown(cmd32),
    };

    let request = IoctlRequest::from_raw(cmd, IoctlArg::Value(u64::from(arg32)))?;
    match handle.ioctl(request)? {
        IoctlReply::Value(v) => Ok(Some(v as u32)),
        IoctlReply::Done | IoctlReply::Scd(_) => Ok(None),
    }
}

fn unknown(cmd32: u32) -> Result<Option<u32>> {
    error!("Unknown compat ioctl cmd {:08x}", cmd32);
    Err(LircError::NoIoctlCommand)
}

