//! Timing records, modes and capability flags.
//!
//! Values match the `lirc.h` user-space ABI so that records read from a
//! device and feature words returned by `GET_FEATURES` can be handed to
//! existing LIRC tooling unchanged.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// One timing value as stored in a ring buffer (`lirc_t`).
pub type LircT = u32;

/// Set on a record that describes a pulse (carrier on).
pub const PULSE_BIT: LircT = 0x0100_0000;

/// Duration bits of a record, in microseconds.
pub const PULSE_MASK: LircT = 0x00FF_FFFF;

/// A single pulse or space, decoded from a raw [`LircT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingRecord {
    /// Carrier on for the given microseconds
    Pulse(u32),
    /// Carrier off for the given microseconds
    Space(u32),
}

impl TimingRecord {
    /// Decode a raw record.
    pub fn from_raw(raw: LircT) -> Self {
        if raw & PULSE_BIT != 0 {
            Self::Pulse(raw & PULSE_MASK)
        } else {
            Self::Space(raw & PULSE_MASK)
        }
    }

    /// Encode into the raw record format, clamping to [`PULSE_MASK`].
    pub fn to_raw(self) -> LircT {
        match self {
            Self::Pulse(us) => us.min(PULSE_MASK) | PULSE_BIT,
            Self::Space(us) => us.min(PULSE_MASK),
        }
    }

    /// Duration in microseconds.
    pub fn duration(self) -> u32 {
        match self {
            Self::Pulse(us) | Self::Space(us) => us,
        }
    }

    /// True for [`TimingRecord::Pulse`].
    pub fn is_pulse(self) -> bool {
        matches!(self, Self::Pulse(_))
    }
}

impl std::fmt::Display for TimingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pulse(us) => write!(f, "pulse {}", us),
            Self::Space(us) => write!(f, "space {}", us),
        }
    }
}

/// Same polarity test used when splicing two record streams.
pub fn same_polarity(a: LircT, b: LircT) -> bool {
    (a & PULSE_BIT) == (b & PULSE_BIT)
}

/// Decode a byte slice of native-endian records.
pub fn decode_records(bytes: &[u8]) -> Vec<TimingRecord> {
    bytes
        .chunks_exact(std::mem::size_of::<LircT>())
        .map(|c| TimingRecord::from_raw(LircT::from_ne_bytes([c[0], c[1], c[2], c[3]])))
        .collect()
}

bitflags! {
    /// Send or receive mode (`LIRC_MODE_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Mode: u32 {
        /// Raw samples
        const RAW = 0x0000_0001;
        /// Pulse lengths only (transmit)
        const PULSE = 0x0000_0002;
        /// Alternating pulse/space records
        const MODE2 = 0x0000_0004;
        /// Decoded code, one byte
        const CODE = 0x0000_0008;
        /// Decoded code, `code_length` bits
        const LIRCCODE = 0x0000_0010;
        /// String mode
        const STRING = 0x0000_0020;
    }
}

bitflags! {
    /// Capability word returned by `GET_FEATURES` (`LIRC_CAN_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features: u32 {
        /// Can send raw samples
        const SEND_RAW = Mode::RAW.bits();
        /// Can send pulse lengths
        const SEND_PULSE = Mode::PULSE.bits();
        /// Can send mode2 records
        const SEND_MODE2 = Mode::MODE2.bits();
        /// Can send decoded codes
        const SEND_CODE = Mode::CODE.bits();
        /// Can send LIRC codes
        const SEND_LIRCCODE = Mode::LIRCCODE.bits();
        /// Can send strings
        const SEND_STRING = Mode::STRING.bits();

        /// Carrier frequency is settable
        const SET_SEND_CARRIER = 0x0000_0100;
        /// Duty cycle is settable
        const SET_SEND_DUTY_CYCLE = 0x0000_0200;
        /// Transmitters can be masked
        const SET_TRANSMITTER_MASK = 0x0000_0400;

        /// Can receive raw samples
        const REC_RAW = Mode::RAW.bits() << 16;
        /// Can receive pulse lengths
        const REC_PULSE = Mode::PULSE.bits() << 16;
        /// Can receive mode2 records
        const REC_MODE2 = Mode::MODE2.bits() << 16;
        /// Can receive one-byte codes
        const REC_CODE = Mode::CODE.bits() << 16;
        /// Can receive LIRC codes
        const REC_LIRCCODE = Mode::LIRCCODE.bits() << 16;
        /// Can receive strings
        const REC_STRING = Mode::STRING.bits() << 16;

        /// Receive carrier can be set
        const SET_REC_CARRIER = Self::SET_SEND_CARRIER.bits() << 16;
        /// Receive duty cycle can be set
        const SET_REC_DUTY_CYCLE = Self::SET_SEND_DUTY_CYCLE.bits() << 16;
        /// Receive duty cycle range can be set
        const SET_REC_DUTY_CYCLE_RANGE = 0x4000_0000;
        /// Receive carrier range can be set
        const SET_REC_CARRIER_RANGE = 0x8000_0000;
        /// Receive resolution can be queried
        const GET_REC_RESOLUTION = 0x2000_0000;
        /// Decode notification supported
        const NOTIFY_DECODE = 0x0100_0000;

        /// All send modes
        const SEND_MASK = 0x0000_003f;
        /// All receive modes
        const REC_MASK = 0x003f_0000;
    }
}

impl Features {
    /// Send capability for a mode (`LIRC_MODE2SEND`).
    pub fn from_send_mode(mode: Mode) -> Self {
        Self::from_bits_retain(mode.bits())
    }

    /// Receive capability for a mode (`LIRC_MODE2REC`).
    pub fn from_rec_mode(mode: Mode) -> Self {
        Self::from_bits_retain(mode.bits() << 16)
    }

    /// Receive modes encoded in this feature word (`LIRC_REC2MODE`).
    pub fn rec_modes(self) -> Mode {
        Mode::from_bits_retain((self & Self::REC_MASK).bits() >> 16)
    }

    /// Send modes encoded in this feature word.
    pub fn send_modes(self) -> Mode {
        Mode::from_bits_retain((self & Self::SEND_MASK).bits())
    }

    /// True if any receive mode is present.
    pub fn can_receive(self) -> bool {
        self.intersects(Self::REC_MASK)
    }

    /// Default receive capability for a driver that did not declare one.
    pub fn default_for_code_length(code_length: u32) -> Self {
        if code_length > 8 {
            Self::REC_LIRCCODE
        } else {
            Self::REC_CODE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        assert_eq!(TimingRecord::from_raw(560 | PULSE_BIT), TimingRecord::Pulse(560));
        assert_eq!(TimingRecord::from_raw(1690), TimingRecord::Space(1690));
        assert_eq!(TimingRecord::Pulse(PULSE_MASK + 10).to_raw(), PULSE_MASK | PULSE_BIT);
    }

    #[test]
    fn test_mode_feature_mapping() {
        assert_eq!(Features::REC_MODE2.bits(), 0x0004_0000);
        assert_eq!(Features::from_rec_mode(Mode::MODE2), Features::REC_MODE2);
        assert_eq!(Features::from_send_mode(Mode::PULSE), Features::SEND_PULSE);
        let f = Features::REC_MODE2 | Features::SEND_PULSE;
        assert_eq!(f.rec_modes(), Mode::MODE2);
        assert_eq!(f.send_modes(), Mode::PULSE);
        assert!(f.can_receive());
        assert!(!Features::SEND_PULSE.can_receive());
    }

    #[test]
    fn test_default_features() {
        assert_eq!(Features::default_for_code_length(8), Features::REC_CODE);
        assert_eq!(Features::default_for_code_length(32), Features::REC_LIRCCODE);
    }

    #[test]
    fn test_decode_records() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(900 | PULSE_BIT).to_ne_bytes());
        bytes.extend_from_slice(&450u32.to_ne_bytes());
        assert_eq!(
            decode_records(&bytes),
            vec![TimingRecord::Pulse(900), TimingRecord::Space(450)]
        );
        assert_eq!(TimingRecord::Pulse(900).to_string(), "pulse 900");
    }
}
