//! Start-code detection (SCD) filter.
//!
//! In UHF mode the IR block can hold back a received command until a
//! configured leading bit pattern has been seen. The pattern itself never
//! reaches the receive FIFO, so the decoder re-creates it from the
//! configuration: every start code is expanded once into the pulse/space
//! records it stands for, and that prefix is spliced in front of each
//! delivered sequence.
//!
//! ```text
//!      ____________       ____      ___
//!     |            |     |    |    |
//! ____|            |_____|    |____|
//!     |- 500 -|- 500 -|- 500 -|- 500 -|
//!         1       1       0       1        code 0b1101, nominal 500 µs
//! ```

use crate::regs::{IrbRegister, RegisterIo, SCD_CFG_ENABLE, SCD_CFG_RESTART};
use bitflags::bitflags;
use lirc_core::features::same_polarity;
use lirc_core::{LircError, LircT, Result, ScdValue, PULSE_BIT, PULSE_MASK};
use tracing::{debug, error, info};

/// Longest start code the hardware accepts, in symbols.
pub const SCD_MAX_SYMBOLS: u32 = 32;

/// Symbol time tolerance, percent of the nominal time.
pub const SCD_TOLERANCE_PERCENT: u32 = 25;

/// Smallest tolerance the detector can resolve, in µs.
pub const SCD_MIN_TOLERANCE: u32 = 4;

/// Largest nominal symbol time the 16-bit symbol time registers hold, in µs.
pub const SCD_MAX_NOMINAL_TIME: u32 = 0xffff;

bitflags! {
    /// Detection state of the filter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScdFlags: u32 {
        /// Primary code detected
        const NORMAL = 0x01;
        /// Alternative code detected
        const ALTERNATIVE = 0x02;
        /// No alternative code; both registers hold the primary
        const NOR_EQ_ALT = 0x04;
        /// Filter configured
        const ENABLED = 0x08;
    }
}

/// Number of symbols in a start code (position of its highest set bit).
pub fn code_length(code: u32) -> u32 {
    u32::BITS - code.leading_zeros()
}

/// Expand a start code into pulse/space records, most significant symbol
/// first. Runs of equal symbols become one record.
pub fn prefix_symbols(code: u32, nominal_time: u32) -> Vec<LircT> {
    let len = code_length(code);
    let mut records = Vec::new();
    let mut run = 0u32;

    for i in (0..len).rev() {
        let level = (code >> i) & 1;
        run = run.saturating_add(nominal_time);
        let run_ends = i == 0 || (code >> (i - 1)) & 1 != level;
        if run_ends {
            let duration = run.min(PULSE_MASK);
            records.push(if level == 1 { duration | PULSE_BIT } else { duration });
            run = 0;
        }
    }
    records
}

/// Width of the first run of identical symbols of `code`.
fn leading_run(code: u32) -> u32 {
    let len = code_length(code);
    if len == 0 {
        return 0;
    }
    let level = (code >> (len - 1)) & 1;
    (0..len)
        .rev()
        .take_while(|&i| (code >> i) & 1 == level)
        .count() as u32
}

/// `ScdNoiseRecov` value for a primary and alternative code.
///
/// Bits 0/16 enable recovery, bits 1/17 give the level of the leading
/// symbol and bits 8../24.. the width of the leading run.
pub fn noise_recovery_word(code: u32, alt_code: u32) -> u32 {
    let mut word = 1 | (1 << 16);
    let len = code_length(code);
    if len > 0 && (code >> (len - 1)) & 1 == 1 {
        word |= 1 << 1;
    }
    word |= (leading_run(code) & 0xff) << 8;

    let alt_len = code_length(alt_code);
    if alt_len > 0 && (alt_code >> (alt_len - 1)) & 1 == 1 {
        word |= 1 << 17;
    }
    word |= (leading_run(alt_code) & 0xff) << 24;
    word
}

/// Symbol tolerance for a nominal time, in µs.
pub fn tolerance(nominal_time: u32) -> u32 {
    let tolerance = u64::from(nominal_time) * u64::from(SCD_TOLERANCE_PERCENT) / 100;
    let tolerance = u32::try_from(tolerance).unwrap_or(u32::MAX);
    tolerance.max(SCD_MIN_TOLERANCE).min(nominal_time / 2)
}

/// Check a start-code configuration. Returns the primary and alternative
/// code lengths, the latter 0 when there is no alternative.
pub fn validate(value: &ScdValue) -> Result<(u32, u32)> {
    let len = code_length(value.code);
    if value.code == 0 || len > SCD_MAX_SYMBOLS {
        return Err(LircError::invalid(format!(
            "invalid start code 0x{:x}",
            value.code
        )));
    }
    if value.nominal_time == 0 {
        return Err(LircError::invalid("start code nominal time must be non-zero"));
    }
    if value.nominal_time > SCD_MAX_NOMINAL_TIME {
        return Err(LircError::invalid(format!(
            "start code nominal time {} µs exceeds {} µs",
            value.nominal_time, SCD_MAX_NOMINAL_TIME
        )));
    }

    let alt_len = code_length(value.alt_code);
    if alt_len > 0
        && (alt_len > SCD_MAX_SYMBOLS
            || alt_len < len
            || value.code == value.alt_code >> (alt_len - len))
    {
        return Err(LircError::invalid(format!(
            "invalid alternative start code 0x{:x}",
            value.alt_code
        )));
    }
    Ok((len, alt_len))
}

/// Start-code filter state.
#[derive(Debug, Clone)]
pub struct ScdFilter {
    value: ScdValue,
    flags: ScdFlags,
    prefix_code: Vec<LircT>,
    prefix_alt: Vec<LircT>,
    active: bool,
}

impl Default for ScdFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScdFilter {
    /// Unarmed filter.
    pub fn new() -> Self {
        Self {
            value: ScdValue::default(),
            flags: ScdFlags::empty(),
            prefix_code: Vec::new(),
            prefix_alt: Vec::new(),
            active: false,
        }
    }

    /// Program and arm the filter.
    ///
    /// An invalid configuration is rejected before any register is touched,
    /// leaving the previous configuration armed. A start code that does not
    /// read back (broken silicon) disarms the filter.
    pub fn configure(
        &mut self,
        io: &dyn RegisterIo,
        value: ScdValue,
        base_clock: u64,
        uhf: bool,
    ) -> Result<()> {
        if !uhf {
            error!("SCD not available in IR-RX mode. Not armed");
            return Err(LircError::operation_not_supported(
                "start-code detection needs UHF receive mode",
            ));
        }
        let (len, alt_len) = validate(&value).map_err(|e| {
            error!(code = value.code, alt_code = value.alt_code, "SCD invalid start code. Not armed");
            e
        })?;

        self.flags = ScdFlags::empty();
        self.active = false;
        self.prefix_code.clear();
        self.prefix_alt.clear();

        io.write(IrbRegister::ScdConfig, 0);
        // 1 MHz detector sampling
        io.write(IrbRegister::ScdPrescaler, (base_clock / 1_000_000) as u32);

        let tolerance = tolerance(value.nominal_time);

        io.write(IrbRegister::ScdCode, value.code);
        let read_back = io.read(IrbRegister::ScdCode);
        if read_back != value.code {
            error!("SCD hardware fault. Broken silicon?");
            error!(
                "SCD wrote code 0x{:08x} read 0x{:08x}. Not armed",
                value.code, read_back
            );
            return Err(LircError::NoDevice { minor: 0 });
        }

        io.write(IrbRegister::ScdSymbMinTime, value.nominal_time - tolerance);
        io.write(IrbRegister::ScdSymbNomTime, value.nominal_time);
        io.write(
            IrbRegister::ScdSymbMaxTime,
            value.nominal_time.saturating_add(tolerance),
        );

        let alt_code = if alt_len > 0 { value.alt_code } else { value.code };
        if value.noise_recovery != 0 {
            let word = noise_recovery_word(value.code, alt_code);
            debug!("SCD noise recovery 0x{:08x}", word);
            io.write(IrbRegister::ScdNoiseRecov, word);
        }

        info!(
            code_length = len,
            nominal_time = value.nominal_time,
            tolerance,
            "SCD normal code 0x{:x} armed",
            value.code
        );
        io.write(IrbRegister::ScdAltCode, alt_code);
        let alt_len = if alt_len > 0 {
            info!(
                code_length = alt_len,
                "SCD alternative code 0x{:x} armed",
                value.alt_code
            );
            self.prefix_alt = prefix_symbols(value.alt_code, value.nominal_time);
            alt_len
        } else {
            self.flags |= ScdFlags::NOR_EQ_ALT;
            len
        };

        // A 5-bit length of 0 means 32 symbols
        io.write(IrbRegister::ScdCodeLen, ((alt_len & 0x1f) << 8) | (len & 0x1f));

        self.prefix_code = prefix_symbols(value.code, value.nominal_time);
        self.value = value;
        self.flags |= ScdFlags::ENABLED;
        Ok(())
    }

    /// Turn the armed filter on or off.
    pub fn set_enabled(&mut self, io: &dyn RegisterIo, enable: bool) -> Result<()> {
        if !self.is_armed() {
            return Err(LircError::operation_not_supported("start code not armed"));
        }
        if enable {
            io.write(IrbRegister::ScdIntEnable, 1);
            io.write(IrbRegister::ScdIntClear, 1);
            io.write(IrbRegister::ScdConfig, SCD_CFG_ENABLE);
        } else {
            io.write(IrbRegister::ScdIntEnable, 0);
            io.write(IrbRegister::ScdConfig, 0);
        }
        self.active = enable;
        debug!("SCD {}", if enable { "enabled" } else { "disabled" });
        Ok(())
    }

    /// True once a configuration has been accepted.
    pub fn is_armed(&self) -> bool {
        self.flags.contains(ScdFlags::ENABLED)
    }

    /// True while the hardware filter is running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Value reported by `SCD_STATUS`.
    pub fn status(&self) -> u64 {
        u64::from((self.flags & ScdFlags::ENABLED).bits())
    }

    /// Current configuration.
    pub fn value(&self) -> ScdValue {
        self.value
    }

    /// Detection and configuration flags.
    pub fn flags(&self) -> ScdFlags {
        self.flags
    }

    /// Expanded prefix of the primary code.
    pub fn prefix(&self) -> &[LircT] {
        &self.prefix_code
    }

    /// Latch which code was detected, once per command.
    pub fn latch_status(&mut self, io: &dyn RegisterIo) {
        if !self.active || self.flags.intersects(ScdFlags::NORMAL | ScdFlags::ALTERNATIVE) {
            return;
        }
        let status = io.read(IrbRegister::ScdStatus) & 0x03;
        self.flags |= ScdFlags::from_bits_truncate(status);
        io.write(IrbRegister::ScdIntClear, 1);
        io.write(IrbRegister::ScdIntEnable, 0);
    }

    /// Forget the detected code.
    pub fn reset_detection(&mut self) {
        self.flags &= ScdFlags::ENABLED | ScdFlags::NOR_EQ_ALT;
    }

    /// Re-arm detection after a complete command.
    pub fn reactivate(&mut self, io: &dyn RegisterIo) {
        if !self.active {
            return;
        }
        self.reset_detection();
        io.write(IrbRegister::ScdIntEnable, 1);
        io.write(IrbRegister::ScdConfig, SCD_CFG_ENABLE);
    }

    /// Restart detection from scratch.
    pub fn restart(&self, io: &dyn RegisterIo) {
        if !self.is_armed() {
            return;
        }
        io.write(IrbRegister::ScdConfig, SCD_CFG_RESTART);
        io.write(IrbRegister::ScdConfig, SCD_CFG_ENABLE);
    }

    /// Records the hardware filtered out ahead of `records`.
    ///
    /// When the last prefix record and the first received record share a
    /// polarity the two are merged into `records[0]`, so the spliced stream
    /// keeps alternating. Empty unless the filter is running.
    pub fn merge_prefix(&self, records: &mut [LircT]) -> Vec<LircT> {
        if !self.active || !self.is_armed() {
            return Vec::new();
        }
        let use_alt = self.flags.contains(ScdFlags::ALTERNATIVE)
            && !self.flags.contains(ScdFlags::NOR_EQ_ALT);
        let mut prefix = if use_alt {
            self.prefix_alt.clone()
        } else {
            self.prefix_code.clone()
        };

        if let (Some(&last), Some(first)) = (prefix.last(), records.first_mut()) {
            if same_polarity(last, *first) {
                let merged = ((*first & PULSE_MASK) + (last & PULSE_MASK)).min(PULSE_MASK);
                *first = (*first & PULSE_BIT) | merged;
                prefix.pop();
            }
        }
        prefix
    }
}
