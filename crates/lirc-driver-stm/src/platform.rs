//! Board description of an IR block.

use lirc_core::ScdValue;
use serde::{Deserialize, Serialize};

/// Per-board IR block settings (`stm_plat_lirc_data`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StmPlatformData {
    /// Receive polarity inversion register value
    #[serde(default = "default_rx_polarity")]
    pub rx_polarity: u32,

    /// Receive sampling divisor, 0 to derive it from the clock
    #[serde(default)]
    pub irb_clock_div: u32,

    /// Period correction multiplier (manual clock mode)
    #[serde(default = "default_one")]
    pub irb_period_mult: u32,

    /// Period correction divisor (manual clock mode)
    #[serde(default = "default_one")]
    pub irb_period_div: u32,

    /// Longest symbol period in µs before a command ends, 0 for none
    #[serde(default)]
    pub irb_rx_max_period: u32,

    /// Rate of the communications clock feeding the block
    #[serde(default = "default_sys_clock_hz")]
    pub sys_clock_hz: u64,

    /// Divider between the communications clock and the block
    #[serde(default = "default_one")]
    pub sys_clock_div: u32,

    /// Transmit subcarrier on-width in percent, 0 for 50 %
    #[serde(default)]
    pub subcarrier_width: u32,

    /// Receive through the UHF bank (required for start-code detection)
    #[serde(default)]
    pub rx_uhf_mode: bool,

    /// Transmitter wired up
    #[serde(default = "default_true")]
    pub tx_enabled: bool,

    /// Start code armed at probe time
    #[serde(default)]
    pub scd: Option<ScdValue>,
}

fn default_rx_polarity() -> u32 {
    1
}

fn default_one() -> u32 {
    1
}

fn default_sys_clock_hz() -> u64 {
    100_000_000
}

fn default_true() -> bool {
    true
}

impl Default for StmPlatformData {
    fn default() -> Self {
        Self {
            rx_polarity: 1,
            irb_clock_div: 0,
            irb_period_mult: 1,
            irb_period_div: 1,
            irb_rx_max_period: 0,
            sys_clock_hz: default_sys_clock_hz(),
            sys_clock_div: 1,
            subcarrier_width: 0,
            rx_uhf_mode: false,
            tx_enabled: true,
            scd: None,
        }
    }
}

impl StmPlatformData {
    /// Clock rate reaching the IR block.
    pub fn base_clock(&self) -> u64 {
        self.sys_clock_hz / u64::from(self.sys_clock_div.max(1))
    }

    /// Effective subcarrier on-width in percent.
    pub fn subcarrier_width_percent(&self) -> u32 {
        match self.subcarrier_width {
            0 => 50,
            w if w > 100 => 50,
            w => w,
        }
    }
}
