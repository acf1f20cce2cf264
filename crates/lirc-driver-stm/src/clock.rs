//! Receive and transmit clock setup.
//!
//! The IR block samples at 10 MHz and transmits on a 38 kHz carrier. Both
//! are derived from the communications clock by integer divisors; the
//! rational `mult/div` factors computed here correct for the rounding those
//! divisors introduce.

use crate::platform::StmPlatformData;
use crate::regs::{IrbRegister, RegisterIo};
use serde::Serialize;
use tracing::debug;

/// Sampling clock the receiver expects.
pub const RX_SAMPLING_HZ: u64 = 10_000_000;

/// Transmit carrier frequency.
pub const TX_CARRIER_HZ: u64 = 38_000;

// =============================================================================
// Receiver
// =============================================================================

/// Receiver divisor and timing correction factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RxClocks {
    /// Value for `RxRateCommon`
    pub sampling_div: u32,
    /// Space (period) correction numerator
    pub symbol_mult: u32,
    /// Space (period) correction denominator
    pub symbol_div: u32,
    /// Pulse correction numerator
    pub pulse_mult: u32,
    /// Pulse correction denominator
    pub pulse_div: u32,
    /// Value for `RxMaxSymPeriod`, 0 for no limit
    pub max_symbol_period: u32,
}

impl Default for RxClocks {
    fn default() -> Self {
        Self {
            sampling_div: 1,
            symbol_mult: 1,
            symbol_div: 1,
            pulse_mult: 1,
            pulse_div: 1,
            max_symbol_period: 0,
        }
    }
}

impl RxClocks {
    /// Derive the receiver settings from the block clock.
    ///
    /// With `irb_clock_div == 0` the divisor is chosen for a 10 MHz sample
    /// rate and the factors compensate the remainder; otherwise the board's
    /// divisor and period factors are used as given.
    pub fn calculate(base_clock: u64, platform: &StmPlatformData) -> Self {
        let mut clocks = Self::default();

        if platform.irb_clock_div == 0 {
            let div = (base_clock / RX_SAMPLING_HZ).max(1);
            clocks.sampling_div = div as u32;

            let freqdiff = base_clock as i64 - (div * RX_SAMPLING_HZ) as i64;
            if freqdiff != 0 {
                let ratio = (base_clock / (10_000 * div)).max(1) as u32;
                if freqdiff > 0 {
                    // Running fast
                    clocks.pulse_mult = 1000;
                    clocks.pulse_div = ratio;
                    clocks.symbol_mult = 1000;
                    clocks.symbol_div = ratio;
                } else {
                    // Running slow
                    clocks.symbol_mult = ratio;
                    clocks.symbol_div = 1000;
                    clocks.pulse_mult = ratio;
                    clocks.pulse_div = 1000;
                }
            }
        } else {
            clocks.sampling_div = platform.irb_clock_div;
            clocks.symbol_mult = platform.irb_period_mult;
            clocks.symbol_div = platform.irb_period_div.max(1);
            clocks.pulse_mult = clocks.symbol_mult;
            clocks.pulse_div = clocks.symbol_div;
        }

        if platform.irb_rx_max_period != 0 {
            clocks.max_symbol_period = (u64::from(platform.irb_rx_max_period)
                * u64::from(clocks.symbol_mult)
                / u64::from(clocks.symbol_div)) as u32;
        }
        clocks
    }

    /// Write the divisor and maximum symbol period.
    pub fn program(&self, io: &dyn RegisterIo) {
        io.write(IrbRegister::RxRateCommon, self.sampling_div);
        io.write(IrbRegister::RxMaxSymPeriod, self.max_symbol_period);
        debug!(
            sampling_div = self.sampling_div,
            symbol_mult = self.symbol_mult,
            symbol_div = self.symbol_div,
            pulse_mult = self.pulse_mult,
            pulse_div = self.pulse_div,
            max_symbol_period = self.max_symbol_period,
            "RX clocks programmed"
        );
    }

    /// Corrected pulse time in µs.
    pub fn pulse_us(&self, raw: u32) -> u32 {
        scale(raw, self.pulse_mult, self.pulse_div)
    }

    /// Corrected space time in µs.
    pub fn space_us(&self, raw: u32) -> u32 {
        scale(raw, self.symbol_mult, self.symbol_div)
    }
}

fn scale(value: u32, mult: u32, div: u32) -> u32 {
    (u64::from(value) * u64::from(mult) / u64::from(div.max(1))).min(u64::from(u32::MAX)) as u32
}

// =============================================================================
// Transmitter
// =============================================================================

/// Transmitter prescaler, subcarrier and timing correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TxClocks {
    /// Value for `TxPrescaler`
    pub prescaler: u32,
    /// Value for `TxSubcarrier`
    pub subcarrier: u32,
    /// Value for `TxSubcarrierWidth`
    pub subcarrier_width: u32,
    /// µs correction numerator
    pub mult: u32,
    /// µs correction denominator
    pub div: u32,
}

impl TxClocks {
    /// Find the prescaler/subcarrier pair whose product divides `clock`
    /// closest to the 38 kHz carrier.
    pub fn calculate(clock: u64, width_percent: u32) -> Self {
        let ratio = clock / TX_CARRIER_HZ;
        let mut nmin = ratio / 255;
        if nmin & 1 == 1 {
            nmin += 1;
        }

        let mut best_diff = clock;
        let mut best_n = 0u64;
        let mut best_scalar = 0u64;
        let mut n = nmin.max(2);
        while n < ratio {
            let scalar = ratio / n;
            if scalar != 0 && scalar & 1 == 0 {
                let delta = clock.abs_diff(scalar * TX_CARRIER_HZ * n);
                if delta < best_diff {
                    best_diff = delta;
                    best_n = n;
                    best_scalar = scalar;
                }
                if delta == 0 {
                    break;
                }
            }
            n += 2;
        }

        let prescaler = best_scalar / 2;
        let subcarrier = best_n * 2;

        let (mult, div) = if best_diff == 0 || subcarrier == 0 {
            (1, 1)
        } else {
            let actual = prescaler * TX_CARRIER_HZ * subcarrier;
            let ratio = (actual / (clock / 10_000).max(1)).max(1);
            if actual < clock {
                (10_000, ratio)
            } else {
                (ratio, 10_000)
            }
        };

        Self {
            prescaler: prescaler as u32,
            subcarrier: subcarrier as u32,
            subcarrier_width: (subcarrier * u64::from(width_percent) / 100) as u32,
            mult: mult as u32,
            div: div as u32,
        }
    }

    /// Write prescaler, subcarrier and subcarrier width.
    pub fn program(&self, io: &dyn RegisterIo) {
        io.write(IrbRegister::TxPrescaler, self.prescaler);
        io.write(IrbRegister::TxSubcarrier, self.subcarrier);
        io.write(IrbRegister::TxSubcarrierWidth, self.subcarrier_width);
        debug!(
            prescaler = self.prescaler,
            subcarrier = self.subcarrier,
            mult = self.mult,
            div = self.div,
            "TX clocks programmed"
        );
    }

    /// Convert µs to the nearest number of carrier cycles.
    pub fn time_to_cycles(&self, us: u32) -> u32 {
        let corrected = u64::from(us) * u64::from(self.mult) / u64::from(self.div.max(1));
        (corrected * TX_CARRIER_HZ / 1_000_000).min(u64::from(u32::MAX)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rx_exact_ten_mhz_multiple() {
        let clocks = RxClocks::calculate(100_000_000, &StmPlatformData::default());
        assert_eq!(clocks.sampling_div, 10);
        assert_eq!(clocks, RxClocks { sampling_div: 10, ..RxClocks::default() });
        assert_eq!(clocks.pulse_us(560), 560);
    }

    #[test]
    fn test_rx_fast_clock_scales_down() {
        // 105 MHz: divisor 10 leaves the block sampling 5 % fast
        let clocks = RxClocks::calculate(105_000_000, &StmPlatformData::default());
        assert_eq!(clocks.sampling_div, 10);
        assert_eq!((clocks.pulse_mult, clocks.pulse_div), (1000, 1050));
        assert_eq!((clocks.symbol_mult, clocks.symbol_div), (1000, 1050));
        assert_eq!(clocks.pulse_us(1050), 1000);
    }

    #[test]
    fn test_rx_slow_clock_scales_up() {
        // 5 MHz: divisor clamped to 1
        let clocks = RxClocks::calculate(5_000_000, &StmPlatformData::default());
        assert_eq!(clocks.sampling_div, 1);
        assert_eq!((clocks.pulse_mult, clocks.pulse_div), (500, 1000));
        assert_eq!(clocks.space_us(1000), 500);
    }

    #[test]
    fn test_rx_manual_mode_and_max_period() {
        let platform = StmPlatformData {
            irb_clock_div: 8,
            irb_period_mult: 3,
            irb_period_div: 2,
            irb_rx_max_period: 10_000,
            ..StmPlatformData::default()
        };
        let clocks = RxClocks::calculate(100_000_000, &platform);
        assert_eq!(clocks.sampling_div, 8);
        assert_eq!((clocks.pulse_mult, clocks.pulse_div), (3, 2));
        assert_eq!(clocks.max_symbol_period, 15_000);
    }

    #[test]
    fn test_tx_exact_carrier() {
        // 38 kHz * 4 * 100
        let clocks = TxClocks::calculate(15_200_000, 50);
        assert_eq!(clocks.prescaler * clocks.subcarrier, 400);
        assert_eq!((clocks.mult, clocks.div), (1, 1));
        assert_eq!(clocks.subcarrier_width, clocks.subcarrier / 2);
        // 1 ms of carrier is 38 cycles
        assert_eq!(clocks.time_to_cycles(1000), 38);
    }

    #[test]
    fn test_tx_approximate_carrier() {
        let clock = 100_000_000u64;
        let clocks = TxClocks::calculate(clock, 25);
        let divisor = u64::from(clocks.prescaler) * u64::from(clocks.subcarrier);
        assert!(divisor > 0);
        let carrier = clock / divisor;
        assert!(carrier.abs_diff(TX_CARRIER_HZ) < TX_CARRIER_HZ / 100, "carrier {}", carrier);
        assert_ne!((clocks.mult, clocks.div), (1, 1));
        assert_eq!(clocks.subcarrier_width, clocks.subcarrier / 4);
    }
}
