//! Receive FIFO decoder.
//!
//! Runs once per receive interrupt and drains the hardware FIFO. Each entry
//! carries the pulse time and the symbol period (pulse + space) of one
//! symbol in sampling units. Symbols accumulate as pulse/space record pairs
//! until a period of `0xFFFF` closes the command; the command is then
//! written to the ring buffer as one batch:
//!
//! ```text
//! [sync space] [SCD prefix ...] pulse space pulse space ... pulse
//! ```
//!
//! The sync space is the idle time since the previous command, so the
//! records of consecutive commands add up to wall-clock time. The trailing
//! space of the command is left out; the next sync space covers it.
//!
//! A command is never split: if it overran the FIFO, grew past
//! [`MAX_SYMBOLS`] or does not fit in the buffer, all of it is dropped.

use crate::clock::RxClocks;
use crate::regs::{
    IrbRegister, RegisterIo, RX_CLEAR_IRQ, RX_CLEAR_LAST_SYMBOL, RX_DRAIN_IRQ, RX_ENABLE_IRQ,
    RX_END_OF_SEQUENCE, RX_OVERRUN, RX_WORDS_OR_OVERRUN,
};
use crate::scd::{ScdFilter, SCD_MAX_SYMBOLS};
use lirc_core::{LircT, RingBuffer, PULSE_BIT, PULSE_MASK};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Most symbols (pulse/space pairs) in one command.
pub const MAX_SYMBOLS: usize = 100;

/// Free records kept back for the start-code prefix.
const SCD_MARGIN: usize = SCD_MAX_SYMBOLS as usize;

/// Longest idle gap expressed as a sync space, in µs.
const MAX_SYNC_GAP_US: u64 = (PULSE_MASK as u64 / 1_000_000) * 1_000_000;

/// Microsecond time source for sync spaces.
pub trait Clock: Send + Sync {
    /// Current time in µs from an arbitrary origin.
    fn now_us(&self) -> u64;
}

/// Monotonic system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Clock reading `start` µs.
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, us: u64) {
        self.now.fetch_add(us, Ordering::SeqCst);
    }

    /// Set the clock.
    pub fn set(&self, us: u64) {
        self.now.store(us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// What one interrupt did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptOutcome {
    /// Commands written to the ring buffer
    pub delivered: usize,
    /// Commands dropped (overrun, too long, no space)
    pub dropped: usize,
    /// FIFO overruns seen
    pub overruns: usize,
}

impl InterruptOutcome {
    /// Add another outcome to this one.
    pub fn merge(&mut self, other: InterruptOutcome) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
        self.overruns += other.overruns;
    }
}

/// Receive state carried between interrupts.
#[derive(Debug)]
pub struct RxDecoder {
    clocks: RxClocks,
    scratch: Vec<LircT>,
    sum_us: u64,
    error: bool,
    last_sync: Option<u64>,
}

impl RxDecoder {
    /// Decoder converting with `clocks`.
    pub fn new(clocks: RxClocks) -> Self {
        Self {
            clocks,
            scratch: Vec::with_capacity(2 * MAX_SYMBOLS),
            sum_us: 0,
            error: false,
            last_sync: None,
        }
    }

    /// Replace the timing correction (after a clock change).
    pub fn set_clocks(&mut self, clocks: RxClocks) {
        self.clocks = clocks;
    }

    /// Timing correction in use.
    pub fn clocks(&self) -> RxClocks {
        self.clocks
    }

    /// Symbols collected for the command in progress.
    pub fn pending_symbols(&self) -> usize {
        self.scratch.len() / 2
    }

    /// True while the command in progress is being discarded.
    pub fn is_discarding(&self) -> bool {
        self.error
    }

    /// Drop the command in progress.
    pub fn reset(&mut self) {
        self.scratch.clear();
        self.sum_us = 0;
        self.error = false;
    }

    /// Drain the receive FIFO.
    pub fn handle_interrupt(
        &mut self,
        io: &dyn RegisterIo,
        buffer: &RingBuffer,
        scd: &mut ScdFilter,
        clock: &dyn Clock,
    ) -> InterruptOutcome {
        let mut outcome = InterruptOutcome::default();
        let mut clear_irq = true;
        let mut last_symbol = false;

        scd.latch_status(io);

        while io.read(IrbRegister::RxStatus) & RX_WORDS_OR_OVERRUN != 0 {
            if io.read(IrbRegister::RxIntStatus) & RX_OVERRUN != 0 {
                warn!("IR RX overrun");
                io.write(IrbRegister::RxIntClear, RX_OVERRUN);
                self.error = true;
                outcome.overruns += 1;
            }

            let period = io.read(IrbRegister::RxSys);
            let mark = io.read(IrbRegister::RxOn);

            if clear_irq {
                // Only the overrun interrupt stays enabled while draining
                io.write(IrbRegister::RxIntClear, RX_CLEAR_IRQ);
                io.write(IrbRegister::RxIntEnable, RX_DRAIN_IRQ);
                clear_irq = false;
            }

            last_symbol = period == RX_END_OF_SEQUENCE;

            if !self.error && self.pending_symbols() >= MAX_SYMBOLS {
                warn!(max = MAX_SYMBOLS, "IR too many symbols");
                self.error = true;
            }

            if self.error {
                self.scratch.clear();
                self.sum_us = 0;
                if last_symbol {
                    debug!("Discarded command ended");
                    self.error = false;
                    outcome.dropped += 1;
                }
                continue;
            }

            // Each command opens with a ~1 µs calibration symbol
            if mark <= 2 || period <= 1 {
                continue;
            }

            let space = self.clocks.space_us(period.saturating_sub(mark)).min(PULSE_MASK);
            let pulse = self.clocks.pulse_us(mark).min(PULSE_MASK);
            self.scratch.push(pulse | PULSE_BIT);
            self.scratch.push(space);
            self.sum_us += u64::from(pulse) + u64::from(space);

            if last_symbol {
                if self.flush(buffer, scd, clock) {
                    outcome.delivered += 1;
                } else {
                    outcome.dropped += 1;
                }
                self.reset();
            }
        }

        io.write(IrbRegister::RxIntClear, RX_CLEAR_IRQ | RX_CLEAR_LAST_SYMBOL);
        io.write(IrbRegister::RxIntEnable, RX_ENABLE_IRQ);

        if last_symbol {
            scd.reactivate(io);
        }
        outcome
    }

    /// Write the finished command, or drop it if the buffer is short.
    fn flush(&mut self, buffer: &RingBuffer, scd: &ScdFilter, clock: &dyn Clock) -> bool {
        let symbols = self.pending_symbols();
        if buffer.available() < self.scratch.len() + SCD_MARGIN {
            error!(
                symbols,
                available = buffer.available(),
                "not enough space in user buffer"
            );
            return false;
        }

        let now = clock.now_us();
        let trailing_space = self.scratch.last().copied().unwrap_or(0);
        let sync = match self.last_sync {
            None => PULSE_MASK,
            Some(prev) => {
                let elapsed = now.saturating_sub(prev);
                if elapsed > MAX_SYNC_GAP_US {
                    PULSE_MASK
                } else {
                    let busy = self.sum_us - u64::from(trailing_space);
                    elapsed.saturating_sub(busy).min(u64::from(PULSE_MASK)) as LircT
                }
            }
        };
        self.last_sync = Some(now);

        let body_len = self.scratch.len() - 1;
        let prefix = scd.merge_prefix(&mut self.scratch[..body_len]);

        let mut records = Vec::with_capacity(1 + prefix.len() + body_len);
        records.push(sync);
        records.extend_from_slice(&prefix);
        records.extend_from_slice(&self.scratch[..body_len]);

        if !buffer.write_records(&records) {
            error!(symbols, "not enough space in user buffer");
            return false;
        }
        debug!(symbols, records = records.len(), "Command delivered");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedIrb;
    use lirc_core::{ScdValue, TimingRecord};

    fn drain(buffer: &RingBuffer) -> Vec<TimingRecord> {
        std::iter::from_fn(|| buffer.read_record())
            .map(TimingRecord::from_raw)
            .collect()
    }

    #[test]
    fn test_command_decoded() {
        let sim = SimulatedIrb::new();
        let buffer = RingBuffer::for_records(200).unwrap();
        let mut scd = ScdFilter::new();
        let clock = ManualClock::new(0);
        let mut rx = RxDecoder::new(RxClocks::default());

        sim.push_rx_sequence(&[(1, 1), (560, 1120), (560, 2250), (560, RX_END_OF_SEQUENCE)]);
        let outcome = rx.handle_interrupt(&sim, &buffer, &mut scd, &clock);
        assert_eq!(outcome.delivered, 1);

        assert_eq!(
            drain(&buffer),
            vec![
                TimingRecord::Space(PULSE_MASK),
                TimingRecord::Pulse(560),
                TimingRecord::Space(560),
                TimingRecord::Pulse(560),
                TimingRecord::Space(1690),
                TimingRecord::Pulse(560),
            ]
        );
        assert_eq!(sim.peek(IrbRegister::RxIntEnable), RX_ENABLE_IRQ);
    }

    #[test]
    fn test_sync_space_covers_idle_time() {
        let sim = SimulatedIrb::new();
        let buffer = RingBuffer::for_records(200).unwrap();
        let mut scd = ScdFilter::new();
        let clock = ManualClock::new(1_000_000);
        let mut rx = RxDecoder::new(RxClocks::default());

        sim.push_rx_sequence(&[(500, 1000), (500, RX_END_OF_SEQUENCE)]);
        rx.handle_interrupt(&sim, &buffer, &mut scd, &clock);
        drain(&buffer);

        // Second command: 1500 µs of pulses and spaces, 40 ms later
        clock.advance(40_000);
        sim.push_rx_sequence(&[(500, 1000), (500, RX_END_OF_SEQUENCE)]);
        rx.handle_interrupt(&sim, &buffer, &mut scd, &clock);
        let records = drain(&buffer);
        assert_eq!(records[0], TimingRecord::Space(40_000 - 1500));
    }

    #[test]
    fn test_command_spans_interrupts() {
        let sim = SimulatedIrb::new();
        let buffer = RingBuffer::for_records(200).unwrap();
        let mut scd = ScdFilter::new();
        let clock = ManualClock::new(0);
        let mut rx = RxDecoder::new(RxClocks::default());

        sim.push_rx_sequence(&[(600, 1200), (600, 1200)]);
        let outcome = rx.handle_interrupt(&sim, &buffer, &mut scd, &clock);
        assert_eq!(outcome.delivered, 0);
        assert_eq!(rx.pending_symbols(), 2);
        assert!(buffer.is_empty());

        sim.push_rx(600, RX_END_OF_SEQUENCE);
        let outcome = rx.handle_interrupt(&sim, &buffer, &mut scd, &clock);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(buffer.len(), 6);
    }

    #[test]
    fn test_overrun_discards_until_end_of_command() {
        let sim = SimulatedIrb::new();
        let buffer = RingBuffer::for_records(200).unwrap();
        let mut scd = ScdFilter::new();
        let clock = ManualClock::new(0);
        let mut rx = RxDecoder::new(RxClocks::default());

        sim.push_rx_sequence(&[(600, 1200), (600, 1200)]);
        sim.inject_overrun();
        let outcome = rx.handle_interrupt(&sim, &buffer, &mut scd, &clock);
        assert_eq!(outcome.overruns, 1);
        assert!(rx.is_discarding());

        sim.push_rx_sequence(&[(600, 1200), (600, RX_END_OF_SEQUENCE)]);
        let outcome = rx.handle_interrupt(&sim, &buffer, &mut scd, &clock);
        assert_eq!(outcome.dropped, 1);
        assert!(!rx.is_discarding());
        assert!(buffer.is_empty());

        // Next command is clean
        sim.push_rx_sequence(&[(600, 1200), (600, RX_END_OF_SEQUENCE)]);
        let outcome = rx.handle_interrupt(&sim, &buffer, &mut scd, &clock);
        assert_eq!(outcome.delivered, 1);
    }

    #[test]
    fn test_too_many_symbols_dropped() {
        let sim = SimulatedIrb::new();
        let buffer = RingBuffer::for_records(400).unwrap();
        let mut scd = ScdFilter::new();
        let clock = ManualClock::new(0);
        let mut rx = RxDecoder::new(RxClocks::default());

        for _ in 0..MAX_SYMBOLS + 5 {
            sim.push_rx(500, 1000);
        }
        sim.push_rx(500, RX_END_OF_SEQUENCE);
        let outcome = rx.handle_interrupt(&sim, &buffer, &mut scd, &clock);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.delivered, 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_scd_prefix_spliced() {
        let sim = SimulatedIrb::new();
        let buffer = RingBuffer::for_records(200).unwrap();
        let mut scd = ScdFilter::new();
        scd.configure(
            &sim,
            ScdValue {
                code: 0b1101,
                alt_code: 0,
                nominal_time: 500,
                noise_recovery: 0,
            },
            100_000_000,
            true,
        )
        .unwrap();
        scd.set_enabled(&sim, true).unwrap();
        let clock = ManualClock::new(0);
        let mut rx = RxDecoder::new(RxClocks::default());

        sim.detect_start_code(0b01);
        sim.push_rx_sequence(&[(300, 800), (400, RX_END_OF_SEQUENCE)]);
        rx.handle_interrupt(&sim, &buffer, &mut scd, &clock);

        assert_eq!(
            drain(&buffer),
            vec![
                TimingRecord::Space(PULSE_MASK),
                TimingRecord::Pulse(1000),
                TimingRecord::Space(500),
                // Last prefix pulse merged with the first received pulse
                TimingRecord::Pulse(800),
                TimingRecord::Space(500),
                TimingRecord::Pulse(400),
            ]
        );
        // Re-armed for the next command
        assert_eq!(sim.peek(IrbRegister::ScdConfig), 1);
    }
}
