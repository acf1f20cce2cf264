//! Transmit path.
//!
//! A write hands over alternating mark/space times in µs. The first
//! symbols are loaded into the 7-entry hardware FIFO right away; the
//! transmit interrupt tops the FIFO up until the terminating symbol, then
//! drains the FIFO and switches the transmitter off. One transmission is in
//! flight at a time; writers queue up behind it.

use crate::clock::TxClocks;
use crate::regs::{
    tx_fifo_used, IrbRegister, RegisterIo, TX_FIFO_DEPTH, TX_INT_ALL, TX_INT_PENDING,
    TX_INT_UNDERRUN,
};
use crate::rx::MAX_SYMBOLS;
use lirc_core::{LircError, LircT, Result, Signal};
use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Time value marking the end of a transmission.
pub const TX_END_OF_SEQUENCE: u32 = 0xffff;

/// Status polls before giving up on a FIFO drain.
const DRAIN_SPIN_LIMIT: usize = 100_000;

/// Wait slice while queued behind another transmission.
const IDLE_WAIT_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct TxState {
    clocks: TxClocks,
    symbols: Vec<(u32, u32)>,
    pos: usize,
    busy: bool,
    finishing: bool,
}

impl TxState {
    fn idle(&mut self) {
        self.symbols.clear();
        self.pos = 0;
        self.busy = false;
        self.finishing = false;
    }

    /// Queue the next symbol into the FIFO. Returns `false` once the
    /// terminating symbol has been written.
    fn load_next(&mut self, io: &dyn RegisterIo) -> bool {
        let Some(&(mark, space)) = self.symbols.get(self.pos) else {
            self.finishing = true;
            return false;
        };
        self.pos += 1;

        let on_time = self.clocks.time_to_cycles(mark) + 1;
        if mark == TX_END_OF_SEQUENCE || space == TX_END_OF_SEQUENCE {
            io.write(IrbRegister::TxSymPeriod, on_time * 2);
            io.write(IrbRegister::TxOnTime, on_time);
            debug!(on_time, period = on_time * 2, "TX end");
            self.finishing = true;
            return false;
        }

        let period = self.clocks.time_to_cycles(mark.saturating_add(space)) + 2;
        io.write(IrbRegister::TxOnTime, on_time);
        io.write(IrbRegister::TxSymPeriod, period);
        true
    }
}

/// Transmitter state shared by writers and the interrupt handler.
#[derive(Debug)]
pub struct Transmitter {
    enabled: bool,
    state: Mutex<TxState>,
    idle: Condvar,
}

impl Transmitter {
    /// Transmitter using `clocks`; `enabled` is false on boards without a
    /// transmit LED.
    pub fn new(clocks: TxClocks, enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(TxState {
                clocks,
                symbols: Vec::with_capacity(MAX_SYMBOLS),
                pos: 0,
                busy: false,
                finishing: false,
            }),
            idle: Condvar::new(),
        }
    }

    /// True if the board has a transmitter.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True while a transmission is in flight.
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Clock settings in use.
    pub fn clocks(&self) -> TxClocks {
        self.state.lock().clocks
    }

    /// Replace the clock settings (after a clock change).
    pub fn set_clocks(&self, clocks: TxClocks) {
        self.state.lock().clocks = clocks;
    }

    /// Block until no transmission is in flight or `timeout` passes.
    /// Returns `true` if idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.busy {
            let _ = self.idle.wait_while_for(&mut state, |s| s.busy, timeout);
        }
        !state.busy
    }

    /// Start transmitting `data`, native-endian `u32` mark/space times.
    ///
    /// At most [`MAX_SYMBOLS`] mark/space pairs are taken; the number of
    /// bytes consumed is returned. The last space is replaced by the
    /// terminator.
    pub fn write(
        &self,
        io: &dyn RegisterIo,
        data: &[u8],
        nonblocking: bool,
        signal: &Signal,
    ) -> Result<usize> {
        if !self.enabled {
            error!("write operation unsupported");
            return Err(LircError::operation_not_supported("transmitter not enabled"));
        }
        let record = std::mem::size_of::<LircT>();
        if data.len() % record != 0 {
            return Err(LircError::invalid(format!(
                "write of {} bytes is not a multiple of {}",
                data.len(),
                record
            )));
        }

        let mut state = self.state.lock();
        if state.busy && nonblocking {
            return Err(LircError::WouldBlock);
        }
        while state.busy {
            let _ = self.idle.wait_for(&mut state, IDLE_WAIT_SLICE);
            if state.busy {
                signal.check()?;
            }
        }

        let values: Vec<u32> = data
            .chunks_exact(record)
            .take(2 * MAX_SYMBOLS)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if values.is_empty() {
            return Ok(0);
        }

        state.symbols.clear();
        state.symbols.extend(
            values
                .chunks(2)
                .map(|pair| (pair[0], pair.get(1).copied().unwrap_or(TX_END_OF_SEQUENCE))),
        );
        if let Some(last) = state.symbols.last_mut() {
            last.1 = TX_END_OF_SEQUENCE;
        }
        state.pos = 0;
        state.finishing = false;

        for _ in 0..TX_FIFO_DEPTH {
            if !state.load_next(io) {
                break;
            }
        }

        state.busy = true;
        io.write(IrbRegister::TxIntEnable, TX_INT_ALL);
        io.write(IrbRegister::TxEnable, 1);
        debug!(symbols = state.symbols.len(), "TX enabled");

        Ok(values.len() * record)
    }

    /// Transmit interrupt: refill the FIFO or finish the transmission.
    pub fn handle_interrupt(&self, io: &dyn RegisterIo) {
        if io.read(IrbRegister::TxIntStatus) & TX_INT_PENDING == 0 {
            return;
        }
        let mut state = self.state.lock();
        if !state.busy {
            io.write(IrbRegister::TxIntClear, TX_INT_ALL);
            return;
        }

        if io.read(IrbRegister::TxIntStatus) & TX_INT_UNDERRUN != 0 {
            error!("transmit underrun!");
            io.write(IrbRegister::TxIntClear, TX_INT_UNDERRUN);
            io.write(IrbRegister::TxIntEnable, 0);
            io.write(IrbRegister::TxEnable, 0);
            state.idle();
            self.idle.notify_all();
            return;
        }

        if !state.finishing {
            let mut used = tx_fifo_used(io.read(IrbRegister::TxStatus));
            while used < TX_FIFO_DEPTH {
                if !state.load_next(io) {
                    break;
                }
                used = tx_fifo_used(io.read(IrbRegister::TxStatus));
            }
        }

        if state.finishing {
            Self::drain(io);
            io.write(IrbRegister::TxSymPeriod, 0);
            io.write(IrbRegister::TxOnTime, 0);
            Self::drain(io);
            io.write(IrbRegister::TxIntClear, TX_INT_ALL);
            io.write(IrbRegister::TxIntEnable, 0);
            io.write(IrbRegister::TxEnable, 0);
            debug!("TX disabled");
            state.idle();
            self.idle.notify_all();
        }
    }

    /// Switch the transmitter off and abandon any transmission.
    pub fn abort(&self, io: &dyn RegisterIo) {
        let mut state = self.state.lock();
        io.write(IrbRegister::TxIntClear, TX_INT_ALL);
        io.write(IrbRegister::TxIntEnable, 0);
        io.write(IrbRegister::TxEnable, 0);
        state.idle();
        self.idle.notify_all();
    }

    fn drain(io: &dyn RegisterIo) {
        for _ in 0..DRAIN_SPIN_LIMIT {
            if tx_fifo_used(io.read(IrbRegister::TxStatus)) == 0 {
                return;
            }
            std::hint::spin_loop();
        }
        warn!("TX FIFO did not drain");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimulatedIrb, TxSymbol};

    fn exact_clocks() -> TxClocks {
        TxClocks::calculate(15_200_000, 50)
    }

    fn bytes(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn test_disabled_and_bad_length() {
        let sim = SimulatedIrb::new();
        let signal = Signal::new();
        let tx = Transmitter::new(exact_clocks(), false);
        assert!(matches!(
            tx.write(&sim, &bytes(&[1000]), false, &signal),
            Err(LircError::OperationNotSupported { .. })
        ));

        let tx = Transmitter::new(exact_clocks(), true);
        assert!(matches!(
            tx.write(&sim, &[0, 1, 2], false, &signal),
            Err(LircError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_short_transmission() {
        let sim = SimulatedIrb::new();
        let signal = Signal::new();
        let tx = Transmitter::new(exact_clocks(), true);

        // 1000 µs mark, 1000 µs space, 500 µs mark
        let n = tx
            .write(&sim, &bytes(&[1000, 1000, 500]), false, &signal)
            .expect("write failed");
        assert_eq!(n, 12);
        assert!(tx.is_busy());
        assert_eq!(sim.peek(IrbRegister::TxEnable), 1);

        // Primed with the first symbol and the terminator
        sim.raise_tx_interrupt();
        tx.handle_interrupt(&sim);
        assert!(!tx.is_busy());
        assert_eq!(sim.peek(IrbRegister::TxEnable), 0);

        assert_eq!(
            sim.transmitted(),
            vec![
                TxSymbol { on_time: 39, period: 78 },
                TxSymbol { on_time: 20, period: 40 },
                TxSymbol { on_time: 0, period: 0 },
            ]
        );
    }

    #[test]
    fn test_long_transmission_refills() {
        let sim = SimulatedIrb::new();
        let signal = Signal::new();
        let tx = Transmitter::new(exact_clocks(), true);

        let values: Vec<u32> = (0..20).flat_map(|_| [500, 500]).collect();
        tx.write(&sim, &bytes(&values), false, &signal)
            .expect("write failed");

        for _ in 0..10 {
            if !tx.is_busy() {
                break;
            }
            sim.raise_tx_interrupt();
            tx.handle_interrupt(&sim);
        }
        assert!(!tx.is_busy());

        let sent = sim.transmitted();
        // 19 full symbols, the final one, and the zero symbol
        assert_eq!(sent.len(), 21);
        assert_eq!(sent[0], TxSymbol { on_time: 20, period: 40 });
        assert_eq!(sent[19], TxSymbol { on_time: 20, period: 40 });
        assert_eq!(sent[20], TxSymbol { on_time: 0, period: 0 });
    }

    #[test]
    fn test_nonblocking_while_busy() {
        let sim = SimulatedIrb::new();
        let signal = Signal::new();
        let tx = Transmitter::new(exact_clocks(), true);
        let data = bytes(&(0..40).map(|_| 500).collect::<Vec<_>>());
        tx.write(&sim, &data, false, &signal).expect("write failed");

        assert_eq!(tx.write(&sim, &data, true, &signal), Err(LircError::WouldBlock));

        signal.raise();
        assert_eq!(tx.write(&sim, &data, false, &signal), Err(LircError::Interrupted));
    }

    #[test]
    fn test_underrun_stops_transmission() {
        let sim = SimulatedIrb::new();
        let signal = Signal::new();
        let tx = Transmitter::new(exact_clocks(), true);
        let data = bytes(&(0..40).map(|_| 500).collect::<Vec<_>>());
        tx.write(&sim, &data, false, &signal).expect("write failed");

        sim.inject_tx_underrun();
        tx.handle_interrupt(&sim);
        assert!(!tx.is_busy());
        assert_eq!(sim.peek(IrbRegister::TxEnable), 0);
        assert!(tx.wait_idle(Duration::from_millis(1)));
    }

    #[test]
    fn test_symbol_cap() {
        let sim = SimulatedIrb::new();
        let signal = Signal::new();
        let tx = Transmitter::new(exact_clocks(), true);
        let data = bytes(&vec![500; 2 * MAX_SYMBOLS + 10]);
        assert_eq!(
            tx.write(&sim, &data, false, &signal),
            Ok(2 * MAX_SYMBOLS * 4)
        );
    }
}
