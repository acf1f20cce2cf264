//! In-memory IR block.
//!
//! Behaves like the hardware as far as the driver can observe it:
//!
//! - the receive FIFO holds `(mark, period)` pairs; reading `RxSys` pops the
//!   head and latches its mark for the following `RxOn` read
//! - an injected overrun shows in `RxStatus`/`RxIntStatus` until cleared
//! - `ScdCode` reads back what was written, unless the block models broken
//!   silicon; re-arming the filter clears `ScdStatus`
//! - each `TxOnTime`/`TxSymPeriod` pair enters the transmit FIFO, and every
//!   `TxStatus` read lets the transmitter emit one queued symbol

use crate::regs::{
    IrbRegister, RegisterIo, RX_OVERRUN, SCD_CFG_ENABLE, SCD_CFG_RESTART, TX_FIFO_DEPTH,
    TX_INT_PENDING, TX_INT_UNDERRUN,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// One symbol emitted by the simulated transmitter, in carrier cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSymbol {
    /// Carrier-on cycles
    pub on_time: u32,
    /// Total symbol cycles
    pub period: u32,
}

#[derive(Debug, Default)]
struct SimState {
    regs: HashMap<IrbRegister, u32>,
    rx_fifo: VecDeque<(u32, u32)>,
    rx_latched_mark: u32,
    rx_overrun: bool,
    broken_scd: bool,
    tx_on_time: Option<u32>,
    tx_period: Option<u32>,
    tx_fifo: VecDeque<TxSymbol>,
    tx_sent: Vec<TxSymbol>,
    tx_int_status: u32,
}

impl SimState {
    fn reg(&self, reg: IrbRegister) -> u32 {
        self.regs.get(&reg).copied().unwrap_or(0)
    }

    fn queue_tx_half(&mut self) {
        if let (Some(on_time), Some(period)) = (self.tx_on_time, self.tx_period) {
            self.tx_on_time = None;
            self.tx_period = None;
            self.tx_fifo.push_back(TxSymbol { on_time, period });
        }
    }
}

/// Simulated IR block register bank.
#[derive(Debug, Default)]
pub struct SimulatedIrb {
    state: Mutex<SimState>,
}

impl SimulatedIrb {
    /// Block with every register zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block whose start-code register corrupts the read-back value.
    pub fn with_broken_scd() -> Self {
        let sim = Self::default();
        sim.state.lock().broken_scd = true;
        sim
    }

    /// Queue one received `(mark, period)` pair in raw sampling units.
    pub fn push_rx(&self, mark: u32, period: u32) {
        self.state.lock().rx_fifo.push_back((mark, period));
    }

    /// Queue several received pairs.
    pub fn push_rx_sequence(&self, pairs: &[(u32, u32)]) {
        self.state.lock().rx_fifo.extend(pairs.iter().copied());
    }

    /// Pairs still waiting in the receive FIFO.
    pub fn rx_pending(&self) -> usize {
        self.state.lock().rx_fifo.len()
    }

    /// Flag a receive FIFO overrun.
    pub fn inject_overrun(&self) {
        self.state.lock().rx_overrun = true;
    }

    /// Report a start-code detection (bit 0 primary, bit 1 alternative).
    pub fn detect_start_code(&self, status: u32) {
        self.state.lock().regs.insert(IrbRegister::ScdStatus, status);
    }

    /// Raise the transmit interrupt.
    pub fn raise_tx_interrupt(&self) {
        self.state.lock().tx_int_status |= TX_INT_PENDING;
    }

    /// Raise the transmit interrupt with an underrun.
    pub fn inject_tx_underrun(&self) {
        self.state.lock().tx_int_status |= TX_INT_PENDING | TX_INT_UNDERRUN;
    }

    /// Symbols the transmitter has emitted so far, FIFO contents included.
    pub fn transmitted(&self) -> Vec<TxSymbol> {
        let state = self.state.lock();
        state
            .tx_sent
            .iter()
            .chain(state.tx_fifo.iter())
            .copied()
            .collect()
    }

    /// Current register value, without side effects.
    pub fn peek(&self, reg: IrbRegister) -> u32 {
        self.state.lock().reg(reg)
    }
}

impl RegisterIo for SimulatedIrb {
    fn read(&self, reg: IrbRegister) -> u32 {
        let mut state = self.state.lock();
        match reg {
            IrbRegister::RxStatus => {
                let words = state.rx_fifo.len().min(0xff) as u32;
                let overrun = if state.rx_overrun { RX_OVERRUN } else { 0 };
                (words << 8) | overrun
            }
            IrbRegister::RxIntStatus => {
                let overrun = if state.rx_overrun { RX_OVERRUN } else { 0 };
                state.reg(reg) | overrun
            }
            IrbRegister::RxSys => match state.rx_fifo.pop_front() {
                Some((mark, period)) => {
                    state.rx_latched_mark = mark;
                    period
                }
                None => {
                    state.rx_latched_mark = 0;
                    0
                }
            },
            IrbRegister::RxOn => state.rx_latched_mark,
            IrbRegister::ScdCode if state.broken_scd => state.reg(reg) ^ 0x5a5a_5a5a,
            IrbRegister::TxIntStatus => state.tx_int_status,
            IrbRegister::TxStatus => {
                let used = state.tx_fifo.len().min(TX_FIFO_DEPTH as usize) as u32;
                // The transmitter drains one symbol per status poll
                if let Some(symbol) = state.tx_fifo.pop_front() {
                    state.tx_sent.push(symbol);
                }
                used << 8
            }
            _ => state.reg(reg),
        }
    }

    fn write(&self, reg: IrbRegister, value: u32) {
        let mut state = self.state.lock();
        match reg {
            IrbRegister::RxIntClear => {
                if value & RX_OVERRUN != 0 {
                    state.rx_overrun = false;
                }
            }
            IrbRegister::ScdConfig => {
                if value & (SCD_CFG_ENABLE | SCD_CFG_RESTART) != 0 {
                    state.regs.insert(IrbRegister::ScdStatus, 0);
                }
                state.regs.insert(reg, value);
            }
            IrbRegister::TxOnTime => {
                state.tx_on_time = Some(value);
                state.queue_tx_half();
            }
            IrbRegister::TxSymPeriod => {
                state.tx_period = Some(value);
                state.queue_tx_half();
            }
            IrbRegister::TxIntClear => {
                state.tx_int_status &= !value;
            }
            _ => {
                state.regs.insert(reg, value);
            }
        }
    }
}
