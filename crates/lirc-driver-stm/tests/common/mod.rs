//! Fixtures shared by the STM backend integration tests.

#![allow(dead_code)]

use lirc_core::features::decode_records;
use lirc_core::{DeviceHandle, Registry, ScdValue, TimingRecord};
use lirc_driver_stm::{Clock, ManualClock, RegisterIo, SimulatedIrb, StmLirc, StmPlatformData};
use std::sync::Arc;

/// A probed and registered STM backend over a simulated block.
pub struct Bench {
    pub sim: Arc<SimulatedIrb>,
    pub clock: Arc<ManualClock>,
    pub stm: Arc<StmLirc>,
    pub registry: Registry,
    pub minor: usize,
}

/// IR receive mode, exact 100 MHz clock.
pub fn ir_platform() -> StmPlatformData {
    StmPlatformData::default()
}

/// UHF receive mode, where start-code detection is available.
pub fn uhf_platform() -> StmPlatformData {
    StmPlatformData {
        rx_uhf_mode: true,
        ..StmPlatformData::default()
    }
}

pub fn scd_value(code: u32, alt_code: u32, nominal_time: u32) -> ScdValue {
    ScdValue {
        code,
        alt_code,
        nominal_time,
        noise_recovery: 0,
    }
}

pub fn bench(platform: StmPlatformData) -> Bench {
    bench_on(Arc::new(SimulatedIrb::new()), platform)
}

pub fn bench_on(sim: Arc<SimulatedIrb>, platform: StmPlatformData) -> Bench {
    let clock = Arc::new(ManualClock::new(0));
    let stm = StmLirc::probe_with_clock(
        Arc::clone(&sim) as Arc<dyn RegisterIo>,
        platform,
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .expect("probe failed");
    let registry = Registry::default();
    let minor = stm.register(&registry).expect("register failed");
    Bench {
        sim,
        clock,
        stm,
        registry,
        minor,
    }
}

impl Bench {
    pub fn open(&self) -> DeviceHandle {
        let mut handle = self.registry.open(self.minor).expect("open failed");
        handle.set_nonblocking(true);
        handle
    }

    /// Queue one command as raw `(mark, period)` pairs, sentinel appended.
    pub fn receive(&self, symbols: &[(u32, u32)]) {
        let mut pairs = symbols.to_vec();
        if let Some(last) = pairs.last_mut() {
            last.1 = 0xffff;
        }
        self.sim.push_rx_sequence(&pairs);
    }

    /// Let the transmitter run until it goes idle.
    pub fn run_transmitter(&self) {
        for _ in 0..1000 {
            if !self.stm.transmitter().is_busy() {
                return;
            }
            self.sim.raise_tx_interrupt();
            self.stm.handle_interrupt();
        }
        panic!("transmitter never went idle");
    }
}

/// Read every queued record without blocking.
pub fn read_all(handle: &DeviceHandle) -> Vec<TimingRecord> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 64];
    while let Ok(n) = handle.read(&mut chunk) {
        if n == 0 {
            break;
        }
        out.extend(decode_records(&chunk[..n]));
    }
    out
}
