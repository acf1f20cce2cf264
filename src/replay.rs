//! Feed a recorded receive FIFO capture through the STM backend.
//!
//! A capture is a JSON array of raw `[mark, period]` FIFO pairs as the IR
//! block reports them; a period of `0xFFFF` ends a command. The replay
//! registers the STM receiver over a [`SimulatedIrb`], opens it, pushes the
//! capture one command at a time through the interrupt path and reads back
//! the mode2 records a LIRC client would see.

use crate::config::{ConfigError, LircConfig};
use lirc_core::features::decode_records;
use lirc_core::{DeviceHandle, LircError, OpenOptions, Registry, ScdValue, TimingRecord};
use lirc_driver_stm::regs::RX_END_OF_SEQUENCE;
use lirc_driver_stm::{
    Clock, InterruptOutcome, ManualClock, RegisterIo, SimulatedIrb, StmLirc,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Replay errors.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Capture is not a JSON array of pairs
    #[error("Invalid capture: {0}")]
    Capture(#[from] serde_json::Error),

    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Device-level failure
    #[error("Device error: {0}")]
    Device(#[from] LircError),
}

/// One raw FIFO entry.
pub type RawPair = (u32, u32);

/// What a replay produced.
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    /// Records read from the device, in order
    pub records: Vec<TimingRecord>,
    /// Interrupt totals
    pub outcome: InterruptOutcome,
    /// Commands found in the capture
    pub commands: usize,
}

/// Parse a capture file's contents.
pub fn parse_capture(json: &str) -> Result<Vec<RawPair>, ReplayError> {
    Ok(serde_json::from_str(json)?)
}

/// Split a capture into commands, each ending with the sentinel period.
/// Trailing pairs without a sentinel form a final, unterminated command.
pub fn split_commands(pairs: &[RawPair]) -> Vec<&[RawPair]> {
    pairs
        .split_inclusive(|&(_, period)| period == RX_END_OF_SEQUENCE)
        .filter(|cmd| !cmd.is_empty())
        .collect()
}

/// Run `pairs` through a freshly registered STM receiver.
///
/// With `scd` set, the start code is armed and every command is reported
/// as matching it, so its records carry the synthesized prefix.
pub fn replay(
    config: &LircConfig,
    pairs: &[RawPair],
    scd: Option<ScdValue>,
) -> Result<ReplayReport, ReplayError> {
    config.validate()?;

    let registry = Registry::new(config.registry_config());
    let sim = Arc::new(SimulatedIrb::new());
    let clock = Arc::new(ManualClock::new(0));
    let stm = StmLirc::probe_with_clock(
        Arc::clone(&sim) as Arc<dyn RegisterIo>,
        config.stm.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    )?;
    let minor = stm.register(&registry)?;
    if let Some(value) = scd {
        stm.configure_scd(value)?;
    }

    let handle = registry.open_with(minor, OpenOptions::new().nonblocking(true))?;
    let commands = split_commands(pairs);
    let mut report = ReplayReport {
        commands: commands.len(),
        ..ReplayReport::default()
    };

    for command in &commands {
        if scd.is_some() {
            sim.detect_start_code(1);
        }
        sim.push_rx_sequence(command);
        report.outcome.merge(stm.handle_interrupt());
        drain(&handle, &mut report.records)?;

        // Sync spaces follow the captured command length
        let elapsed: u64 = command
            .iter()
            .map(|&(_, period)| u64::from(period))
            .sum();
        clock.advance(elapsed);
    }
    debug!(commands = commands.len(), records = report.records.len(), "Capture replayed");

    handle.close()?;
    stm.unregister(&registry)?;
    info!(
        delivered = report.outcome.delivered,
        dropped = report.outcome.dropped,
        overruns = report.outcome.overruns,
        "Replay finished"
    );
    Ok(report)
}

fn drain(handle: &DeviceHandle, records: &mut Vec<TimingRecord>) -> Result<(), LircError> {
    let mut chunk = [0u8; 256];
    loop {
        match handle.read(&mut chunk) {
            Ok(0) | Err(LircError::WouldBlock) => return Ok(()),
            Ok(n) => records.extend(decode_records(&chunk[..n])),
            Err(e) => return Err(e),
        }
    }
}
