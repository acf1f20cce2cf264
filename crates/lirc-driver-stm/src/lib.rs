//! `lirc-driver-stm`
//!
//! Backend for the STMicroelectronics IR block (IRB). The receiver turns the
//! block's mark/period FIFO into mode2 timing records, optionally prefixed
//! with the start code the hardware filter matched. The transmitter streams
//! pulse/space sequences through the TX FIFO on a 38 kHz carrier.
//!
//! All register traffic goes through [`RegisterIo`]; [`SimulatedIrb`] is an
//! in-memory register bank for tests and replays.
//!
//! ## Example
//!
//! ```rust
//! use lirc_core::Registry;
//! use lirc_driver_stm::{RegisterIo, SimulatedIrb, StmLirc, StmPlatformData};
//! use std::sync::Arc;
//!
//! # fn main() -> lirc_core::Result<()> {
//! let sim = Arc::new(SimulatedIrb::new());
//! let stm = StmLirc::probe(Arc::clone(&sim) as Arc<dyn RegisterIo>, StmPlatformData::default())?;
//! let registry = Registry::default();
//! let minor = stm.register(&registry)?;
//! let handle = registry.open(minor)?;
//!
//! // 560 µs pulse, 560 µs space, end of command
//! sim.push_rx_sequence(&[(560, 1120), (560, 0xffff)]);
//! assert_eq!(stm.handle_interrupt().delivered, 1);
//! drop(handle);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod driver;
pub mod platform;
pub mod pm;
pub mod regs;
pub mod rx;
pub mod scd;
pub mod sim;
pub mod tx;

pub use clock::{RxClocks, TxClocks, RX_SAMPLING_HZ, TX_CARRIER_HZ};
pub use driver::{spawn_irq_handler, IrqHandler, IrqLine, StmLirc, STM_MINOR, STM_NAME};
pub use platform::StmPlatformData;
pub use regs::{IrbRegister, RegisterIo};
pub use rx::{Clock, InterruptOutcome, ManualClock, RxDecoder, SystemClock, MAX_SYMBOLS};
pub use scd::{ScdFilter, ScdFlags, SCD_MAX_SYMBOLS};
pub use sim::{SimulatedIrb, TxSymbol};
pub use tx::Transmitter;
