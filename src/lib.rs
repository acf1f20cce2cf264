//! # LIRC
//!
//! Infrared remote-control device support: a generic character-device core
//! ([`lirc_core`]) and the STMicroelectronics IR block backend
//! ([`lirc_driver_stm`]). This crate ties them to an application:
//!
//! - **`config`**: [`LircConfig`] loaded from TOML plus `LIRC_` environment
//!   variables with figment
//! - **`logging`**: `tracing-subscriber` setup driven by the configuration
//! - **`replay`**: runs a recorded FIFO capture through the STM receiver,
//!   the engine behind the `lirc-replay` binary

pub mod config;
pub mod logging;
pub mod replay;

pub use config::{ConfigError, LircConfig};
pub use lirc_core;
pub use lirc_driver_stm;
pub use replay::{replay, ReplayError, ReplayReport};
