//! `lirc-replay`: print the mode2 records a LIRC client would read for a
//! captured IR block receive FIFO.
//!
//! # Usage
//!
//! ```bash
//! lirc-replay capture.json
//! lirc-replay --config lirc.toml --scd-code 0xd --scd-nominal 500 capture.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use lirc::logging::{self, OutputFormat, TracingConfig};
use lirc::{replay, LircConfig};
use lirc_core::ScdValue;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lirc-replay")]
#[command(about = "Replay an IR receive FIFO capture through the STM LIRC backend", long_about = None)]
struct Cli {
    /// JSON array of raw [mark, period] FIFO pairs
    #[arg(required_unless_present = "print_config")]
    capture: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level, overriding the configuration
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, default_value = "compact")]
    format: OutputFormat,

    /// Arm start-code detection with this code (decimal or 0x hex)
    #[arg(long, value_parser = parse_u32)]
    scd_code: Option<u32>,

    /// Nominal start-code symbol time in µs
    #[arg(long, default_value_t = 500)]
    scd_nominal: u32,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("'{}': {}", s, e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LircConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LircConfig::from_env().context("loading configuration")?,
    };
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }
    let Some(capture) = cli.capture else {
        anyhow::bail!("no capture file given");
    };

    let level = logging::parse_log_level(&config.application.log_level)
        .map_err(anyhow::Error::msg)?;
    logging::init(TracingConfig::new(level).with_format(cli.format))
        .map_err(anyhow::Error::msg)?;

    let scd = cli.scd_code.map(|code| {
        // Start-code detection needs the UHF receive bank
        config.stm.rx_uhf_mode = true;
        ScdValue {
            code,
            alt_code: 0,
            nominal_time: cli.scd_nominal,
            noise_recovery: 0,
        }
    });

    let text = std::fs::read_to_string(&capture)
        .with_context(|| format!("reading {}", capture.display()))?;
    let pairs = lirc::replay::parse_capture(&text)
        .with_context(|| format!("parsing {}", capture.display()))?;

    let report = replay(&config, &pairs, scd).context("replay failed")?;
    for record in &report.records {
        println!("{}", record);
    }
    eprintln!(
        "{} commands: {} delivered, {} dropped, {} overruns",
        report.commands,
        report.outcome.delivered,
        report.outcome.dropped,
        report.outcome.overruns
    );
    Ok(())
}
