//! Fuzz target for start-code validation and prefix synthesis.
//!
//! Tests:
//! - Accepted codes expand to alternating records
//! - Prefix durations add up to code length times nominal time
//! - Merging into a received command keeps polarity alternating

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lirc_core::features::same_polarity;
use lirc_core::{ScdValue, PULSE_BIT, PULSE_MASK};
use lirc_driver_stm::scd::{code_length, prefix_symbols, validate, ScdFilter};
use lirc_driver_stm::SimulatedIrb;

#[derive(Debug, Arbitrary)]
struct ScdInput {
    code: u32,
    alt_code: u32,
    nominal_time: u16,
    first_pulse: u16,
}

fuzz_target!(|input: ScdInput| {
    let value = ScdValue {
        code: input.code,
        alt_code: input.alt_code,
        nominal_time: u32::from(input.nominal_time),
        noise_recovery: 1,
    };
    if validate(&value).is_err() {
        return;
    }

    let prefix = prefix_symbols(value.code, value.nominal_time);
    assert!(!prefix.is_empty());
    assert!(prefix.windows(2).all(|w| !same_polarity(w[0], w[1])));
    let total: u64 = prefix.iter().map(|r| u64::from(r & PULSE_MASK)).sum();
    assert_eq!(
        total,
        u64::from(code_length(value.code)) * u64::from(value.nominal_time)
    );

    let sim = SimulatedIrb::new();
    let mut filter = ScdFilter::new();
    if filter.configure(&sim, value, 100_000_000, true).is_err() {
        return;
    }
    if filter.set_enabled(&sim, true).is_err() {
        return;
    }

    let mut records = vec![u32::from(input.first_pulse) | PULSE_BIT, 500];
    let merged = filter.merge_prefix(&mut records);
    if let Some(&last) = merged.last() {
        assert!(!same_polarity(last, records[0]));
    }
});
