//! Fuzz target for record batches across the ring buffer's wrap point.
//!
//! Tests:
//! - Batches that straddle the end/start boundary
//! - Record order after wrap-around
//! - Batches larger than the free space are rejected whole

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lirc_core::{LircT, RingBuffer};

#[derive(Debug, Arbitrary)]
struct WrapInput {
    /// Records consumed up front to move the read position
    initial_fill: u8,
    batches: Vec<(u8, bool)>,
}

const CAPACITY: usize = 32;

fuzz_target!(|input: WrapInput| {
    let rb = match RingBuffer::for_records(CAPACITY) {
        Ok(rb) => rb,
        Err(_) => return,
    };

    let fill = usize::from(input.initial_fill) % CAPACITY;
    let filler: Vec<LircT> = (0..fill as LircT).collect();
    if fill > 0 {
        assert!(rb.write_records(&filler));
        for _ in 0..fill {
            assert!(rb.read_record().is_some());
        }
    }

    let mut next: LircT = 0;
    let mut expected_front: LircT = 0;
    for &(size, drain) in input.batches.iter().take(64) {
        let size = usize::from(size) % (CAPACITY + 4);
        let batch: Vec<LircT> = (0..size as LircT).map(|i| next + i).collect();
        // Empty batches are refused
        let fits = size > 0 && size <= rb.available();
        assert_eq!(rb.write_records(&batch), fits);
        if fits {
            next += size as LircT;
        }

        if drain {
            while let Some(record) = rb.read_record() {
                assert_eq!(record, expected_front);
                expected_front += 1;
            }
            assert!(rb.is_empty());
        }
        assert!(rb.len() <= CAPACITY);
    }
});
