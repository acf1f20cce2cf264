//! Fuzz target for RingBuffer chunk writes and reads.
//!
//! Tests:
//! - Arbitrary chunk sizes and capacities
//! - Interleaved single, batch and record writes with reads
//! - FIFO order and length bookkeeping against a model queue

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lirc_core::RingBuffer;
use std::collections::VecDeque;

/// Fuzz input for write operations
#[derive(Debug, Arbitrary)]
struct WriteInput {
    /// Bytes per chunk (clamped to 1..=16)
    chunk_size: u8,
    /// Chunks the buffer holds (clamped to 1..=64)
    capacity: u8,
    operations: Vec<Op>,
}

#[derive(Debug, Arbitrary)]
enum Op {
    /// Write one chunk filled with a byte
    WriteOne(u8),
    /// Write several chunks atomically
    WriteN { count: u8, fill: u8 },
    /// Read one chunk
    ReadOne,
    /// Drop everything
    Clear,
}

fuzz_target!(|input: WriteInput| {
    let chunk_size = usize::from(input.chunk_size).clamp(1, 16);
    let capacity = usize::from(input.capacity).clamp(1, 64);
    let rb = match RingBuffer::new(chunk_size, capacity) {
        Ok(rb) => rb,
        Err(_) => return,
    };
    let mut model: VecDeque<Vec<u8>> = VecDeque::new();

    for op in input.operations.iter().take(256) {
        match op {
            Op::WriteOne(fill) => {
                let chunk = vec![*fill; chunk_size];
                let accepted = rb.write_one(&chunk);
                assert_eq!(accepted, model.len() < capacity);
                if accepted {
                    model.push_back(chunk);
                }
            }
            Op::WriteN { count, fill } => {
                let count = usize::from(*count % 8);
                let data = vec![*fill; count * chunk_size];
                let accepted = rb.write_n(&data);
                // All or nothing
                if count == 0 {
                    assert!(!accepted);
                } else if accepted {
                    for chunk in data.chunks(chunk_size) {
                        model.push_back(chunk.to_vec());
                    }
                } else {
                    assert!(model.len() + count > capacity);
                }
            }
            Op::ReadOne => {
                let mut dest = vec![0u8; chunk_size];
                let got = rb.read_one(&mut dest);
                match model.pop_front() {
                    Some(expected) => {
                        assert!(got);
                        assert_eq!(dest, expected);
                    }
                    None => assert!(!got),
                }
            }
            Op::Clear => {
                rb.clear();
                model.clear();
            }
        }
        assert_eq!(rb.len(), model.len());
        assert_eq!(rb.available(), capacity - model.len());
    }
});
