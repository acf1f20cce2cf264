//! Criterion benchmarks for the record ring buffer and the receive path.
//!
//! Key metrics:
//! - Batch write throughput for command-sized record runs
//! - Chunk read latency
//! - Producer/consumer throughput across threads
//! - One receive interrupt decoding a full command
//!
//! Run with: cargo bench --bench ring_buffer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lirc_core::{LircT, RingBuffer, PULSE_BIT};
use lirc_driver_stm::{RegisterIo, SimulatedIrb, StmLirc, StmPlatformData};
use std::sync::Arc;
use std::thread;

/// Write a command's worth of records, then drain it.
fn ring_buffer_write_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer_write");

    // Typical remote commands: RC-5, NEC, and a long air-conditioner frame
    let sizes = [("rc5", 28), ("nec", 68), ("long", 200)];

    for (name, records) in sizes {
        let rb = RingBuffer::for_records(256).unwrap();
        let batch: Vec<LircT> = (0..records)
            .map(|i| if i % 2 == 0 { 560 | PULSE_BIT } else { 560 })
            .collect();

        group.throughput(Throughput::Elements(records as u64));
        group.bench_with_input(BenchmarkId::new("write_records", name), &batch, |b, batch| {
            b.iter(|| {
                assert!(rb.write_records(black_box(batch)));
                rb.clear();
            });
        });
    }

    group.finish();
}

/// Read single records out of a filled buffer.
fn ring_buffer_read(c: &mut Criterion) {
    let rb = RingBuffer::for_records(256).unwrap();
    let batch = vec![560u32; 200];

    c.bench_function("ring_buffer_read_record", |b| {
        b.iter(|| {
            if rb.is_empty() {
                rb.write_records(&batch);
            }
            black_box(rb.read_record());
        });
    });

    let mut chunk = [0u8; 4];
    c.bench_function("ring_buffer_read_one", |b| {
        b.iter(|| {
            if rb.is_empty() {
                rb.write_records(&batch);
            }
            black_box(rb.read_one(&mut chunk));
        });
    });
}

/// One producer thread and one consumer thread moving records.
fn ring_buffer_producer_consumer(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer_concurrent");
    let total = 10_000usize;
    group.throughput(Throughput::Elements(total as u64));

    group.bench_function("producer_consumer", |b| {
        b.iter(|| {
            let rb = Arc::new(RingBuffer::for_records(256).unwrap());
            let producer_rb = Arc::clone(&rb);
            let producer = thread::spawn(move || {
                let mut sent = 0;
                while sent < total {
                    if producer_rb.write_records(&[sent as LircT]) {
                        sent += 1;
                    } else {
                        thread::yield_now();
                    }
                }
            });

            let mut received = 0;
            while received < total {
                if rb.read_record().is_some() {
                    received += 1;
                } else {
                    thread::yield_now();
                }
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

/// Decode one NEC-like command through the STM receive interrupt.
fn stm_receive_interrupt(c: &mut Criterion) {
    let sim = Arc::new(SimulatedIrb::new());
    let stm = StmLirc::probe(
        Arc::clone(&sim) as Arc<dyn RegisterIo>,
        StmPlatformData::default(),
    )
    .unwrap();

    let mut command: Vec<(u32, u32)> = vec![(9000, 13500)];
    command.extend((0..32).map(|i| if i % 3 == 0 { (560, 2250) } else { (560, 1120) }));
    command.push((560, 0xffff));

    c.bench_function("stm_rx_interrupt", |b| {
        b.iter(|| {
            sim.push_rx_sequence(&command);
            black_box(stm.handle_interrupt());
            stm.buffer().clear();
        });
    });
}

criterion_group!(
    benches,
    ring_buffer_write_batch,
    ring_buffer_read,
    ring_buffer_producer_consumer,
    stm_receive_interrupt
);
criterion_main!(benches);
