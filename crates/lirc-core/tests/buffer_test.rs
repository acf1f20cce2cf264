//! Ring buffer concurrency properties.

use lirc_core::{LircError, RingBuffer};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_fifo_and_capacity_under_random_ops() {
    let mut rng = rand::thread_rng();
    let rb = RingBuffer::new(3, 5).expect("buffer");
    let mut model: VecDeque<[u8; 3]> = VecDeque::new();
    let mut next = 0u8;

    for _ in 0..2_000 {
        if rng.gen_bool(0.55) {
            let count = rng.gen_range(1..=3);
            let chunks: Vec<[u8; 3]> = (0..count)
                .map(|_| {
                    next = next.wrapping_add(1);
                    [next, next, next]
                })
                .collect();
            let bytes: Vec<u8> = chunks.iter().flatten().copied().collect();
            let fits = model.len() + count <= rb.capacity();
            assert_eq!(rb.write_n(&bytes), fits);
            if fits {
                model.extend(chunks);
            }
        } else {
            let mut out = [0u8; 3];
            let popped = rb.read_one(&mut out);
            match model.pop_front() {
                Some(expected) => {
                    assert!(popped);
                    assert_eq!(out, expected);
                }
                None => assert!(!popped),
            }
        }
        assert!(rb.len() <= rb.capacity());
        assert_eq!(rb.len(), model.len());
        assert_eq!(rb.available(), rb.capacity() - model.len());
    }
}

#[test]
fn test_no_lost_wakeup() {
    let mut rng = rand::thread_rng();
    for round in 0..50u8 {
        let rb = Arc::new(RingBuffer::new(1, 4).expect("buffer"));
        let reader_delay = Duration::from_micros(rng.gen_range(0..500));
        let writer_delay = Duration::from_micros(rng.gen_range(0..500));

        let reader = {
            let rb = Arc::clone(&rb);
            thread::spawn(move || {
                thread::sleep(reader_delay);
                let mut dest = [0u8; 1];
                rb.read_wait(&mut dest, false, || Ok(())).map(|n| (n, dest[0]))
            })
        };

        thread::sleep(writer_delay);
        assert!(rb.write_one(&[round]));

        let result = reader.join().expect("reader panicked");
        assert_eq!(result, Ok((1, round)));
    }
}

#[test]
fn test_read_wait_nonblocking_empty() {
    let rb = RingBuffer::new(4, 2).expect("buffer");
    let mut dest = [0u8; 4];
    assert_eq!(rb.read_wait(&mut dest, true, || Ok(())), Err(LircError::WouldBlock));
}

#[test]
fn test_clear_does_not_wake_reader() {
    let rb = Arc::new(RingBuffer::new(1, 4).expect("buffer"));
    let reader = {
        let rb = Arc::clone(&rb);
        thread::spawn(move || {
            let mut dest = [0u8; 1];
            rb.read_wait(&mut dest, false, || Ok(())).map(|_| dest[0])
        })
    };

    thread::sleep(Duration::from_millis(20));
    rb.clear();
    thread::sleep(Duration::from_millis(20));
    assert!(!reader.is_finished());

    assert!(rb.write_one(&[42]));
    assert_eq!(reader.join().expect("reader panicked"), Ok(42));
}

#[test]
fn test_woken_reader_takes_data_before_recheck() {
    let rb = Arc::new(RingBuffer::new(4, 4).expect("buffer"));
    let checks = Arc::new(AtomicUsize::new(0));

    let reader = {
        let rb = Arc::clone(&rb);
        let checks = Arc::clone(&checks);
        thread::spawn(move || {
            let mut dest = [0u8; 4];
            // Passes before sleeping, fails afterwards (device detached)
            let n = rb.read_wait(&mut dest, false, || {
                if checks.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(())
                } else {
                    Err(LircError::NoDevice { minor: 0 })
                }
            })?;
            Ok::<_, LircError>((n, dest))
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert!(rb.write_one(&[7, 7, 7, 7]));

    let (n, dest) = reader
        .join()
        .expect("reader panicked")
        .expect("read failed");
    assert_eq!(n, 4);
    assert_eq!(dest, [7, 7, 7, 7]);
    assert!(checks.load(Ordering::SeqCst) <= 1);
}
