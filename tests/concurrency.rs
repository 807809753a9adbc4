#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Concurrency tests for the lock-free MPSC queue: no loss, no duplication,
//! per-producer FIFO, and signal discipline under racing producers.

use bridgelink::queue::{self, Signal};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PRODUCERS: u64 = 8;
const ITEMS_PER_PRODUCER: u64 = 1000;

fn tag(producer: u64, seq: u64) -> u64 {
    producer * ITEMS_PER_PRODUCER + seq
}

#[test]
fn concurrent_producers_no_loss_no_duplication() {
    let (tx, mut rx) = queue::channel::<u64>();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let tx = tx.clone();
            thread::spawn(move || {
                for seq in 0..ITEMS_PER_PRODUCER {
                    tx.send(tag(producer, seq));
                }
            })
        })
        .collect();

    let total = (PRODUCERS * ITEMS_PER_PRODUCER) as usize;
    let mut seen = HashSet::with_capacity(total);
    let mut last_seq = vec![None::<u64>; PRODUCERS as usize];

    while seen.len() < total {
        match rx.take_next() {
            Some(item) => {
                assert!(seen.insert(item), "duplicate item {item}");
                let producer = (item / ITEMS_PER_PRODUCER) as usize;
                let seq = item % ITEMS_PER_PRODUCER;
                // Per-producer order must survive the interleaving.
                if let Some(prev) = last_seq[producer] {
                    assert!(seq > prev, "producer {producer} reordered: {seq} after {prev}");
                }
                last_seq[producer] = Some(seq);
            }
            None => thread::yield_now(),
        }
    }

    for handle in handles {
        handle.join().expect("producer panicked");
    }

    // Full union, no gaps.
    assert_eq!(seen.len(), total);
    for producer in 0..PRODUCERS {
        for seq in 0..ITEMS_PER_PRODUCER {
            assert!(seen.contains(&tag(producer, seq)));
        }
    }
    assert!(rx.take_next().is_none());
}

#[test]
fn single_producer_order_is_send_order() {
    let (tx, mut rx) = queue::channel::<u64>();
    let producer = thread::spawn(move || {
        for i in 0..10_000u64 {
            tx.send(i);
        }
    });

    let mut expected = 0u64;
    while expected < 10_000 {
        match rx.take_next() {
            Some(item) => {
                assert_eq!(item, expected);
                expected += 1;
            }
            None => thread::yield_now(),
        }
    }
    producer.join().expect("producer panicked");
}

#[test]
fn signal_gated_consumer_drains_everything() {
    let (tx, mut rx) = queue::channel::<u64>();
    let signal = Arc::new(Signal::new());

    let handles: Vec<_> = (0..4u64)
        .map(|producer| {
            let tx = tx.clone();
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                for seq in 0..500 {
                    // The writer-loop contract: raise only on the
                    // empty -> non-empty transition.
                    if tx.send(producer * 500 + seq) {
                        signal.raise();
                    }
                }
            })
        })
        .collect();

    // Consumer mirrors the engine's writer loop: one wakeup, full drain.
    let mut seen = HashSet::new();
    while seen.len() < 2000 {
        if !signal.wait_timeout(Duration::from_secs(5)) {
            panic!("consumer starved with {} of 2000 items", seen.len());
        }
        while let Some(item) = rx.take_next() {
            assert!(seen.insert(item), "duplicate item {item}");
        }
    }

    for handle in handles {
        handle.join().expect("producer panicked");
    }
    assert_eq!(seen.len(), 2000);
}

#[test]
fn racing_producers_and_interleaved_drain() {
    // Consumer drains while producers are mid-burst, exercising the
    // tail-claimed-but-link-unpublished spin path.
    for _ in 0..20 {
        let (tx, mut rx) = queue::channel::<u64>();
        let handles: Vec<_> = (0..4u64)
            .map(|producer| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for seq in 0..100 {
                        tx.send(producer * 100 + seq);
                    }
                })
            })
            .collect();

        let mut count = 0;
        while count < 400 {
            if rx.take_next().is_some() {
                count += 1;
            }
        }
        for handle in handles {
            handle.join().expect("producer panicked");
        }
        assert!(rx.take_next().is_none());
    }
}
