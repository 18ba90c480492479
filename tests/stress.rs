//! Stress tests for siper memory reclamation.
//!
//! These push the registry and retire lists hard to surface races between
//! publication, retirement, and scanning.

use siper::{collect, pin, retire, Atomic, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

struct StressNode {
    value: usize,
}

impl StressNode {
    fn new(value: usize) -> *mut Self {
        Box::into_raw(Box::new(Self { value }))
    }
}

fn cleanup(atomic: &Atomic<StressNode>) {
    let guard = pin();
    let old = atomic.swap(Shared::null(), Ordering::AcqRel, &guard);
    drop(guard);
    if !old.is_null() {
        unsafe { retire(old.as_raw()) };
    }
    collect();
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_high_contention() {
    const NUM_THREADS: usize = 16;
    const ITERATIONS: usize = 50_000;

    let atomic = Arc::new(Atomic::new(StressNode::new(0)));
    let ops_count = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    let start = Instant::now();

    for tid in 0..NUM_THREADS {
        let atomic = atomic.clone();
        let ops_count = ops_count.clone();

        handles.push(thread::spawn(move || {
            for i in 0..ITERATIONS {
                let new_node = StressNode::new(tid * ITERATIONS + i);

                let guard = pin();
                let new = unsafe { Shared::from_raw(new_node) };
                let old = atomic.swap(new, Ordering::AcqRel, &guard);
                drop(guard);

                if !old.is_null() {
                    unsafe { retire(old.as_raw()) };
                }

                ops_count.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let total_ops = ops_count.load(Ordering::Relaxed);
    assert_eq!(total_ops, NUM_THREADS * ITERATIONS);

    println!("High contention test:");
    println!("  {} operations in {:?}", total_ops, elapsed);
    println!(
        "  Throughput: {:.0} ops/sec",
        total_ops as f64 / elapsed.as_secs_f64()
    );

    cleanup(&atomic);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_read_heavy_workload() {
    // 95% reads, 5% writes
    const NUM_THREADS: usize = 8;
    const ITERATIONS: usize = 100_000;
    const WRITE_RATIO: usize = 20;

    let atomic = Arc::new(Atomic::new(StressNode::new(0)));
    let mut handles = vec![];

    for tid in 0..NUM_THREADS {
        let atomic = atomic.clone();

        handles.push(thread::spawn(move || {
            let mut checksum = 0usize;
            for i in 0..ITERATIONS {
                let guard = pin();

                if i % WRITE_RATIO == 0 {
                    let new_node = StressNode::new(tid * ITERATIONS + i);
                    let new = unsafe { Shared::from_raw(new_node) };
                    let old = atomic.swap(new, Ordering::AcqRel, &guard);
                    drop(guard);
                    if !old.is_null() {
                        unsafe { retire(old.as_raw()) };
                    }
                } else {
                    let ptr = atomic.protect(&guard, 0);
                    if let Some(node) = unsafe { ptr.as_ref() } {
                        // Touch the payload; a reclaimed node here would be
                        // a use-after-free under sanitizers.
                        checksum = checksum.wrapping_add(node.value);
                    }
                    drop(guard);
                }
            }
            checksum
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    cleanup(&atomic);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_random_op_mix() {
    // Threads pick operations at random so protect, swap/retire, and forced
    // scans interleave in orders the fixed-ratio tests never produce.
    use rand::Rng;

    const NUM_THREADS: usize = 8;
    const ITERATIONS: usize = 20_000;
    const MARKER: usize = 0xBEEF;

    let atomic = Arc::new(Atomic::new(StressNode::new(MARKER)));
    let mut handles = vec![];

    for _ in 0..NUM_THREADS {
        let atomic = atomic.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut checksum = 0usize;
            for _ in 0..ITERATIONS {
                match rng.gen_range(0..10) {
                    0..=5 => {
                        let guard = pin();
                        let ptr = atomic.protect(&guard, 0);
                        if let Some(node) = unsafe { ptr.as_ref() } {
                            assert_eq!(node.value, MARKER, "torn or reclaimed payload");
                            checksum = checksum.wrapping_add(node.value);
                        }
                    }
                    6..=8 => {
                        let guard = pin();
                        let new = unsafe { Shared::from_raw(StressNode::new(MARKER)) };
                        let old = atomic.swap(new, Ordering::AcqRel, &guard);
                        drop(guard);
                        if !old.is_null() {
                            unsafe { retire(old.as_raw()) };
                        }
                    }
                    _ => collect(),
                }
            }
            checksum
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    cleanup(&atomic);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_protect_swap_interleave() {
    // Readers continuously protect while one writer swaps as fast as it can;
    // every protected dereference must observe an intact payload.
    const READERS: usize = 6;
    const SWAPS: usize = 100_000;
    const MARKER: usize = 0xC0FFEE;

    let atomic = Arc::new(Atomic::new(StressNode::new(MARKER)));
    let done = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for _ in 0..READERS {
        let atomic = atomic.clone();
        let done = done.clone();
        handles.push(thread::spawn(move || {
            while done.load(Ordering::Acquire) == 0 {
                let guard = pin();
                let ptr = atomic.protect(&guard, 0);
                if let Some(node) = unsafe { ptr.as_ref() } {
                    assert_eq!(node.value, MARKER, "torn or reclaimed payload");
                }
            }
        }));
    }

    let writer = {
        let atomic = atomic.clone();
        let done = done.clone();
        thread::spawn(move || {
            for _ in 0..SWAPS {
                let guard = pin();
                let new = unsafe { Shared::from_raw(StressNode::new(MARKER)) };
                let old = atomic.swap(new, Ordering::AcqRel, &guard);
                drop(guard);
                if !old.is_null() {
                    unsafe { retire(old.as_raw()) };
                }
            }
            done.store(1, Ordering::Release);
        })
    };

    writer.join().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }

    cleanup(&atomic);
}
