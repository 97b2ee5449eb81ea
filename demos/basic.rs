use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use threadring::{ExecutionPolicy, RingBuffer};

fn main() {
    println!("threadring basic ring example");
    println!("==============================\n");

    let ring: Arc<RingBuffer<u64, 65536>> = Arc::new(RingBuffer::new(ExecutionPolicy::Parallel));

    const PRODUCERS: usize = 4;
    const ITEMS_PER_PRODUCER: usize = 1_000_000;
    const TOTAL: usize = PRODUCERS * ITEMS_PER_PRODUCER;

    println!("Configuration:");
    println!("  Producers: {}", PRODUCERS);
    println!("  Items per producer: {}", ITEMS_PER_PRODUCER);
    println!("  Total items: {}\n", TOTAL);

    let start = Instant::now();

    let mut handles = Vec::with_capacity(PRODUCERS);
    for id in 0..PRODUCERS {
        let ring = Arc::clone(&ring);
        handles.push(thread::spawn(move || {
            for i in 0..ITEMS_PER_PRODUCER {
                ring.push((id * ITEMS_PER_PRODUCER + i) as u64);
            }
            println!("producer {id} finished");
        }));
    }

    let sum = Arc::new(AtomicU64::new(0));
    let consumer = {
        let ring = Arc::clone(&ring);
        let sum = Arc::clone(&sum);
        thread::spawn(move || {
            let mut consumed = 0usize;
            while consumed < TOTAL {
                let (mut it, _end) = ring.consume(4096);
                let mut this_batch = 0;
                while let Some(slot) = unsafe { it.next_slot() } {
                    sum.fetch_add(unsafe { slot.take() }, Ordering::Relaxed);
                    this_batch += 1;
                }
                consumed += this_batch;
                if this_batch == 0 {
                    thread::yield_now();
                }
            }
            consumed
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    let consumed = consumer.join().unwrap();
    let duration = start.elapsed();

    println!("\nResults:");
    println!("  Items consumed: {}", consumed);
    println!("  Sum: {}", sum.load(Ordering::Relaxed));
    println!("  Duration: {:.2?}", duration);
    println!(
        "  Throughput: {:.2} million items/sec",
        consumed as f64 / duration.as_secs_f64() / 1_000_000.0
    );
}
