use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use threadring::Pool;

fn main() {
    println!("threadring work-stealing scheduler example");
    println!("============================================\n");

    let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    let pool: Pool<4096, 65536> = Pool::try_new(worker_count, false, true).expect("failed to start pool");

    const TASKS: u64 = 2_000_000;

    println!("Configuration:");
    println!("  Workers: {}", worker_count);
    println!("  Tasks: {}\n", TASKS);

    let start = Instant::now();
    let counter = Arc::new(AtomicU64::new(0));
    let mut tokens = Vec::with_capacity(TASKS as usize);
    for i in 0..TASKS {
        let counter = Arc::clone(&counter);
        tokens.push(pool.submit(move || {
            // A small amount of busywork so stealing actually matters.
            let _ = (i as u64).wrapping_mul(2654435761);
            counter.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for token in &tokens {
        token.wait();
    }
    let duration = start.elapsed();

    let metrics = pool.metrics();

    println!("Results:");
    println!("  Tasks completed: {}", counter.load(Ordering::Relaxed));
    println!("  Active workers at drain: {}", pool.stats().actives());
    println!("  Duration: {:.2?}", duration);
    println!(
        "  Throughput: {:.2} million tasks/sec",
        TASKS as f64 / duration.as_secs_f64() / 1_000_000.0
    );
    println!(
        "  Steals: {}/{} succeeded",
        metrics.steals_succeeded, metrics.steals_attempted
    );
    println!("  Worker parks: {}", metrics.worker_parks);
}
