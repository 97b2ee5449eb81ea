//! End-to-end scenarios exercising the ring buffer, tokens, and scheduler
//! together, rather than one module in isolation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use threadring::{spawn, spawn_repeat, ExecutionPolicy, Pool, RingBuffer, Token};

#[test]
fn push_consume_single() {
    use threadring::TaskCell;

    let ring: RingBuffer<TaskCell, 2> = RingBuffer::new(ExecutionPolicy::Parallel);
    assert_eq!(ring.max_size(), 1);

    let flag = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&flag);
    let token = ring.push_fn(move || {
        f.store(1, Ordering::SeqCst);
    });
    assert_eq!(ring.size(), 1);

    let ran = ring.execute(1);
    assert_eq!(ran, 1);

    assert_eq!(flag.load(Ordering::SeqCst), 1);
    assert_eq!(ring.size(), 0);
    assert!(token.done());
}

#[test]
fn wrap_around_512_iterations() {
    use threadring::TaskCell;

    let ring: RingBuffer<TaskCell, 256> = RingBuffer::new(ExecutionPolicy::Parallel);
    let counter = Arc::new(AtomicUsize::new(0));
    let mut tokens = Vec::with_capacity(512);
    for _ in 0..512 {
        let c = Arc::clone(&counter);
        tokens.push(ring.push_fn(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        ring.execute(1);
    }
    for token in &tokens {
        assert!(token.done());
    }
    assert_eq!(counter.load(Ordering::SeqCst), 512);
}

#[test]
fn multi_producer_fifo() {
    const TOTAL: usize = 1 << 16;
    const PRODUCERS: usize = 5;
    let ring: Arc<RingBuffer<usize, { 1 << 20 }>> = Arc::new(RingBuffer::new(ExecutionPolicy::Parallel));
    let seen = Arc::new(Mutex::new(Vec::with_capacity(TOTAL)));

    std::thread::scope(|s| {
        for producer_id in 0..PRODUCERS {
            let ring = Arc::clone(&ring);
            s.spawn(move || {
                for _ in 0..(TOTAL / PRODUCERS) {
                    ring.push(producer_id);
                }
            });
        }
        let ring = Arc::clone(&ring);
        let seen = Arc::clone(&seen);
        s.spawn(move || {
            let mut done = 0;
            while done < TOTAL {
                let (mut it, _end) = ring.consume(TOTAL);
                while let Some(slot) = unsafe { it.next_slot() } {
                    let id = unsafe { slot.take() };
                    seen.lock().unwrap().push(id);
                    done += 1;
                }
            }
        });
    });

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), TOTAL);
    let mut counts = [0usize; PRODUCERS];
    for &id in seen.iter() {
        counts[id] += 1;
    }
    for count in counts {
        assert_eq!(count, TOTAL / PRODUCERS);
    }
}

#[test]
fn sequential_policy_ordering() {
    use threadring::TaskCell;

    let ring: RingBuffer<TaskCell, 32> = RingBuffer::new(ExecutionPolicy::Sequential);
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..31u32 {
        let order = Arc::clone(&order);
        ring.push_fn(move || {
            order.lock().unwrap().push(i);
        });
    }
    let ran = ring.execute(31);
    assert_eq!(ran, 31);
    assert_eq!(*order.lock().unwrap(), (0..31).collect::<Vec<_>>());
}

#[test]
fn spawn_repeat_cancellation() {
    let counter = Arc::new(AtomicUsize::new(0));
    let token = Arc::new(Token::unbound());
    let c = Arc::clone(&counter);
    let handle = spawn_repeat(token, move |t| {
        let n = c.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= 5 {
            t.cancel();
        }
    });

    handle.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 5);
    assert!(handle.cancelled());
    assert!(handle.done());
}

#[test]
fn scheduler_drains_a_large_batch_and_settles() {
    const TASKS: u64 = 1 << 16;
    let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    let pool: Pool<4096, 65536> = Pool::try_new(worker_count, false, false).unwrap();

    let counter = Arc::new(AtomicU64::new(0));
    let mut tokens = Vec::with_capacity(TASKS as usize);
    for _ in 0..TASKS {
        let c = Arc::clone(&counter);
        tokens.push(pool.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
    }
    for token in &tokens {
        token.wait();
    }

    assert_eq!(counter.load(Ordering::SeqCst), TASKS);

    // Allow the last exploit cycle to finish draining before checking
    // settlement, since `wait()` only observes the token's own slot.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while (pool.stats().actives() != 0 || pool.stats().thieves() > worker_count) && std::time::Instant::now() < deadline {
        std::thread::yield_now();
    }
    assert_eq!(pool.stats().actives(), 0);
}

#[test]
fn spawn_via_default_pool_runs_and_completes() {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    let token = spawn(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    token.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
