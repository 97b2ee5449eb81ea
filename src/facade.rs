//! The public facade (C9): `spawn`/`spawn_with_token`/`spawn_repeat`/
//! `run_range` over a lazily-initialized, process-wide default pool.
//!
//! Named `spawn`/`spawn_repeat`/`run_range` rather than the source's
//! `async`/`repeat_async`/`execute`, since `async` is a reserved keyword in
//! Rust; `run_range` takes the policy explicitly rather than overloading on
//! argument shape. See `DESIGN.md` for the naming decision.

use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};

use crate::config::Config;
use crate::ring::ExecutionPolicy;
use crate::scheduler::Pool;
use crate::token::{Token, TokenGroup};

/// Local deque capacity and master queue capacity for the process-wide
/// default pool. Chosen generously since back-pressure on push, not memory,
/// is the only cost of an oversized ring.
const DEFAULT_LOCAL_CAPACITY: usize = 1 << 12;
const DEFAULT_MASTER_CAPACITY: usize = 1 << 16;

type DefaultPool = Pool<DEFAULT_LOCAL_CAPACITY, DEFAULT_MASTER_CAPACITY>;

static DEFAULT_POOL: OnceLock<Arc<DefaultPool>> = OnceLock::new();

fn default_pool() -> &'static Arc<DefaultPool> {
    DEFAULT_POOL.get_or_init(|| {
        let config = Config::default();
        Arc::new(
            DefaultPool::try_new(config.worker_count, config.enable_affinity, config.enable_metrics)
                .expect("failed to start the default scheduler pool"),
        )
    })
}

/// Pushes `f` onto the process-wide default pool, returning a token that
/// completes when `f` has run.
pub fn spawn<F>(f: F) -> Token
where
    F: FnOnce() + Send + 'static,
{
    default_pool().submit(f)
}

/// As `spawn`, but rebinds `token` instead of allocating a fresh one. Used
/// by callers tracking a task's identity across resubmissions.
pub fn spawn_with_token<F>(token: &Token, f: F)
where
    F: FnOnce() + Send + 'static,
{
    default_pool().submit_with(token, f);
}

/// Runs `f(&token)` once, then — unless `f` called `token.cancel()` — rebinds
/// `token` to a freshly pushed re-invocation of itself before the current
/// invocation returns. `f` takes the token so it can decide, from the inside,
/// when the repeat chain should stop.
///
/// The source captures a copy of the repeating closure by value inside
/// itself (a self-referential lambda). Rust closures aren't self-referential
/// like that, so this instead boxes `f` once behind an `Arc` and recreates
/// only a thin re-push wrapper on each iteration, which clones the `Arc`
/// rather than the closure itself.
pub fn spawn_repeat<F>(token: Arc<Token>, f: F) -> Arc<Token>
where
    F: Fn(&Token) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    requeue(Arc::clone(&token), f);
    token
}

fn requeue<F>(token: Arc<Token>, f: Arc<F>)
where
    F: Fn(&Token) + Send + Sync + 'static,
{
    let pool = default_pool();
    let inner_token = Arc::clone(&token);
    let inner_f = Arc::clone(&f);
    pool.submit_with(&token, move || {
        inner_f(&inner_token);
        if !inner_token.cancelled() {
            requeue(inner_token, inner_f);
        }
    });
}

/// Runs `func` over every element of `range`. Sequential runs in the
/// calling thread, in order; parallel pushes every element to the default
/// pool and waits on the aggregated tokens.
pub fn run_range<I, F>(policy: ExecutionPolicy, range: I, func: F)
where
    I: IntoIterator,
    F: Fn(I::Item) + Send + Sync + 'static,
    I::Item: Send + 'static,
{
    match policy {
        ExecutionPolicy::Sequential => {
            for item in range {
                func(item);
            }
        }
        ExecutionPolicy::Parallel => {
            let func = Arc::new(func);
            let mut group = TokenGroup::new();
            for item in range {
                let func = Arc::clone(&func);
                group.push(spawn(move || func(item)));
            }
            group.wait();
        }
    }
}
