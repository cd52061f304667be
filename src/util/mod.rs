//! Planning utilities: bin packing, parallel iteration and the shared worker
//! pool.

mod bin_packing;
mod parallel;

pub(crate) use bin_packing::PackingIterator;
pub(crate) use parallel::ParallelIterable;

use once_cell::sync::Lazy;
use threadpool::ThreadPool;

static WORKER_POOL: Lazy<ThreadPool> =
    Lazy::new(|| ThreadPool::with_name("iceberg-scan-worker".to_string(), num_cpus::get()));

/// The process-wide pool used for manifest expansion. Clones share the same
/// workers.
pub(crate) fn worker_pool() -> ThreadPool {
    WORKER_POOL.clone()
}
