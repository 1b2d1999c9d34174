use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{PipelineError, PipelineResult};

/// Pool for pure per-block work inside a stage. Results keep input order.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// `threads == 0` lets rayon pick one thread per core.
    pub fn new(threads: usize) -> PipelineResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("trafficnet-worker-{}", i))
            .build()
            .map_err(|e| PipelineError::Workers(e.to_string()))?;
        Ok(WorkerPool { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(f).collect())
    }
}
