//! Execution engines
//!
//! Annotators are generic over an [`ExecutionEngine`] that decides whether
//! independent work items (candidate splits, profile diagonals, k-NN rows,
//! emission rows) are evaluated in order on the calling thread or fanned
//! out over a Rayon pool.
//!
//! Engines only change scheduling. [`ExecutionEngine::execute_batch`]
//! always returns results in index order and every call site reduces them
//! in that order, so parallel and sequential fits are identical.

#[cfg(feature = "parallel")]
use crate::{Error, Result};
#[cfg(feature = "parallel")]
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
}

/// Scheduler for independent, index-addressed work items
pub trait ExecutionEngine: Clone + Send + Sync + std::fmt::Debug {
    /// Evaluate `f(i)` for `i in 0..count`, results in index order
    fn execute_batch<F, R>(&self, count: usize, f: F) -> Vec<R>
    where
        F: Fn(usize) -> R + Sync + Send,
        R: Send;

    fn strategy(&self) -> ExecutionStrategy;

    fn is_parallel(&self) -> bool {
        self.strategy() == ExecutionStrategy::Parallel
    }

    /// Worker threads available to one batch
    fn num_threads(&self) -> usize;
}

/// Runs every item on the calling thread
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialEngine;

impl ExecutionEngine for SequentialEngine {
    fn execute_batch<F, R>(&self, count: usize, f: F) -> Vec<R>
    where
        F: Fn(usize) -> R + Sync + Send,
        R: Send,
    {
        (0..count).map(f).collect()
    }

    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::Sequential
    }

    fn num_threads(&self) -> usize {
        1
    }
}

/// Fans items out over Rayon, on the global pool unless a dedicated pool
/// is supplied
#[cfg(feature = "parallel")]
#[derive(Clone, Debug, Default)]
pub struct ParallelEngine {
    pool: Option<Arc<rayon::ThreadPool>>,
}

#[cfg(feature = "parallel")]
impl ParallelEngine {
    pub fn new() -> Self {
        Self { pool: None }
    }

    pub fn with_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        Self { pool: Some(pool) }
    }

    /// Dedicated pool of `n` threads
    pub fn with_num_threads(n: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| Error::Execution(format!("cannot build a pool of {n} threads: {e}")))?;
        Ok(Self::with_pool(Arc::new(pool)))
    }
}

#[cfg(feature = "parallel")]
impl ExecutionEngine for ParallelEngine {
    fn execute_batch<F, R>(&self, count: usize, f: F) -> Vec<R>
    where
        F: Fn(usize) -> R + Sync + Send,
        R: Send,
    {
        use rayon::prelude::*;

        let run = || -> Vec<R> { (0..count).into_par_iter().map(&f).collect() };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::Parallel
    }

    fn num_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, |p| p.current_num_threads())
    }
}

pub fn sequential() -> SequentialEngine {
    SequentialEngine
}

#[cfg(feature = "parallel")]
pub fn parallel() -> ParallelEngine {
    ParallelEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_batch_order() {
        let engine = sequential();
        assert_eq!(engine.execute_batch(5, |i| i * i), vec![0, 1, 4, 9, 16]);
        assert!(engine.execute_batch(0, |i| i).is_empty());
        assert_eq!(engine.strategy(), ExecutionStrategy::Sequential);
        assert_eq!(engine.num_threads(), 1);
        assert!(!engine.is_parallel());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_batch_matches_sequential() {
        let engine = parallel();
        let par = engine.execute_batch(257, |i| (i as f64).sqrt());
        let seq = sequential().execute_batch(257, |i| (i as f64).sqrt());
        assert_eq!(par, seq);
        assert!(engine.is_parallel());
        assert!(engine.num_threads() > 0);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_dedicated_pool() {
        let engine = ParallelEngine::with_num_threads(2).unwrap();
        assert_eq!(engine.num_threads(), 2);
        assert_eq!(engine.execute_batch(3, |i| i + 1), vec![1, 2, 3]);
    }
}
