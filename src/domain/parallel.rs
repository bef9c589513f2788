//! CPU budget split between the two parallel axes of a search.

use crate::domain::error::KabuwalkError;
use serde::Serialize;

/// `date_workers * candidate_workers <= cpu_budget`, both at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParallelBudget {
    pub cpu_budget: usize,
    pub date_workers: usize,
    pub candidate_workers: usize,
}

impl ParallelBudget {
    /// `cpu_budget` of 0 means all available cores.
    pub fn new(cpu_budget: usize, date_workers: usize) -> Self {
        let cpu_budget = if cpu_budget == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            cpu_budget
        };
        let date_workers = date_workers.clamp(1, cpu_budget);
        Self {
            cpu_budget,
            date_workers,
            candidate_workers: (cpu_budget / date_workers).max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.date_workers * self.candidate_workers
    }

    /// Dedicated pool for one run. Work is run inside it with `install`.
    pub fn build_pool(&self) -> Result<rayon::ThreadPool, KabuwalkError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads())
            .thread_name(|i| format!("kabuwalk-{i}"))
            .build()
            .map_err(|e| KabuwalkError::ThreadPool {
                reason: e.to_string(),
            })
    }
}

/// Minimum items per rayon split so that `len` items spread over at most
/// `workers` jobs.
pub fn chunk_len(len: usize, workers: usize) -> usize {
    len.div_ceil(workers.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_splits_axes() {
        let b = ParallelBudget::new(8, 2);
        assert_eq!(b.date_workers, 2);
        assert_eq!(b.candidate_workers, 4);
        assert_eq!(b.threads(), 8);
    }

    #[test]
    fn budget_never_exceeds_cpus() {
        let b = ParallelBudget::new(6, 4);
        assert_eq!(b.candidate_workers, 1);
        assert!(b.threads() <= 6);

        let b = ParallelBudget::new(2, 16);
        assert_eq!(b.date_workers, 2);
        assert_eq!(b.threads(), 2);
    }

    #[test]
    fn zero_budget_uses_available_cores() {
        let b = ParallelBudget::new(0, 1);
        assert!(b.cpu_budget >= 1);
        assert_eq!(b.candidate_workers, b.cpu_budget);
    }

    #[test]
    fn chunk_len_rounds_up() {
        assert_eq!(chunk_len(10, 3), 4);
        assert_eq!(chunk_len(0, 3), 1);
        assert_eq!(chunk_len(5, 0), 5);
    }

    #[test]
    fn pool_has_budgeted_threads() {
        let pool = ParallelBudget::new(2, 1).build_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }
}
