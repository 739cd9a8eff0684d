//! Worker selection policies.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::registry::Worker;

/// Picks the worker that serves the next call.
pub trait SelectionPolicy: Send + Sync {
    /// Select one of `workers`, or `None` if the slice is empty.
    fn select(&self, workers: &[Arc<Worker>]) -> Option<Arc<Worker>>;
}

/// Round-robin over the registry snapshot.
///
/// A shared cursor advances on every call, so N consecutive calls over an
/// unchanged pool of N workers reach each worker exactly once, in id order.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionPolicy for RoundRobin {
    fn select(&self, workers: &[Arc<Worker>]) -> Option<Arc<Worker>> {
        if workers.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % workers.len();
        Some(workers[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::testing::idle_worker;

    fn ids(policy: &dyn SelectionPolicy, workers: &[Arc<Worker>], n: usize) -> Vec<u32> {
        (0..n)
            .map(|_| policy.select(workers).unwrap().id())
            .collect()
    }

    #[tokio::test]
    async fn test_round_robin() {
        let workers = vec![idle_worker(1), idle_worker(2), idle_worker(3)];
        let rr = RoundRobin::new();
        assert_eq!(ids(&rr, &workers, 4), vec![1, 2, 3, 1]);
    }

    #[tokio::test]
    async fn test_each_worker_once_per_cycle() {
        for n in 1..=6u32 {
            let workers: Vec<_> = (1..=n).map(idle_worker).collect();
            let rr = RoundRobin::new();
            let picked = ids(&rr, &workers, n as usize);
            assert_eq!(picked, (1..=n).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_empty_returns_none() {
        let rr = RoundRobin::new();
        assert!(rr.select(&[]).is_none());
    }

    #[tokio::test]
    async fn test_single_worker() {
        let workers = vec![idle_worker(7)];
        let rr = RoundRobin::new();
        assert_eq!(ids(&rr, &workers, 3), vec![7, 7, 7]);
    }

    #[tokio::test]
    async fn test_shrinking_pool_stays_in_bounds() {
        let rr = RoundRobin::new();
        let three = vec![idle_worker(1), idle_worker(2), idle_worker(3)];
        ids(&rr, &three, 2);
        let two = vec![idle_worker(1), idle_worker(3)];
        assert_eq!(ids(&rr, &two, 2), vec![1, 3]);
    }
}
