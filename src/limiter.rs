//! Concurrency limit for backend searches.
//!
//! Every search holds a [`SearchJobSlot`] while its backend process runs.
//! The pool is a plain counting semaphore: acquisition order is the wakeup
//! order, nothing is ever rejected, callers just wait.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds how many backend processes run at once.
#[derive(Debug, Clone)]
pub struct SearchPool {
    permits: Arc<Semaphore>,
    size: usize,
}

/// Held for the duration of one backend run; dropping it frees the slot.
#[derive(Debug)]
pub struct SearchJobSlot {
    _permit: OwnedSemaphorePermit,
}

impl SearchPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free slot. The pool never closes its semaphore, so
    /// acquisition cannot fail.
    pub async fn acquire(&self) -> SearchJobSlot {
        match self.permits.clone().acquire_owned().await {
            Ok(permit) => SearchJobSlot { _permit: permit },
            Err(_) => unreachable!("search pool semaphore is never closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn slots_are_returned_on_drop() {
        let pool = SearchPool::new(2);
        assert_eq!(pool.available(), 2);

        let first = pool.acquire().await;
        let second = pool.acquire().await;
        assert_eq!(pool.available(), 0);

        drop(first);
        assert_eq!(pool.available(), 1);
        drop(second);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn concurrent_jobs_never_exceed_the_pool_size() {
        let pool = SearchPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _slot = pool.acquire().await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.available(), 3);
    }
}
