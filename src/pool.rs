use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded set of execution slots with busy/idle accounting.
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    max: usize,
}

/// A claimed slot. Dropping it releases the slot, including during unwinding.
pub struct Slot {
    active: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    pub fn new(max: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    /// Waits until a slot frees up. Woken by the semaphore, no polling.
    pub async fn acquire(&self) -> Result<Slot> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("worker pool closed".to_string()))?;

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        Ok(Slot {
            active: self.active.clone(),
            _permit: permit,
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest `active()` observed since the pool was created.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // runs before the permit field is dropped, so active never exceeds max
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn slots_are_released_on_drop() {
        let pool = WorkerPool::new(2);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.active(), 2);

        drop(a);
        assert_eq!(pool.active(), 1);
        drop(b);
        assert_eq!(pool.active(), 0);
        assert_eq!(pool.peak(), 2);
    }

    #[tokio::test]
    async fn saturated_pool_waits_for_a_release() {
        let pool = Arc::new(WorkerPool::new(1));
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let _slot = pool.acquire().await.unwrap();
                pool.active()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let active = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke up")
            .unwrap();
        assert_eq!(active, 1);
        assert_eq!(pool.peak(), 1);
    }

    #[tokio::test]
    async fn panicking_task_releases_its_slot() {
        let pool = Arc::new(WorkerPool::new(1));
        let slot = pool.acquire().await.unwrap();

        let result = tokio::spawn(async move {
            let _slot = slot;
            let missing: Option<()> = None;
            missing.expect("executor blew up");
        })
        .await;

        assert!(result.unwrap_err().is_panic());
        assert_eq!(pool.active(), 0);
        let _again = pool.acquire().await.unwrap();
    }
}
