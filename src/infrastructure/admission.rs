//! Admission control: bounds concurrently in-progress work items.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::SwarmError;

/// Counting semaphore over work items (not individual provider calls); a
/// single admitted batch may still fan out to dozens of concurrent calls.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Held for the lifetime of one admitted work item; the slot returns to the
/// pool on drop, so release cannot be forgotten or double-counted.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Suspends until a slot is free.
    pub async fn acquire(&self) -> Result<AdmissionPermit, SwarmError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SwarmError::internal("admission semaphore closed"))?;

        Ok(AdmissionPermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn acquire_suspends_at_capacity_and_wakes_on_release() {
        let admission = AdmissionController::new(1);
        let held = admission.acquire().await.unwrap();

        let mut waiting = task::spawn(admission.acquire());
        assert_pending!(waiting.poll());

        drop(held);
        assert!(waiting.is_woken());
        assert_ready!(waiting.poll()).unwrap();
    }

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let admission = AdmissionController::new(2);

        let first = admission.acquire().await.unwrap();
        let _second = admission.acquire().await.unwrap();
        assert_eq!(admission.available(), 0);
        assert_eq!(admission.in_flight(), 2);

        drop(first);
        assert_eq!(admission.available(), 1);
        assert_eq!(admission.in_flight(), 1);
    }

    #[tokio::test]
    async fn concurrent_holders_never_exceed_capacity() {
        const CAPACITY: usize = 4;
        const TASKS: usize = 64;

        let admission = AdmissionController::new(CAPACITY);
        let current = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let admission = admission.clone();
            let current = current.clone();
            let high_water = high_water.clone();

            handles.push(tokio::spawn(async move {
                let _permit = admission.acquire().await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(high_water.load(Ordering::SeqCst) <= CAPACITY);
        assert_eq!(admission.available(), CAPACITY);
    }
}
