//! Bounded-concurrency batch runner.
//!
//! Runs a batch of independent futures with a cap on how many are in
//! flight at once. Results come back in input order regardless of
//! completion order. Two entry points cover the two failure policies:
//! [`bounded_gather`] collects each unit's error in its slot, while
//! [`try_bounded_gather`] fails the whole batch on the first error.

use std::future::Future;
use std::sync::Arc;

use futures::future;
use tokio::sync::Semaphore;

/// Run all units with at most `max_parallel` in flight; each slot of the
/// result holds the unit's own outcome. A cap of zero is treated as one
/// so the batch cannot deadlock.
pub async fn bounded_gather<I, Fut, T, E>(units: I, max_parallel: usize) -> Vec<Result<T, E>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    future::join_all(units.into_iter().map(|unit| throttled(&semaphore, unit))).await
}

/// Like [`bounded_gather`], but the first error cancels the remaining
/// units and fails the batch.
pub async fn try_bounded_gather<I, Fut, T, E>(units: I, max_parallel: usize) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    future::try_join_all(units.into_iter().map(|unit| throttled(&semaphore, unit))).await
}

fn throttled<Fut, T, E>(
    semaphore: &Arc<Semaphore>,
    unit: Fut,
) -> impl Future<Output = Result<T, E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    let semaphore = Arc::clone(semaphore);
    async move {
        // Acquire cannot fail: the semaphore is owned by the gather call
        // and never closed. The permit is held for the unit's lifetime.
        let _permit = semaphore.acquire_owned().await.ok();
        unit.await
    }
}
