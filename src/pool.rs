//! # Bounded Worker Pool
//!
//! A fixed-size pool of worker tasks consuming jobs from a shared queue.
//! The caller submits every job up front and awaits the pool, which only
//! returns once all workers have drained the queue and gone idle. That join
//! is the barrier the pipeline relies on: a stage never starts before the
//! previous stage's pool has fully completed.
//!
//! Each worker turns one job into one immutable result value; results are
//! collected over a channel, so no mutable state is shared between workers.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::error;

/// Run `handler` over `jobs` with at most `workers` concurrent tasks.
///
/// Results arrive in completion order, not submission order. The returned
/// vector contains one entry per job that ran to completion; a panicking
/// handler loses only its own job.
pub async fn run_bounded<J, R, F, Fut>(workers: usize, jobs: Vec<J>, handler: F) -> Vec<R>
where
    J: Send + 'static,
    R: Send + 'static,
    F: Fn(J) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
{
    let capacity = jobs.len().max(1);
    let workers = workers.clamp(1, capacity);

    let (job_tx, job_rx) = mpsc::channel::<J>(capacity);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<R>(capacity);

    let mut pool = JoinSet::new();
    for _ in 0..workers {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let handler = handler.clone();

        pool.spawn(async move {
            loop {
                // Hold the lock only for the pop, not for the work itself.
                let job = { job_rx.lock().await.recv().await };
                let Some(job) = job else { break };

                let result = handler(job).await;
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(result_tx);

    // Queue capacity covers every job, so submission never blocks on a
    // stalled worker.
    for job in jobs {
        if job_tx.send(job).await.is_err() {
            break;
        }
    }
    drop(job_tx);

    // Barrier: wait for every worker to go idle.
    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            error!("pool worker failed: {}", e);
        }
    }

    let mut results = Vec::with_capacity(capacity);
    while let Some(result) = result_rx.recv().await {
        results.push(result);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_every_job() {
        let jobs: Vec<u32> = (0..20).collect();
        let mut results = run_bounded(4, jobs, |n| async move { n * 2 }).await;
        results.sort_unstable();

        let expected: Vec<u32> = (0..20).map(|n| n * 2).collect();
        assert_eq!(results, expected);
    }

    #[tokio::test]
    async fn test_empty_job_list() {
        let results = run_bounded(5, Vec::<u32>::new(), |n| async move { n }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_pool_size() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<usize> = (0..30).collect();
        let (active_ref, peak_ref) = (Arc::clone(&active), Arc::clone(&peak));

        run_bounded(3, jobs, move |_| {
            let active = Arc::clone(&active_ref);
            let peak = Arc::clone(&peak_ref);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_pool_shrinks_to_job_count() {
        // A single job must not hang a larger pool.
        let results = run_bounded(10, vec![7u32], |n| async move { n + 1 }).await;
        assert_eq!(results, vec![8]);
    }
}
