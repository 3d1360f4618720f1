//! Self-healing periodic task.
//!
//! Wraps a recurring job so it repeats forever: each iteration runs under
//! a timeout, iterations are spaced by a fixed period, and the whole loop
//! sits inside a jittered retry wrapper. Timeouts are logged and survived;
//! any other job error restarts the loop after a randomized backoff, and
//! only repeated non-timeout failures beyond the retry bound surface
//! through the task's join handle.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

/// Error type produced by scheduled jobs.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Default bound on one iteration of a scheduled job.
pub const DEFAULT_ITERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Tuning knobs for a scheduled job.
#[derive(Debug, Clone)]
pub struct SchedulerPolicy {
    /// Bound on a single iteration. A timed-out iteration is logged and
    /// survived, never fatal.
    pub iteration_timeout: Duration,
    /// Lower bound of the randomized backoff applied after a non-timeout
    /// failure.
    pub jitter_min: Duration,
    /// Upper bound of the randomized backoff.
    pub jitter_max: Duration,
    /// How many failed cycles are tolerated before the failure surfaces
    /// through the join handle. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            iteration_timeout: DEFAULT_ITERATION_TIMEOUT,
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(10),
            max_retries: Some(5),
        }
    }
}

/// Terminal failure of a scheduled job.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduled job {name} failed after {attempts} attempts: {message}")]
    JobFailed {
        name: String,
        attempts: u32,
        message: String,
    },
}

/// Launch a detached background task that runs `job` forever, spaced by
/// `period` plus jitter after failures.
///
/// The job is a factory so every iteration awaits a fresh future. The
/// returned handle resolves only if the retry bound is exhausted by
/// non-timeout failures; until then the task runs detached.
pub fn schedule<F, Fut>(
    name: impl Into<String>,
    job: F,
    period: Duration,
    policy: SchedulerPolicy,
) -> JoinHandle<Result<(), SchedulerError>>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send,
{
    let name = name.into();
    tokio::spawn(async move { run_with_retry(&name, &job, period, &policy).await })
}

/// Outer jittered retry wrapper around the iteration loop.
async fn run_with_retry<F, Fut>(
    name: &str,
    job: &F,
    period: Duration,
    policy: &SchedulerPolicy,
) -> Result<(), SchedulerError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), JobError>>,
{
    let mut attempts: u32 = 0;
    loop {
        let failure = run_iterations(name, job, period, policy).await;
        attempts += 1;

        if let Some(max) = policy.max_retries {
            if attempts >= max.max(1) {
                error!(
                    task = name,
                    attempts,
                    error = %failure,
                    "Scheduled job exhausted its retries"
                );
                return Err(SchedulerError::JobFailed {
                    name: name.to_string(),
                    attempts,
                    message: failure.to_string(),
                });
            }
        }

        let backoff = jittered_delay(policy);
        warn!(
            task = name,
            attempt = attempts,
            backoff_ms = backoff.as_millis() as u64,
            error = %failure,
            "Scheduled job failed, backing off before restart"
        );
        sleep(backoff).await;
    }
}

/// Run the job forever; returns only when an iteration fails with a
/// non-timeout error. The period sleep runs after every iteration,
/// including the failing one.
async fn run_iterations<F, Fut>(
    name: &str,
    job: &F,
    period: Duration,
    policy: &SchedulerPolicy,
) -> JobError
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), JobError>>,
{
    loop {
        match timeout(policy.iteration_timeout, job()).await {
            Ok(Ok(())) => {
                debug!(task = name, "Scheduled job iteration completed");
            }
            Err(_elapsed) => {
                error!(
                    task = name,
                    timeout_ms = policy.iteration_timeout.as_millis() as u64,
                    "Scheduled job iteration timed out"
                );
            }
            Ok(Err(e)) => {
                sleep(period).await;
                return e;
            }
        }
        sleep(period).await;
    }
}

fn jittered_delay(policy: &SchedulerPolicy) -> Duration {
    let min = policy.jitter_min.min(policy.jitter_max);
    let max = policy.jitter_max.max(policy.jitter_min);
    let span = max.saturating_sub(min);
    min + span.mul_f64(fastrand::f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> SchedulerPolicy {
        SchedulerPolicy {
            iteration_timeout: Duration::from_millis(20),
            jitter_min: Duration::from_millis(1),
            jitter_max: Duration::from_millis(3),
            max_retries: Some(5),
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = SchedulerPolicy {
            jitter_min: Duration::from_millis(10),
            jitter_max: Duration::from_millis(50),
            ..SchedulerPolicy::default()
        };
        for _ in 0..100 {
            let delay = jittered_delay(&policy);
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn test_successful_job_keeps_running() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let handle = schedule(
            "ticker",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            Duration::from_millis(5),
            fast_policy(),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!handle.is_finished());
        assert!(runs.load(Ordering::SeqCst) >= 3);
        handle.abort();
    }

    #[tokio::test]
    async fn test_timeout_is_survived() {
        // Every iteration outlives the timeout; the task must stay alive
        // and keep starting new iterations.
        let starts = Arc::new(AtomicU32::new(0));
        let counter = starts.clone();
        let handle = schedule(
            "slowpoke",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            },
            Duration::from_millis(5),
            fast_policy(),
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!handle.is_finished());
        assert!(starts.load(Ordering::SeqCst) >= 2);
        handle.abort();
    }

    #[tokio::test]
    async fn test_non_timeout_error_exhausts_bounded_retries() {
        // The asymmetric policy: unlike a timeout, a job error must
        // eventually surface through the join handle.
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let handle = schedule(
            "broken",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), JobError>("downstream gone".into())
                }
            },
            Duration::from_millis(1),
            SchedulerPolicy {
                max_retries: Some(2),
                ..fast_policy()
            },
        );

        let result = handle.await.expect("scheduler task panicked");
        let err = result.unwrap_err();
        let SchedulerError::JobFailed { name, attempts, message } = err;
        assert_eq!(name, "broken");
        assert_eq!(attempts, 2);
        assert!(message.contains("downstream gone"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unbounded_retries_keep_the_task_alive() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let handle = schedule(
            "stubborn",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), JobError>("still broken".into())
                }
            },
            Duration::from_millis(1),
            SchedulerPolicy {
                max_retries: None,
                ..fast_policy()
            },
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!handle.is_finished());
        assert!(runs.load(Ordering::SeqCst) >= 3);
        handle.abort();
    }
}
