//! Retries, deadlines and fixed-interval background jobs

use crate::error::{EdulinkError, EdulinkResult, ErrorContext};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Backoff policy for [`retry_async`]
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, counting the first one
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    /// Upper bound for a single pause
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Spread each pause by +/-10%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Pause after failed attempt number `attempt` (1-based)
    fn delay_after(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay = (self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay_ms as f64);
        let delay = if self.jitter {
            delay * (0.9 + fastrand::f64() * 0.2)
        } else {
            delay
        };
        Duration::from_millis(delay as u64)
    }
}

/// Run `operation` until it succeeds, fails for good, or attempts run out
///
/// Only errors for which [`EdulinkError::is_recoverable`] holds are retried;
/// anything else is returned straight away.
pub async fn retry_async<F, T>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> EdulinkResult<T>
where
    F: Fn() -> BoxFuture<'static, EdulinkResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_recoverable() {
            return Err(error);
        }
        if attempt >= max_attempts {
            error!(
                operation = operation_name,
                attempts = attempt,
                error = %error,
                "Giving up after repeated failures"
            );
            return Err(error);
        }

        let delay = config.delay_after(attempt);
        warn!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

/// Fail with [`EdulinkError::Timeout`] if `future` does not finish within `timeout_ms`
pub async fn with_timeout<F, T>(
    future: F,
    timeout_ms: u64,
    operation_name: &str,
) -> EdulinkResult<T>
where
    F: std::future::Future<Output = T>,
{
    match timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(EdulinkError::Timeout {
            operation: operation_name.to_string(),
            duration_ms: timeout_ms,
            context: ErrorContext::new("async_utils")
                .with_operation("timeout")
                .with_metadata("timeout_ms", &timeout_ms.to_string())
                .with_suggestion("Increase timeout duration")
                .with_suggestion("Check network connectivity"),
        }),
    }
}

/// Fixed-interval background job, the building block for screens that
/// re-fetch their data while they are visible
///
/// The first run happens immediately. A run that fails is logged and the
/// schedule continues. Dropping the handle stops the schedule.
pub struct PeriodicTask {
    name: String,
    runs: Arc<AtomicU64>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Start running `job` every `interval` on the current tokio runtime
    pub fn spawn<F, Fut>(name: &str, interval: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = EdulinkResult<()>> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        let runs = Arc::new(AtomicU64::new(0));
        let task_runs = Arc::clone(&runs);
        let task_name = name.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = job().await {
                            warn!(task = %task_name, error = %e, "Periodic job failed");
                        }
                        task_runs.fetch_add(1, Ordering::SeqCst);
                    }
                    _ = &mut shutdown_rx => {
                        debug!(task = %task_name, "Periodic task stopped");
                        break;
                    }
                }
            }
        });

        debug!(task = name, interval_ms = interval.as_millis() as u64, "Periodic task started");

        Self {
            name: name.to_string(),
            runs,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of completed runs, successful or not
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Stop the schedule and wait for an in-progress run to finish
    pub async fn stop(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(task = %self.name, error = %e, "Periodic task panicked");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}
