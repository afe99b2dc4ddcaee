use backon::{BackoffBuilder, BlockingRetryable, ConstantBuilder, ExponentialBuilder};
use std::time::Duration;
use subproc_core::{ProcessSpawner, Result, RetryConfig, SpawnConfig, SpawnError};
use tracing::warn;

/// Spawn, retrying transient resource shortages (`EAGAIN`, `ENOMEM`) with
/// the given backoff. Any other failure is returned after the first attempt.
pub fn spawn_with_retry<S: ProcessSpawner>(
    spawner: &S,
    config: &SpawnConfig,
    retry: &RetryConfig,
) -> Result<S::Handle> {
    retry.validate()?;
    config.validate()?;

    let attempt = || spawner.spawn(config);
    // backon counts retries, max_attempts counts the first try as well
    let retries = retry.max_attempts.saturating_sub(1) as usize;

    if retry.use_exponential_backoff {
        let mut backoff = ExponentialBuilder::default()
            .with_min_delay(retry.min_delay())
            .with_max_delay(retry.max_delay())
            .with_max_times(retries);
        if retry.jitter {
            backoff = backoff.with_jitter();
        }
        run_with_backoff(attempt, backoff)
    } else {
        let mut backoff = ConstantBuilder::default()
            .with_delay(retry.min_delay())
            .with_max_times(retries);
        if retry.jitter {
            backoff = backoff.with_jitter();
        }
        run_with_backoff(attempt, backoff)
    }
}

fn run_with_backoff<T, F, B>(attempt: F, backoff: B) -> Result<T>
where
    F: FnMut() -> Result<T>,
    B: BackoffBuilder,
{
    attempt
        .retry(backoff)
        .sleep(std::thread::sleep)
        .when(SpawnError::is_retryable)
        .notify(|err: &SpawnError, delay: Duration| {
            warn!("Spawn failed ({}), retrying in {:?}", err, delay);
        })
        .call()
}
