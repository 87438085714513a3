use std::{future::Future, time::Duration};

use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

use crate::utils::clock::Clock;

use super::ProviderError;

/// Keeps consecutive calls at least `min_interval` apart.
pub struct Pacer {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Waits until the next call is allowed and marks it as taken.
    pub async fn wait_turn(&self, clock: &dyn Clock) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let allowed_at = previous + self.min_interval;
            if clock.instant() < allowed_at {
                debug!("Pacing provider call");
                clock.sleep_until(allowed_at).await;
            }
        }
        *last_call = Some(clock.instant());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non transient error or runs out of attempts.
/// The wait between attempts doubles every time.
pub async fn with_retries<T, F, Fut>(
    clock: &dyn Clock,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!("Attempt {attempt} failed, retrying in {backoff:?}: {e}");
                clock.sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use tokio::time::Instant;

    use crate::{provider::ProviderError, utils::clock::DefaultClock};

    use super::{with_retries, Pacer, RetryPolicy};

    #[tokio::test(start_paused = true)]
    async fn test_pacer_spaces_calls() {
        let pacer = Pacer::new(Duration::from_secs(1));
        let start = Instant::now();

        pacer.wait_turn(&DefaultClock).await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        pacer.wait_turn(&DefaultClock).await;
        pacer.wait_turn(&DefaultClock).await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_doesnt_wait_after_idle_time() {
        let pacer = Pacer::new(Duration::from_secs(1));
        pacer.wait_turn(&DefaultClock).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let before = Instant::now();
        pacer.wait_turn(&DefaultClock).await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();
        let result = with_retries(&DefaultClock, RetryPolicy::default(), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::RateLimited)
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s then 4s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retries(&DefaultClock, RetryPolicy::default(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Status {
                status: 503,
                body: "busy".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Status { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_doesnt_retry_permanent_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retries(&DefaultClock, RetryPolicy::default(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Unauthorized("bad key".into()))
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
