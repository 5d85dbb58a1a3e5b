//! Bounded retry with exponential backoff.
//!
//! [`RetryPolicy::execute`] drives one call through the retry state machine:
//! every attempt is awaited before the next one starts, retryable errors are
//! re-attempted after a backoff delay until the budget is spent, anything
//! else is returned immediately. [`RetryResource`] applies a policy to every
//! verb of a [`Resource`].

use std::{fmt, future::Future, sync::Arc, time::Duration};

use rand::Rng;
use serde::Serialize;

// tokio::time::sleep is only available on non-WASM targets.
#[cfg(not(target_arch = "wasm32"))]
use tokio::time::sleep;

use crate::{resource::to_body, Entity, IdmError, Page, Params, Resource, Result};

/// Predicate deciding whether an error is worth another attempt.
#[derive(Clone)]
pub struct RetryCondition(Arc<dyn Fn(&IdmError) -> bool + Send + Sync>);

impl RetryCondition {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&IdmError) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Retries only the given HTTP statuses; transport errors are not retried.
    pub fn statuses(statuses: impl Into<Vec<u16>>) -> Self {
        let statuses = statuses.into();
        Self::new(move |error| match error {
            IdmError::Api { status, .. } => statuses.contains(status),
            _ => false,
        })
    }

    pub fn matches(&self, error: &IdmError) -> bool {
        (self.0)(error)
    }
}

impl Default for RetryCondition {
    /// Rate limiting, gateway failures and network-level errors.
    fn default() -> Self {
        Self::new(IdmError::is_retryable)
    }
}

impl fmt::Debug for RetryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryCondition(..)")
    }
}

/// Retry policy configuration.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt (0 = no retries).
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
    /// Draw each delay uniformly from `[delay / 2, delay]`.
    pub jitter: bool,
    pub condition: RetryCondition,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
            jitter: true,
            condition: RetryCondition::default(),
        }
    }
}

impl RetryPolicy {
    /// Default backoff with the given retry budget.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, base_delay_ms: u64, backoff_factor: f64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_condition(mut self, condition: RetryCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Backoff delay before retry number `attempt + 1`.
    ///
    /// A server-provided `retry_after` wins over the computed delay; both are
    /// capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32, error: &IdmError) -> Duration {
        let cap = Duration::from_millis(self.max_delay_ms);
        if let Some(hint) = error.retry_after() {
            return hint.min(cap);
        }

        let exp = attempt.min(16) as i32;
        let raw = self.base_delay_ms as f64 * self.backoff_factor.max(1.0).powi(exp);
        let delay_ms = raw.min(self.max_delay_ms as f64) as u64;

        let delay_ms = if self.jitter && delay_ms > 1 {
            rand::thread_rng().gen_range(delay_ms / 2..=delay_ms)
        } else {
            delay_ms
        };
        Duration::from_millis(delay_ms)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    ///
    /// A spent budget yields [`IdmError::RetriesExhausted`] wrapping the last
    /// error, also when `max_retries` is zero.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(operation, attempts = attempt + 1, "succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !self.condition.matches(&error) {
                return Err(error);
            }

            if attempt >= self.max_retries {
                #[cfg(feature = "tracing")]
                tracing::warn!(operation, attempts = attempt + 1, error = %error, "retry budget exhausted");

                return Err(IdmError::RetriesExhausted {
                    attempts: attempt + 1,
                    source: Box::new(error),
                });
            }

            let delay = self.delay_for(attempt, &error);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                operation,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after transient error"
            );

            wait(delay).await;
            attempt += 1;
        }
    }
}

/// Waits before the next retry attempt.
///
/// On WASM targets this is a no-op: there is no timer to sleep on.
async fn wait(delay: Duration) {
    #[cfg(not(target_arch = "wasm32"))]
    sleep(delay).await;

    #[cfg(target_arch = "wasm32")]
    let _ = delay;
}

/// A [`Resource`] whose verbs are retried under a [`RetryPolicy`].
///
/// Signatures match [`Resource`] one to one. Each attempt rebuilds the request
/// from the same inputs, so method, path, query and body never change
/// between attempts. Without a policy every verb is a single attempt.
#[derive(Clone, Debug)]
pub struct RetryResource {
    inner: Resource,
    policy: Option<RetryPolicy>,
}

impl RetryResource {
    pub fn new(inner: Resource, policy: impl Into<Option<RetryPolicy>>) -> Self {
        Self {
            inner,
            policy: policy.into(),
        }
    }

    pub fn inner(&self) -> &Resource {
        &self.inner
    }

    pub fn policy(&self) -> Option<&RetryPolicy> {
        self.policy.as_ref()
    }

    async fn run<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match &self.policy {
            Some(policy) => policy.execute(operation, f).await,
            None => f().await,
        }
    }

    pub async fn create<B>(&self, params: Params, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let body = to_body(data)?;
        self.run("create", || self.inner.create(params.clone(), &body)).await
    }

    pub async fn get(&self, params: Params) -> Result<Entity> {
        self.run("get", || self.inner.get(params.clone())).await
    }

    pub async fn get_all(&self, params: Params) -> Result<Page> {
        self.run("get_all", || self.inner.get_all(params.clone())).await
    }

    pub async fn get_next(&self, cursor: &str) -> Result<Page> {
        self.run("get_next", || self.inner.get_next(cursor)).await
    }

    pub async fn update<B>(&self, params: Params, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let body = to_body(data)?;
        self.run("update", || self.inner.update(params.clone(), &body)).await
    }

    pub async fn replace<B>(&self, params: Params, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let body = to_body(data)?;
        self.run("replace", || self.inner.replace(params.clone(), &body)).await
    }

    pub async fn delete(&self, params: Params) -> Result<()> {
        self.run("delete", || self.inner.delete(params.clone())).await
    }

    pub async fn delete_with_body<B>(&self, params: Params, data: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let body = to_body(data)?;
        self.run("delete_with_body", || {
            self.inner.delete_with_body(params.clone(), &body)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::{RetryCondition, RetryPolicy};
    use crate::IdmError;

    fn api(status: u16) -> IdmError {
        IdmError::Api {
            status,
            error: None,
            error_code: None,
            message: "stub".to_owned(),
            retry_after: None,
        }
    }

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries)
            .with_backoff(1, 2.0)
            .with_jitter(false)
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay_ms, 250);
        assert_eq!(policy.max_delay_ms, 10_000);
        assert!(policy.jitter);
    }

    #[test]
    fn delay_grows_exponentially_and_is_capped() {
        let policy = RetryPolicy::new(10)
            .with_backoff(100, 2.0)
            .with_max_delay_ms(1_000)
            .with_jitter(false);
        let error = api(503);
        assert_eq!(policy.delay_for(0, &error), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1, &error), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3, &error), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4, &error), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(40, &error), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_within_half_to_full_delay() {
        let policy = RetryPolicy::new(5).with_backoff(400, 2.0);
        for _ in 0..50 {
            let delay = policy.delay_for(1, &api(429));
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(800));
        }
    }

    #[test]
    fn retry_after_hint_overrides_backoff() {
        let policy = fast(3).with_max_delay_ms(5_000);
        let hinted = IdmError::Api {
            status: 429,
            error: None,
            error_code: None,
            message: "slow down".to_owned(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(policy.delay_for(0, &hinted), Duration::from_secs(2));

        let capped = fast(3).with_max_delay_ms(500);
        assert_eq!(capped.delay_for(0, &hinted), Duration::from_millis(500));
    }

    #[test]
    fn custom_condition_by_status() {
        let policy = fast(2).with_condition(RetryCondition::statuses([429]));
        assert!(policy.condition.matches(&api(429)));
        assert!(!policy.condition.matches(&api(503)));
    }

    #[tokio::test]
    async fn custom_condition_makes_other_statuses_fatal() {
        let calls = AtomicU32::new(0);
        let err = fast(3)
            .with_condition(RetryCondition::statuses([429]))
            .execute("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(api(503)) }
            })
            .await
            .expect_err("503 is fatal under this condition");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, IdmError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn exhausts_after_max_retries_plus_one_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = fast(4)
            .execute("test", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(api(503)) }
            })
            .await
            .expect_err("must exhaust");

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match err {
            IdmError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 5);
                assert_eq!(source.status(), Some(503));
            }
            other => panic!("expected exhausted error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stops_retrying_after_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = fast(3)
            .execute("test", || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(api(429))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .expect("second attempt must succeed");

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_is_returned_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = fast(5)
            .execute("test", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(api(404)) }
            })
            .await
            .expect_err("404 must fail");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.status(), Some(404));
        assert!(!matches!(err, IdmError::RetriesExhausted { .. }));
    }

    #[tokio::test]
    async fn zero_retries_still_reports_exhaustion() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = RetryPolicy::new(0)
            .execute("test", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(api(503)) }
            })
            .await
            .expect_err("must fail");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match err {
            IdmError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 1);
                assert_eq!(source.status(), Some(503));
            }
            other => panic!("expected exhausted error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn attempt_counter_resets_per_call() {
        let policy = fast(1);
        for _ in 0..3 {
            let calls = AtomicU32::new(0);
            let _ = policy
                .execute("test", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(api(502)) }
                })
                .await;
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        }
    }
}
