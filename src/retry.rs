//! Bounded retry around the terminal fetcher.
//!
//! A [`RetryPolicy`] makes at most `retries + 1` attempts for one logical request.
//! It re-attempts when the fetcher fails with any error other than cancellation,
//! or when the fetcher succeeds but the configured [`RetryCondition`] rejects the
//! response. Cancellation is never retried. Attempts are strictly sequential; a
//! [`Backoff`] optionally spaces them out.

use crate::{fetcher::Fetcher, signal::AbortSignal, Error, RequestInit, Response, Result};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Delay between re-attempts.
///
/// # Examples
///
/// ```
/// use openfetch::retry::Backoff;
/// use std::time::Duration;
///
/// // Re-attempt immediately (the default)
/// let immediate = Backoff::None;
///
/// // 100ms, 200ms, 400ms, ... capped at 5s
/// let exponential = Backoff::Exponential {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(5),
///     jitter: false,
/// };
/// assert_eq!(exponential.delay_for_attempt(3), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, Default)]
pub enum Backoff {
    /// Re-attempt immediately.
    #[default]
    None,

    /// Wait the same delay before every re-attempt.
    Constant(Duration),

    /// Wait `initial_delay * 2^(attempt - 1)`, capped at `max_delay`.
    ///
    /// Optional jitter scales each delay to a random 50%-100% of its value.
    Exponential {
        /// The delay before the first re-attempt.
        initial_delay: Duration,
        /// The maximum delay between attempts.
        max_delay: Duration,
        /// Whether to add random jitter to delays.
        jitter: bool,
    },

    /// Custom delay, given the re-attempt number (1-indexed).
    Custom {
        delay_fn: fn(attempt: usize) -> Duration,
    },
}

impl Backoff {
    /// Returns the delay before the given re-attempt.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The re-attempt number (1-indexed, so 1 = first retry)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Constant(delay) => *delay,
            Backoff::Exponential {
                initial_delay,
                max_delay,
                jitter,
            } => {
                let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1) as u32);
                let base_delay =
                    initial_delay.saturating_mul(multiplier.try_into().unwrap_or(u32::MAX));
                let delay = base_delay.min(*max_delay);

                if *jitter {
                    let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
                    delay.mul_f64(jitter_factor)
                } else {
                    delay
                }
            }
            Backoff::Custom { delay_fn } => delay_fn(attempt),
        }
    }
}

/// Decides whether a successfully fetched response is acceptable.
///
/// Returning `false` marks the response as worth retrying while attempts remain.
/// Closures `Fn(&Response) -> bool` are conditions too.
///
/// # Examples
///
/// ```
/// use openfetch::{Response, RetryCondition};
///
/// struct AcceptUnlessThrottled;
///
/// impl RetryCondition for AcceptUnlessThrottled {
///     fn accept(&self, response: &Response) -> bool {
///         response.status.as_u16() != 429
///     }
/// }
/// ```
pub trait RetryCondition: Send + Sync {
    /// Returns `true` to accept the response, `false` to retry.
    fn accept(&self, response: &Response) -> bool;
}

impl<F> RetryCondition for F
where
    F: Fn(&Response) -> bool + Send + Sync,
{
    fn accept(&self, response: &Response) -> bool {
        self(response)
    }
}

/// Accept only 2xx responses.
#[derive(Debug, Clone, Copy)]
pub struct AcceptSuccess;

impl RetryCondition for AcceptSuccess {
    fn accept(&self, response: &Response) -> bool {
        response.ok()
    }
}

/// Retry 5xx server errors, accept everything else.
#[derive(Debug, Clone, Copy)]
pub struct RejectServerErrors;

impl RetryCondition for RejectServerErrors {
    fn accept(&self, response: &Response) -> bool {
        !response.status.is_server_error()
    }
}

/// Retry the listed statuses, accept everything else.
#[derive(Debug, Clone)]
pub struct RejectStatuses(pub Vec<u16>);

impl RetryCondition for RejectStatuses {
    fn accept(&self, response: &Response) -> bool {
        !self.0.contains(&response.status.as_u16())
    }
}

/// Accept only if every condition accepts.
///
/// # Examples
///
/// ```
/// use openfetch::retry::{AllOf, RejectServerErrors, RejectStatuses};
///
/// // Retry 5xx and 429
/// let condition = AllOf::new(vec![
///     Box::new(RejectServerErrors),
///     Box::new(RejectStatuses(vec![429])),
/// ]);
/// ```
pub struct AllOf {
    conditions: Vec<Box<dyn RetryCondition>>,
}

impl AllOf {
    pub fn new(conditions: Vec<Box<dyn RetryCondition>>) -> Self {
        Self { conditions }
    }
}

impl RetryCondition for AllOf {
    fn accept(&self, response: &Response) -> bool {
        self.conditions.iter().all(|c| c.accept(response))
    }
}

/// Accept if any condition accepts.
pub struct AnyOf {
    conditions: Vec<Box<dyn RetryCondition>>,
}

impl AnyOf {
    pub fn new(conditions: Vec<Box<dyn RetryCondition>>) -> Self {
        Self { conditions }
    }
}

impl RetryCondition for AnyOf {
    fn accept(&self, response: &Response) -> bool {
        self.conditions.iter().any(|c| c.accept(response))
    }
}

/// The innermost stage of the transport pipeline.
///
/// With `retries == 0` exactly one attempt is made and its outcome is returned
/// unmodified.
#[derive(Clone, Default)]
pub struct RetryPolicy {
    retries: usize,
    condition: Option<Arc<dyn RetryCondition>>,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Creates a policy allowing `retries` additional attempts.
    pub fn new(retries: usize) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    /// Sets the condition a successful response must meet to be accepted.
    pub fn condition(mut self, condition: Arc<dyn RetryCondition>) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Runs the attempts for one logical request.
    ///
    /// Returns the first accepted response, the last response once the budget is
    /// exhausted, or the last error.
    pub async fn execute(
        &self,
        fetcher: &dyn Fetcher,
        url: String,
        init: RequestInit,
    ) -> Result<Response> {
        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let can_retry = attempt <= self.retries;

            match fetcher.fetch(url.clone(), init.clone()).await {
                Ok(mut response) => {
                    response.attempts = attempt;
                    response.latency = start_time.elapsed();

                    let accepted = self
                        .condition
                        .as_ref()
                        .map_or(true, |condition| condition.accept(&response));
                    if accepted || !can_retry {
                        return Ok(response);
                    }

                    tracing::warn!(
                        status = response.status.as_u16(),
                        attempt = attempt,
                        method = %init.method,
                        url = %url,
                        "Response rejected by retry condition"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        method = %init.method,
                        url = %url,
                        "Request failed"
                    );

                    if init
                        .extras
                        .signal
                        .as_ref()
                        .is_some_and(AbortSignal::is_aborted)
                    {
                        return Err(Error::Cancelled);
                    }
                    if !can_retry || e.is_cancelled() {
                        return Err(e);
                    }
                }
            }

            self.wait_before(attempt, init.extras.signal.as_ref()).await?;
        }
    }

    /// Waits out the backoff before re-attempt number `attempt`.
    async fn wait_before(&self, attempt: usize, signal: Option<&AbortSignal>) -> Result<()> {
        if signal.is_some_and(AbortSignal::is_aborted) {
            return Err(Error::Cancelled);
        }

        let delay = self.backoff.delay_for_attempt(attempt);
        if delay.is_zero() {
            return Ok(());
        }

        tracing::info!(
            delay_ms = delay.as_millis(),
            attempt = attempt,
            "Retrying request after delay"
        );

        match signal {
            Some(signal) => tokio::select! {
                _ = signal.aborted() => Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retries", &self.retries)
            .field("condition", &self.condition.is_some())
            .field("backoff", &self.backoff)
            .finish()
    }
}
