//! The transport pipeline: middleware chain, then retry policy, then fetcher.
//!
//! A [`Pipeline`] is composed once per client configuration and shared by every
//! request the client sends. Middlewares run in registration order: the first one
//! registered sees the original call first and the final outcome last. The retry
//! policy sits inside all of them, so a middleware runs once per logical request no
//! matter how many attempts the policy makes.
//!
//! ```text
//! caller -> middleware[0] -> middleware[1] -> ... -> retry policy -> fetcher
//! ```

use crate::{fetcher::Fetcher, retry::RetryPolicy, RequestInit, Response, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Intercepts a request on its way to the fetcher.
///
/// A middleware either continues the chain by calling [`Next::run`] (possibly with a
/// rewritten URL or descriptor) or answers by itself without calling it.
///
/// # Examples
///
/// ```
/// use openfetch::{async_trait, Middleware, Next, RequestInit, Response, Result};
///
/// struct UserAgent(&'static str);
///
/// #[async_trait]
/// impl Middleware for UserAgent {
///     async fn handle(&self, url: String, mut init: RequestInit, next: Next<'_>) -> Result<Response> {
///         init.headers.insert(http::header::USER_AGENT, http::HeaderValue::from_static(self.0));
///         next.run(url, init).await
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, url: String, init: RequestInit, next: Next<'_>) -> Result<Response>;
}

/// The remainder of the pipeline after the current middleware.
///
/// `run` consumes `Next`, so a middleware continues the chain at most once.
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    retry: &'a RetryPolicy,
    fetcher: &'a dyn Fetcher,
}

impl<'a> Next<'a> {
    fn new(
        middlewares: &'a [Arc<dyn Middleware>],
        retry: &'a RetryPolicy,
        fetcher: &'a dyn Fetcher,
    ) -> Self {
        Self {
            middlewares,
            retry,
            fetcher,
        }
    }

    /// Continues with the next middleware, or with the retry policy once the
    /// middlewares are exhausted.
    pub async fn run(self, url: String, init: RequestInit) -> Result<Response> {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                let next = Next::new(rest, self.retry, self.fetcher);
                current.handle(url, init, next).await
            }
            None => self.retry.execute(self.fetcher, url, init).await,
        }
    }
}

/// A composed transport: middlewares around a retry policy around a fetcher.
///
/// # Examples
///
/// ```
/// use openfetch::{Error, Pipeline, RequestInit, Response, RetryPolicy};
/// use http::{Method, StatusCode};
///
/// # async fn example() -> Result<(), Error> {
/// let pipeline = Pipeline::new(|_url: String, _init: RequestInit| async {
///     Ok::<_, Error>(Response::new(StatusCode::OK))
/// })
/// .retry(RetryPolicy::new(2));
///
/// let response = pipeline
///     .send("https://example.com/".to_string(), RequestInit::new(Method::GET))
///     .await?;
/// assert!(response.ok());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
    retry: RetryPolicy,
    fetcher: Arc<dyn Fetcher>,
}

impl Pipeline {
    /// Creates a pipeline with no middlewares and no retries.
    pub fn new(fetcher: impl Fetcher + 'static) -> Self {
        Self::from_parts(Arc::new(fetcher), Vec::new(), RetryPolicy::default())
    }

    pub(crate) fn from_parts(
        fetcher: Arc<dyn Fetcher>,
        middlewares: Vec<Arc<dyn Middleware>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            middlewares,
            retry,
            fetcher,
        }
    }

    /// Appends a middleware. It runs after every middleware already registered.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sends one logical request through the whole pipeline.
    pub async fn send(&self, url: String, init: RequestInit) -> Result<Response> {
        Next::new(&self.middlewares, &self.retry, self.fetcher.as_ref())
            .run(url, init)
            .await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("middlewares", &self.middlewares.len())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use http::{Method, StatusCode};

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn handle(&self, _url: String, _init: RequestInit, _next: Next<'_>) -> Result<Response> {
            Ok(Response::new(StatusCode::IM_A_TEAPOT))
        }
    }

    #[tokio::test]
    async fn test_short_circuit_skips_fetcher() {
        let pipeline = Pipeline::new(|_url: String, _init: RequestInit| async {
            Err::<Response, _>(Error::transport("fetcher must not run"))
        })
        .middleware(ShortCircuit);

        let response = pipeline
            .send("https://host/".to_string(), RequestInit::new(Method::GET))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_empty_chain_reaches_fetcher() {
        let pipeline = Pipeline::new(|url: String, _init: RequestInit| async move {
            Ok::<_, Error>(Response::new(StatusCode::OK).with_body(url))
        });

        let response = pipeline
            .send("https://host/x".to_string(), RequestInit::default())
            .await
            .unwrap();
        assert_eq!(response.text().unwrap(), "https://host/x");
    }
}
