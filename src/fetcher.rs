//! The terminal transport.
//!
//! A [`Fetcher`] performs the actual network call for one attempt. Anything with the
//! shape `Fn(String, RequestInit) -> impl Future<Output = Result<Response>>` is a
//! fetcher, which keeps tests and custom transports simple. [`ReqwestFetcher`] is
//! the default, backed by a pooled `reqwest::Client`.

use crate::{
    encoding::{FormData, FormValue},
    metadata::Body,
    Error, RequestInit, Response, Result,
};
use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Performs a single request attempt.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: String, init: RequestInit) -> Result<Response>;
}

#[async_trait]
impl<F, Fut> Fetcher for F
where
    F: Fn(String, RequestInit) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    async fn fetch(&self, url: String, init: RequestInit) -> Result<Response> {
        self(url, init).await
    }
}

/// A fetcher backed by `reqwest`.
///
/// The underlying client keeps a connection pool, so one fetcher should be shared
/// across requests. Cancellation through the call's abort signal drops the
/// in-flight request and reports [`Error::Cancelled`].
///
/// # Examples
///
/// ```no_run
/// use openfetch::{Client, ReqwestFetcher};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), openfetch::Error> {
/// let client = Client::builder()
///     .base_url("https://petstore3.swagger.io/api/v3")?
///     .fetcher(ReqwestFetcher::new()?.timeout(Duration::from_secs(30)))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestFetcher {
    /// Creates a fetcher with a default `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            Error::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self::with_client(client))
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Sets the default timeout for every attempt.
    ///
    /// A per-call timeout in the request extras takes precedence.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn execute(&self, url: String, init: RequestInit) -> Result<Response> {
        let url = Url::parse(&url)?;
        let RequestInit {
            method,
            mut headers,
            body,
            extras,
        } = init;

        let mut request = self.client.request(method, url);

        if let Some(timeout) = extras.timeout.or(self.timeout) {
            request = request.timeout(timeout);
        }

        match body {
            Some(Body::Bytes(bytes)) => {
                request = request.body(bytes);
            }
            Some(Body::Multipart(form)) => {
                // reqwest writes its own content type carrying the boundary
                headers.remove(CONTENT_TYPE);
                request = request.multipart(multipart_form(form)?);
            }
            None => {}
        }

        let response = request
            .headers(headers)
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(Error::from_reqwest)?;

        let mut result = Response::new(status).with_body(body);
        result.headers = headers;
        Ok(result)
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: String, init: RequestInit) -> Result<Response> {
        match init.extras.signal.clone() {
            Some(signal) => {
                if signal.is_aborted() {
                    return Err(Error::Cancelled);
                }
                tokio::select! {
                    biased;
                    _ = signal.aborted() => Err(Error::Cancelled),
                    result = self.execute(url, init) => result,
                }
            }
            None => self.execute(url, init).await,
        }
    }
}

fn multipart_form(form: FormData) -> Result<reqwest::multipart::Form> {
    let mut multipart = reqwest::multipart::Form::new();
    for (key, value) in form.iter() {
        let key = key.to_string();
        multipart = match value {
            FormValue::Text(text) => multipart.text(key, text.clone()),
            FormValue::File(file) => {
                let mut part = reqwest::multipart::Part::bytes(file.bytes.to_vec());
                if let Some(name) = &file.file_name {
                    part = part.file_name(name.clone());
                }
                if let Some(mime) = &file.mime {
                    part = part.mime_str(mime).map_err(|e| {
                        Error::Configuration(format!("Invalid MIME type {}: {}", mime, e))
                    })?;
                }
                multipart.part(key, part)
            }
        };
    }
    Ok(multipart)
}
