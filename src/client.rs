//! The client: base URL, default headers and a transport pipeline.
//!
//! The [`Client`] type is the main entry point. Each method call (`get`, `post`,
//! ...) starts a [`RequestBuilder`]; sending it resolves the path template, merges
//! headers, encodes the body and hands the result to the pipeline. Use
//! [`ClientBuilder`] to configure clients, and [`Client::with`] to derive new ones.

use crate::{
    encoding::FormFormatter,
    fetcher::{Fetcher, ReqwestFetcher},
    metadata::{Body, Payload, RequestState},
    pipeline::{Middleware, Pipeline},
    request::{Operation, RequestBuilder},
    retry::{Backoff, RetryCondition, RetryPolicy},
    Error, Params, RequestInit, Response, Result,
};
use http::{header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// An HTTP client for a schema-described API.
///
/// The client is cheap to clone and designed to be shared: its configuration and
/// pipeline are immutable after construction.
///
/// # Examples
///
/// ```no_run
/// use openfetch::{Client, FormFormatter, Operation, Part};
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
///
/// #[derive(Serialize, Deserialize)]
/// struct Pet {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), openfetch::Error> {
/// let client = Client::builder()
///     .base_url("https://petstore3.swagger.io/api/v3")?
///     .default_header("Accept", "application/json")?
///     .retries(2)
///     .form_formatter(FormFormatter::Join)
///     .build()?;
///
/// // GET /pet/{petId}
/// let response = client
///     .operation(Operation::get("/pet/{petId}").require(Part::Path))
///     .path(&json!({ "petId": 10 }))
///     .send()
///     .await?;
/// let pet: Pet = response.json()?;
///
/// // POST /pet with a JSON body
/// let created = client.post("/pet").body(&pet).send().await?;
/// println!("created: {}", created.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    options: ClientOptions,
    pipeline: Pipeline,
}

/// The effective configuration of a client.
#[derive(Clone)]
struct ClientOptions {
    base_url: Url,
    headers: HeaderMap,
    fetcher: Arc<dyn Fetcher>,
    middlewares: Vec<Arc<dyn Middleware>>,
    retries: usize,
    retry_condition: Option<Arc<dyn RetryCondition>>,
    backoff: Backoff,
    form_formatter: FormFormatter,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use openfetch::Client;
    ///
    /// # fn example() -> Result<(), openfetch::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    fn from_options(options: ClientOptions) -> Self {
        let mut retry = RetryPolicy::new(options.retries).backoff(options.backoff.clone());
        if let Some(condition) = &options.retry_condition {
            retry = retry.condition(condition.clone());
        }
        let pipeline = Pipeline::from_parts(
            options.fetcher.clone(),
            options.middlewares.clone(),
            retry,
        );

        Client {
            inner: Arc::new(ClientInner { options, pipeline }),
        }
    }

    /// Derives a new client with some options overridden.
    ///
    /// The receiver is left untouched. Headers are merged key by key with the
    /// overrides winning; middlewares are appended after the receiver's own. Every
    /// other option set on `overrides` replaces the receiver's.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use openfetch::{Client, ClientBuilder};
    ///
    /// # fn example() -> Result<(), openfetch::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .default_header("Accept", "application/json")?
    ///     .build()?;
    ///
    /// let authed = client.with(ClientBuilder::new().default_header("Authorization", "Bearer t")?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn with(&self, overrides: ClientBuilder) -> Client {
        let current = &self.inner.options;

        let mut headers = current.headers.clone();
        headers.extend(overrides.headers);

        let mut middlewares = current.middlewares.clone();
        middlewares.extend(overrides.middlewares);

        Client::from_options(ClientOptions {
            base_url: overrides.base_url.unwrap_or_else(|| current.base_url.clone()),
            headers,
            fetcher: overrides.fetcher.unwrap_or_else(|| current.fetcher.clone()),
            middlewares,
            retries: overrides.retries.unwrap_or(current.retries),
            retry_condition: overrides
                .retry_condition
                .or_else(|| current.retry_condition.clone()),
            backoff: overrides.backoff.unwrap_or_else(|| current.backoff.clone()),
            form_formatter: overrides.form_formatter.unwrap_or(current.form_formatter),
        })
    }

    /// The base URL every path is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.inner.options.base_url
    }

    /// The headers sent with every request.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.inner.options.headers
    }

    /// The composed transport pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    /// Starts a request for an operation, enforcing its mandatory parts.
    pub fn operation(&self, operation: Operation) -> RequestBuilder {
        RequestBuilder::new(self.clone(), operation)
    }

    /// Starts a request with no mandatory parts.
    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder {
        self.operation(Operation::new(method, path))
    }

    /// Starts a GET request.
    pub fn get(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    /// Starts a POST request.
    pub fn post(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    /// Starts a PUT request.
    pub fn put(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::PUT, path)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }

    /// Starts a PATCH request.
    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::PATCH, path)
    }

    /// Assembles the URL and descriptor for a request and sends it.
    pub(crate) async fn dispatch(
        &self,
        operation: &Operation,
        state: RequestState,
    ) -> Result<Response> {
        let url = self.resolve_url(&operation.path, &state)?;

        let mut headers = self.inner.options.headers.clone();
        headers.extend(state.headers);

        let body = self.encode_body(&headers, state.body)?;

        let init = RequestInit {
            method: operation.method.clone(),
            headers,
            body,
            extras: state.extras,
        };

        tracing::debug!(
            method = %init.method,
            url = %url,
            "Executing HTTP request"
        );

        self.inner.pipeline.send(url, init).await
    }

    /// Substitutes path parameters, appends the query and resolves against the
    /// base URL.
    fn resolve_url(&self, template: &str, state: &RequestState) -> Result<String> {
        let mut path = template.to_string();
        for (key, value) in state.path.iter() {
            let text = value
                .as_scalar_string()
                .unwrap_or_else(|| value.to_json().to_string());
            path = path.replace(&format!("{{{}}}", key), &text);
        }

        let query = self
            .inner
            .options
            .form_formatter
            .format(&state.query)
            .to_query_string();
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query);
        }

        let base_url = &self.inner.options.base_url;
        let combined = format!("{}{}", base_url.path(), path).replacen("//", "/", 1);

        let url = base_url.join(&combined).map_err(|e| {
            Error::Configuration(format!(
                "Cannot resolve path {} against {}: {}",
                template, base_url, e
            ))
        })?;
        Ok(url.to_string())
    }

    /// Encodes the payload according to the resolved content type.
    fn encode_body(&self, headers: &HeaderMap, payload: Option<Payload>) -> Result<Option<Body>> {
        let Some(payload) = payload else {
            return Ok(None);
        };

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(media_type);
        let formatter = self.inner.options.form_formatter;

        match content_type.as_deref() {
            Some("multipart/form-data") => {
                let form = formatter.format(&payload_fields(payload)?);
                Ok(Some(Body::Multipart(form)))
            }
            Some("application/x-www-form-urlencoded") => {
                let form = formatter.format(&payload_fields(payload)?);
                Ok(Some(Body::Bytes(form.to_query_string().into())))
            }
            _ => encode_json(payload),
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let options = &self.inner.options;
        f.debug_struct("Client")
            .field("base_url", &options.base_url.as_str())
            .field("headers", &options.headers)
            .field("middlewares", &options.middlewares.len())
            .field("retries", &options.retries)
            .field("form_formatter", &options.form_formatter)
            .finish()
    }
}

/// The media type of a `Content-Type` value, without parameters, lowercased.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn payload_fields(payload: Payload) -> Result<Params> {
    match payload {
        Payload::Fields(params) => Ok(params),
        Payload::Json(value) => Params::from_serialize(&value),
        Payload::Raw(_) => Err(Error::SerializationFailed(
            "an encoded body cannot be form-encoded".to_string(),
        )),
    }
}

/// JSON-serializes a payload. Absent and empty bodies send no payload at all.
fn encode_json(payload: Payload) -> Result<Option<Body>> {
    let value = match payload {
        Payload::Raw(bytes) if bytes.is_empty() => return Ok(None),
        Payload::Raw(bytes) => return Ok(Some(Body::Bytes(bytes))),
        Payload::Json(value) => value,
        Payload::Fields(params) => params.to_json(),
    };

    let empty = match &value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return Ok(None);
    }

    let bytes =
        serde_json::to_vec(&value).map_err(|e| Error::SerializationFailed(e.to_string()))?;
    Ok(Some(Body::Bytes(bytes.into())))
}

/// Builder for configuring and creating a [`Client`].
///
/// Every option is optional here, which lets the same type serve as the override
/// set for [`Client::with`]. Only [`build`](Self::build) requires a base URL.
///
/// # Examples
///
/// ```no_run
/// use openfetch::{retry::{AcceptSuccess, Backoff}, ClientBuilder, FormFormatter};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), openfetch::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com/v1")?
///     .default_header("User-Agent", "my-app/1.0")?
///     .retries(3)
///     .retry_condition(AcceptSuccess)
///     .backoff(Backoff::Constant(Duration::from_millis(100)))
///     .form_formatter(FormFormatter::Indexed)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    headers: HeaderMap,
    fetcher: Option<Arc<dyn Fetcher>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    retries: Option<usize>,
    retry_condition: Option<Arc<dyn RetryCondition>>,
    backoff: Option<Backoff>,
    form_formatter: Option<FormFormatter>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with nothing set.
    pub fn new() -> Self {
        Self {
            base_url: None,
            headers: HeaderMap::new(),
            fetcher: None,
            middlewares: Vec::new(),
            retries: None,
            retry_condition: None,
            backoff: None,
            form_formatter: None,
        }
    }

    /// Sets the base URL. Its path acts as a mount prefix for every operation path.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or cannot serve as a base.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        if url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "Base URL cannot be a base: {}",
                url
            )));
        }
        self.base_url = Some(url);
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Merges a whole header map into the default headers.
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets the terminal transport.
    ///
    /// Defaults to a [`ReqwestFetcher`].
    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Appends a middleware. Middlewares run in the order they are added.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Sets how many additional attempts may follow the first one.
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Sets the condition a response must meet to be accepted without retrying.
    pub fn retry_condition(mut self, condition: impl RetryCondition + 'static) -> Self {
        self.retry_condition = Some(Arc::new(condition));
        self
    }

    /// Sets the delay between attempts.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Sets the strategy used for query strings and form bodies.
    pub fn form_formatter(mut self, formatter: FormFormatter) -> Self {
        self.form_formatter = Some(formatter);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided or if the default fetcher
    /// cannot be created.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("Base URL is required".to_string()))?;

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ReqwestFetcher::new()?),
        };

        Ok(Client::from_options(ClientOptions {
            base_url,
            headers: self.headers,
            fetcher,
            middlewares: self.middlewares,
            retries: self.retries.unwrap_or(0),
            retry_condition: self.retry_condition,
            backoff: self.backoff.unwrap_or_default(),
            form_formatter: self.form_formatter.unwrap_or_default(),
        }))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
