//! Incremental request construction.
//!
//! A [`RequestBuilder`] accumulates the four parts of a request (path parameters,
//! query parameters, headers and body) for one [`Operation`]. The operation declares
//! which parts are mandatory; [`RequestBuilder::send`] refuses to dispatch until
//! each of them has been set at least once. Setting a part to an empty mapping
//! still counts as setting it.

use crate::{
    encoding::{IntoParams, Param},
    metadata::{Payload, RequestState},
    signal::AbortSignal,
    Client, Error, Params, Response, Result,
};
use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// One of the parameter groups of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    Path,
    Query,
    Headers,
    Body,
}

impl Part {
    pub const ALL: [Part; 4] = [Part::Path, Part::Query, Part::Headers, Part::Body];

    pub fn as_str(&self) -> &'static str {
        match self {
            Part::Path => "path",
            Part::Query => "query",
            Part::Headers => "headers",
            Part::Body => "body",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Part::Path => 1,
            Part::Query => 1 << 1,
            Part::Headers => 1 << 2,
            Part::Body => 1 << 3,
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of [`Part`]s.
///
/// # Examples
///
/// ```
/// use openfetch::{Part, Parts};
///
/// let required: Parts = [Part::Path, Part::Body].into_iter().collect();
/// let used = Parts::NONE.with(Part::Path);
///
/// assert_eq!(used.missing_from(required), vec![Part::Body]);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Parts(u8);

impl Parts {
    pub const NONE: Parts = Parts(0);

    /// Returns the set with `part` added.
    pub fn with(self, part: Part) -> Self {
        Parts(self.0 | part.bit())
    }

    pub fn contains(self, part: Part) -> bool {
        self.0 & part.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Part> {
        Part::ALL.into_iter().filter(move |part| self.contains(*part))
    }

    /// Returns the parts of `required` this set lacks.
    pub fn missing_from(self, required: Parts) -> Vec<Part> {
        required.iter().filter(|part| !self.contains(*part)).collect()
    }
}

impl From<Part> for Parts {
    fn from(part: Part) -> Self {
        Parts::NONE.with(part)
    }
}

impl FromIterator<Part> for Parts {
    fn from_iter<I: IntoIterator<Item = Part>>(iter: I) -> Self {
        iter.into_iter().fold(Parts::NONE, Parts::with)
    }
}

/// A single method + path pair of the target API.
///
/// This is the schema binding: it names the path template and the parameter
/// groups that must be supplied before the request may be sent.
///
/// # Examples
///
/// ```
/// use openfetch::{Operation, Part};
///
/// let get_pet = Operation::get("/pet/{petId}").require(Part::Path);
/// assert!(get_pet.required.contains(Part::Path));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub method: Method,
    /// The path template, with `{name}` placeholders.
    pub path: String,
    /// The parameter groups that must be set before sending.
    pub required: Parts,
}

impl Operation {
    /// Creates an operation with no mandatory parameter groups.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            required: Parts::NONE,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Marks a parameter group as mandatory.
    pub fn require(mut self, part: Part) -> Self {
        self.required = self.required.with(part);
        self
    }
}

const APPLICATION_JSON: &str = "application/json";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// A fluent builder for one request.
///
/// Setters never fail on the spot; the first conversion error is kept and returned
/// by [`send`](Self::send).
///
/// # Examples
///
/// ```no_run
/// use openfetch::{Client, Operation, Part};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), openfetch::Error> {
/// let client = Client::builder()
///     .base_url("https://petstore3.swagger.io/api/v3")?
///     .build()?;
///
/// let response = client
///     .operation(Operation::delete("/pet/{petId}").require(Part::Path))
///     .path(&json!({ "petId": 10 }))
///     .headers(&json!({ "api_key": "123" }))
///     .send()
///     .await?;
///
/// assert!(response.ok());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RequestBuilder {
    client: Client,
    operation: Operation,
    state: RequestState,
    used: Parts,
    error: Option<Error>,
}

impl RequestBuilder {
    pub(crate) fn new(client: Client, operation: Operation) -> Self {
        Self {
            client,
            operation,
            state: RequestState::default(),
            used: Parts::NONE,
            error: None,
        }
    }

    /// Sets the path parameters, replacing any set before.
    pub fn path(mut self, params: impl IntoParams) -> Self {
        self.mark(Part::Path);
        if let Some(params) = self.record(params.into_params()) {
            self.state.path = params;
        }
        self
    }

    /// Sets the query parameters, replacing any set before.
    pub fn query(mut self, params: impl IntoParams) -> Self {
        self.mark(Part::Query);
        if let Some(params) = self.record(params.into_params()) {
            self.state.query = params;
        }
        self
    }

    /// Merges headers into the request. Later values win per header name.
    pub fn headers(mut self, params: impl IntoParams) -> Self {
        self.mark(Part::Headers);
        if let Some(params) = self.record(params.into_params()) {
            for (name, value) in params.iter() {
                let header = header_pair(name, value);
                if let Some(Some((name, value))) = self.record(header) {
                    self.state.headers.insert(name, value);
                }
            }
        }
        self
    }

    /// Sets a single header. Counts as setting the headers part.
    pub fn header(self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.headers(Params::new().with(name.as_ref(), value.as_ref()))
    }

    /// Sets a JSON body and `Content-Type: application/json`.
    ///
    /// Replaces any body or form set before.
    pub fn body<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.mark(Part::Body);
        let value = serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()));
        if let Some(value) = self.record(value) {
            self.set_payload(Payload::Json(value), APPLICATION_JSON);
        }
        self
    }

    /// Sets a URL-encoded form body and
    /// `Content-Type: application/x-www-form-urlencoded`.
    ///
    /// Replaces any body set before.
    pub fn form(mut self, params: impl IntoParams) -> Self {
        self.mark(Part::Body);
        if let Some(params) = self.record(params.into_params()) {
            self.set_payload(Payload::Fields(params), FORM_URLENCODED);
        }
        self
    }

    /// Sets a multipart body, which may carry file parts, and
    /// `Content-Type: multipart/form-data`.
    ///
    /// Replaces any body set before.
    pub fn multipart(mut self, params: impl IntoParams) -> Self {
        self.mark(Part::Body);
        if let Some(params) = self.record(params.into_params()) {
            self.set_payload(Payload::Fields(params), MULTIPART_FORM_DATA);
        }
        self
    }

    /// Sets an already-encoded body with its content type.
    pub fn raw_body(mut self, content_type: impl AsRef<str>, bytes: impl Into<Bytes>) -> Self {
        self.mark(Part::Body);
        match HeaderValue::try_from(content_type.as_ref()) {
            Ok(content_type) => {
                self.state.body = Some(Payload::Raw(bytes.into()));
                self.state.headers.insert(CONTENT_TYPE, content_type);
            }
            Err(e) => {
                self.record::<()>(Err(Error::Configuration(format!(
                    "Invalid header value: {}",
                    e
                ))));
            }
        }
        self
    }

    /// Attaches an abort signal to the call.
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.state.extras.signal = Some(signal);
        self
    }

    /// Overrides the fetcher's timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.state.extras.timeout = Some(timeout);
        self
    }

    /// The parts set so far.
    pub fn parts(&self) -> Parts {
        self.used
    }

    /// The mandatory parts not set yet.
    pub fn missing(&self) -> Vec<Part> {
        self.used.missing_from(self.operation.required)
    }

    /// Returns `true` once every mandatory part has been set.
    pub fn is_ready(&self) -> bool {
        self.missing().is_empty()
    }

    /// The state accumulated so far.
    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Dispatches the request through the client's pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first conversion error recorded by a setter,
    /// [`Error::IncompleteRequest`] if a mandatory part was never set, or whatever
    /// the pipeline reports.
    pub async fn send(mut self) -> Result<Response> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        let missing = self.missing();
        if !missing.is_empty() {
            return Err(Error::IncompleteRequest { missing });
        }

        self.client.dispatch(&self.operation, self.state).await
    }

    fn mark(&mut self, part: Part) {
        if self.used.contains(part) {
            tracing::debug!(
                part = part.as_str(),
                path = %self.operation.path,
                "Overwriting request part"
            );
        }
        self.used = self.used.with(part);
    }

    /// Keeps the first error and turns results into options.
    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.error.get_or_insert(e);
                None
            }
        }
    }

    fn set_payload(&mut self, payload: Payload, content_type: &'static str) {
        self.state.body = Some(payload);
        self.state
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
}

/// Converts one header parameter. Nulls yield `None`.
fn header_pair(name: &str, value: &Param) -> Result<Option<(HeaderName, HeaderValue)>> {
    let text = match value {
        Param::Null => return Ok(None),
        Param::File(_) => {
            return Err(Error::SerializationFailed(format!(
                "header {} cannot carry a file",
                name
            )))
        }
        scalar => scalar
            .as_scalar_string()
            .unwrap_or_else(|| scalar.to_json().to_string()),
    };
    let name = HeaderName::try_from(name)
        .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
    let value = HeaderValue::try_from(text)
        .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
    Ok(Some((name, value)))
}
