//! Request state and the descriptor handed to the transport.

use crate::{encoding::FormData, signal::AbortSignal, Params};
use bytes::Bytes;
use http::{HeaderMap, Method};
use serde_json::Value;
use std::time::Duration;

/// The payload slot of a [`RequestState`].
///
/// How a payload is encoded is decided at send time from the resolved
/// `Content-Type` header.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A JSON document set through `body()`.
    Json(Value),
    /// A field mapping set through `form()` or `multipart()`.
    Fields(Params),
    /// Bytes that are already encoded.
    Raw(Bytes),
}

/// Per-call transport directives that are not part of the logical request.
///
/// Extras are forwarded to the terminal fetcher unchanged.
#[derive(Debug, Clone, Default)]
pub struct Extras {
    /// Aborts the call when fired.
    pub signal: Option<AbortSignal>,
    /// Overrides the fetcher's default timeout for this call.
    pub timeout: Option<Duration>,
}

/// Everything the request builder has accumulated for one call.
#[derive(Debug, Clone, Default)]
pub struct RequestState {
    /// Values substituted into `{name}` tokens of the path template.
    pub path: Params,

    /// Query parameters, encoded by the client's form formatter.
    pub query: Params,

    /// Request headers. These win over the client's default headers.
    pub headers: HeaderMap,

    /// The request body, if any.
    pub body: Option<Payload>,

    pub extras: Extras,
}

/// An encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// An encoded payload (JSON, URL-encoded form or raw bytes).
    Bytes(Bytes),
    /// A multipart container. The transport chooses the boundary.
    Multipart(FormData),
}

impl Body {
    /// Returns the encoded bytes, or `None` for multipart bodies.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Bytes(bytes) => Some(bytes),
            Body::Multipart(_) => None,
        }
    }
}

/// The request descriptor passed through middlewares to the fetcher.
///
/// Middlewares may rewrite any field before continuing the chain.
#[derive(Debug, Clone)]
pub struct RequestInit {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Body>,
    pub extras: Extras,
}

impl RequestInit {
    /// Creates a descriptor with no headers, body or extras.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
            extras: Extras::default(),
        }
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl Default for RequestInit {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}
