//! Error types for request construction and dispatch.
//!
//! Every failure the pipeline can surface is a variant of [`Error`]. Configuration
//! problems are reported before any network activity, transport failures carry the
//! underlying cause, and cancellation is kept distinct so it is never retried.

use crate::request::Part;
use http::StatusCode;

/// The main error type for building and sending requests.
///
/// # Examples
///
/// ```no_run
/// use openfetch::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://petstore3.swagger.io/api/v3")?
///     .build()?;
///
/// match client.get("/pet/{petId}").path(&serde_json::json!({"petId": 1})).send().await {
///     Ok(response) if response.ok() => println!("pet: {}", response.text()?),
///     Ok(response) => eprintln!("unexpected status {}", response.status),
///     Err(Error::Cancelled) => eprintln!("request was aborted"),
///     Err(e) => eprintln!("request failed: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error reported by the reqwest transport.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// A custom transport failed.
    ///
    /// Fetchers other than the built-in reqwest one report their failures here.
    #[error("Transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),

    /// The call was aborted through its [`AbortSignal`](crate::AbortSignal).
    ///
    /// Never retried, whatever retry budget remains.
    #[error("Request was cancelled")]
    Cancelled,

    /// `send()` was called before every mandatory parameter group was set.
    #[error("Incomplete request, missing: {}", display_parts(.missing))]
    IncompleteRequest {
        /// The mandatory parts that were never set
        missing: Vec<Part>,
    },

    /// Invalid configuration was provided.
    ///
    /// This covers malformed base URLs, paths that do not resolve against the base
    /// URL, and invalid header names or values.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A request parameter or body could not be converted.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize the response body into the expected type.
    ///
    /// # Fields
    ///
    /// * `raw_response` - The raw response body as a string
    /// * `serde_error` - The error message from serde
    /// * `status` - The HTTP status code of the response
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

fn display_parts(parts: &[Part]) -> String {
    parts
        .iter()
        .map(|part| part.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Wraps an arbitrary failure from a custom fetcher.
    ///
    /// ```
    /// use openfetch::Error;
    ///
    /// let err = Error::transport("connection reset");
    /// assert!(err.is_retryable());
    /// ```
    pub fn transport(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Transport(error.into())
    }

    /// Returns `true` if the retry policy may re-attempt after this error.
    ///
    /// Every failure of an attempt is retryable except cancellation.
    ///
    /// # Examples
    ///
    /// ```
    /// use openfetch::Error;
    ///
    /// assert!(Error::Timeout.is_retryable());
    /// assert!(Error::SerializationFailed("decode failed".to_string()).is_retryable());
    /// assert!(!Error::Cancelled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        !self.is_cancelled()
    }

    /// Returns `true` if this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::DeserializationFailed { status, .. } => Some(*status),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Maps a reqwest failure, keeping timeouts distinct from other network errors.
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(error)
        }
    }
}

/// A specialized `Result` type for building and sending requests.
///
/// This is a convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
