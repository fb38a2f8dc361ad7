//! Responses returned by the transport pipeline.
//!
//! A [`Response`] holds the status, headers and raw body of the final attempt along
//! with metadata about the logical request: how many attempts were made and how long
//! they took. Decoding the body is deferred to [`Response::text`] and
//! [`Response::json`].

use crate::{Error, Result};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// An HTTP response, successful or not.
///
/// Non-2xx statuses are not errors at this level; check [`Response::ok`].
///
/// # Examples
///
/// ```no_run
/// use openfetch::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Pet {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), openfetch::Error> {
/// let client = Client::builder()
///     .base_url("https://petstore3.swagger.io/api/v3")?
///     .build()?;
///
/// let response = client
///     .get("/pet/{petId}")
///     .path(&serde_json::json!({ "petId": 10 }))
///     .send()
///     .await?;
///
/// if response.ok() {
///     let pet: Pet = response.json()?;
///     println!("{} took {:?}", pet.name, response.latency);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The raw response body.
    pub body: Bytes,

    /// The total latency of the logical request, including all retry attempts.
    pub latency: Duration,

    /// The number of attempts made to complete this request.
    ///
    /// This will be `1` for requests that completed on the first try.
    pub attempts: usize,
}

impl Response {
    /// Creates an empty response with the given status.
    ///
    /// This is mostly useful for fetchers and middlewares that answer without
    /// touching the network.
    ///
    /// # Examples
    ///
    /// ```
    /// # use openfetch::Response;
    /// # use http::StatusCode;
    /// let response = Response::new(StatusCode::CREATED).with_body(r#"{"id":1}"#);
    ///
    /// assert!(response.ok());
    /// assert_eq!(response.text().unwrap(), r#"{"id":1}"#);
    /// ```
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            latency: Duration::ZERO,
            attempts: 1,
        }
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Returns `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Decodes the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] if the body is not valid UTF-8.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| Error::DeserializationFailed {
            raw_response: String::from_utf8_lossy(&self.body).into_owned(),
            serde_error: e.to_string(),
            status: self.status,
        })
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the raw body preserved if the
    /// body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            let raw_response = String::from_utf8_lossy(&self.body).into_owned();
            tracing::error!(
                error = %e,
                raw_response = %raw_response,
                "Failed to deserialize response"
            );
            Error::DeserializationFailed {
                raw_response,
                serde_error: e.to_string(),
                status: self.status,
            }
        })
    }

    /// Returns the raw body.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a reference to a header value by name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use openfetch::Response;
    /// # use http::StatusCode;
    /// let response = Response::new(StatusCode::OK)
    ///     .with_header("content-type", "application/json")
    ///     .unwrap();
    ///
    /// assert_eq!(response.header("content-type"), Some("application/json"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pet {
        id: u32,
        name: String,
    }

    #[test]
    fn test_ok_follows_status_class() {
        assert!(Response::new(StatusCode::OK).ok());
        assert!(Response::new(StatusCode::NO_CONTENT).ok());
        assert!(!Response::new(StatusCode::NOT_FOUND).ok());
        assert!(!Response::new(StatusCode::INTERNAL_SERVER_ERROR).ok());
    }

    #[test]
    fn test_json_decodes_body() {
        let response = Response::new(StatusCode::OK).with_body(r#"{"id":1,"name":"doggie"}"#);
        let pet: Pet = response.json().unwrap();
        assert_eq!(
            pet,
            Pet {
                id: 1,
                name: "doggie".to_string()
            }
        );
    }

    #[test]
    fn test_json_failure_keeps_raw_body() {
        let response = Response::new(StatusCode::OK).with_body("invalid json");
        match response.json::<Pet>() {
            Err(Error::DeserializationFailed {
                raw_response,
                status,
                ..
            }) => {
                assert_eq!(raw_response, "invalid json");
                assert_eq!(status, StatusCode::OK);
            }
            other => panic!("Expected DeserializationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_was_retried() {
        let mut response = Response::new(StatusCode::OK);
        assert!(!response.was_retried());
        response.attempts = 3;
        assert!(response.was_retried());
    }
}
