//! # openfetch - schema-driven HTTP requests
//!
//! openfetch builds requests for HTTP APIs described by a schema (path templates,
//! methods, parameter groups) and dispatches them through a composable transport
//! pipeline: an ordered middleware chain around a bounded retry policy around a
//! terminal fetcher.
//!
//! ## Quick Start
//!
//! ```no_run
//! use openfetch::{Client, Operation, Part};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Pet {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), openfetch::Error> {
//!     let client = Client::builder()
//!         .base_url("https://petstore3.swagger.io/api/v3")?
//!         .default_header("Accept", "application/json")?
//!         .retries(2)
//!         .build()?;
//!
//!     // GET /pet/{petId}; the path group is mandatory
//!     let response = client
//!         .operation(Operation::get("/pet/{petId}").require(Part::Path))
//!         .path(&json!({ "petId": 10 }))
//!         .send()
//!         .await?;
//!     let pet: Pet = response.json()?;
//!
//!     // PUT /pet with a JSON body
//!     let updated = client.put("/pet").body(&pet).send().await?;
//!     println!("updated: {} after {} attempt(s)", updated.status, updated.attempts);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Incremental request building** - path, query, headers and body are set one
//!   at a time; mandatory groups are checked before sending
//! - **Encoding strategies** - repeat-key, join or indexed-path encoding for query
//!   strings and form bodies, selectable per client
//! - **Middleware chain** - interceptors run in registration order, once per
//!   logical request
//! - **Bounded retry** - on transport failures and on responses rejected by a
//!   condition; cancellation is never retried
//! - **Cancellation** - per-call [`AbortSignal`]s
//! - **Derived clients** - [`Client::with`] merges headers and appends middlewares
//!   without touching the original
//!
//! ## Middleware
//!
//! ```
//! use openfetch::{async_trait, Middleware, Next, RequestInit, Response, Result};
//!
//! struct Logging;
//!
//! #[async_trait]
//! impl Middleware for Logging {
//!     async fn handle(&self, url: String, init: RequestInit, next: Next<'_>) -> Result<Response> {
//!         let method = init.method.clone();
//!         let response = next.run(url.clone(), init).await?;
//!         println!("{} {} -> {}", method, url, response.status);
//!         Ok(response)
//!     }
//! }
//! ```

mod client;
pub mod encoding;
mod error;
pub mod fetcher;
pub mod metadata;
pub mod pipeline;
mod request;
mod response;
pub mod retry;
mod signal;

pub use async_trait::async_trait;
pub use client::{Client, ClientBuilder};
pub use encoding::{FilePart, FormData, FormFormatter, FormValue, IntoParams, Param, Params};
pub use error::{Error, Result};
pub use fetcher::{Fetcher, ReqwestFetcher};
pub use metadata::{Body, Extras, RequestInit, RequestState};
pub use pipeline::{Middleware, Next, Pipeline};
pub use request::{Operation, Part, Parts, RequestBuilder};
pub use response::Response;
pub use retry::{Backoff, RetryCondition, RetryPolicy};
pub use signal::{AbortController, AbortSignal};
