//! Pipeline behaviour with in-process fetchers: retry accounting, middleware
//! ordering, cancellation and derived clients.

use http::StatusCode;
use openfetch::{
    async_trait, AbortController, Backoff, Body, Client, Error, Fetcher, Middleware, Next,
    Operation, Part, RequestInit, Response, Result,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const BASE: &str = "https://petstore.test/api/v3";

/// Answers every attempt with `status` and counts the calls.
fn status_fetcher(calls: Arc<AtomicUsize>, status: StatusCode) -> impl Fetcher {
    move |_url: String, _init: RequestInit| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(Response::new(status))
        }
    }
}

/// Fails every attempt with a transport error and counts the calls.
fn failing_fetcher(calls: Arc<AtomicUsize>) -> impl Fetcher {
    move |_url: String, _init: RequestInit| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<Response, _>(Error::transport("connection reset"))
        }
    }
}

/// Mirrors the URL, headers and body it received back into the response.
fn echo_fetcher(url: String, init: RequestInit) -> impl std::future::Future<Output = Result<Response>> {
    async move {
        let body = init
            .body
            .as_ref()
            .and_then(Body::as_bytes)
            .map(|bytes| bytes.to_vec())
            .unwrap_or_default();
        let mut response = Response::new(StatusCode::OK).with_body(body);
        response.headers = init.headers;
        response = response.with_header("x-echo-url", url)?;
        Ok(response)
    }
}

fn client(fetcher: impl Fetcher + 'static, retries: usize) -> Client {
    Client::builder()
        .base_url(BASE)
        .unwrap()
        .fetcher(fetcher)
        .retries(retries)
        .build()
        .unwrap()
}

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Middleware for Recorder {
    async fn handle(&self, url: String, mut init: RequestInit, next: Next<'_>) -> Result<Response> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} saw {}", self.name, url));
        init.headers
            .append("x-trail", http::HeaderValue::from_static(self.name));

        let response = next.run(format!("{}/{}", url, self.name), init).await;

        self.log.lock().unwrap().push(format!("{} done", self.name));
        response
    }
}

struct Teapot;

#[async_trait]
impl Middleware for Teapot {
    async fn handle(&self, _url: String, _init: RequestInit, _next: Next<'_>) -> Result<Response> {
        Ok(Response::new(StatusCode::IM_A_TEAPOT))
    }
}

#[tokio::test]
async fn test_zero_retries_makes_single_attempt() {
    let calls = Arc::new(AtomicUsize::new(0));
    let result = client(failing_fetcher(calls.clone()), 0)
        .get("/store/inventory")
        .send()
        .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let calls = Arc::new(AtomicUsize::new(0));
    let response = client(status_fetcher(calls.clone(), StatusCode::OK), 0)
        .get("/store/inventory")
        .send()
        .await
        .unwrap();
    assert_eq!(response.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transport_failures_exhaust_attempt_budget() {
    let calls = Arc::new(AtomicUsize::new(0));

    let result = client(failing_fetcher(calls.clone()), 3)
        .get("/store/inventory")
        .send()
        .await;

    assert!(matches!(result, Err(Error::Transport(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_rejecting_condition_returns_last_response() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .base_url(BASE)
        .unwrap()
        .fetcher(status_fetcher(calls.clone(), StatusCode::SERVICE_UNAVAILABLE))
        .retries(2)
        .retry_condition(|_response: &Response| false)
        .build()
        .unwrap();

    let response = client.get("/store/inventory").send().await.unwrap();

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_middleware_runs_once_per_logical_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));
    let client = Client::builder()
        .base_url(BASE)
        .unwrap()
        .fetcher(failing_fetcher(calls.clone()))
        .middleware(Recorder {
            name: "A",
            log: log.clone(),
        })
        .retries(2)
        .build()
        .unwrap();

    let result = client.get("/pet/1").send().await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_middlewares_run_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let client = Client::builder()
        .base_url(BASE)
        .unwrap()
        .fetcher(echo_fetcher)
        .middleware(Recorder {
            name: "A",
            log: log.clone(),
        })
        .middleware(Recorder {
            name: "B",
            log: log.clone(),
        })
        .build()
        .unwrap();

    let response = client.get("/pet/1").send().await.unwrap();

    assert_eq!(
        response.header("x-echo-url"),
        Some("https://petstore.test/api/v3/pet/1/A/B")
    );
    let trail: Vec<_> = response
        .headers
        .get_all("x-trail")
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect();
    assert_eq!(trail, vec!["A", "B"]);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "A saw https://petstore.test/api/v3/pet/1",
            "B saw https://petstore.test/api/v3/pet/1/A",
            "B done",
            "A done",
        ]
    );
}

#[tokio::test]
async fn test_short_circuit_middleware_skips_fetcher() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .base_url(BASE)
        .unwrap()
        .fetcher(status_fetcher(calls.clone(), StatusCode::OK))
        .middleware(Teapot)
        .build()
        .unwrap();

    let response = client.get("/pet/1").send().await.unwrap();

    assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_abort_during_attempt_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let fetcher = move |_url: String, init: RequestInit| {
        let calls = calls_clone.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if let Some(signal) = init.extras.signal.clone() {
                signal.aborted().await;
            }
            Err::<Response, _>(Error::transport("connection dropped"))
        }
    };
    let client = client(fetcher, 3);
    let controller = AbortController::new();
    let signal = controller.signal();

    let task = tokio::spawn(async move { client.get("/pet/1").signal(signal).send().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.abort();

    let result = task.await.unwrap();

    assert!(matches!(result, Err(Error::Cancelled)), "got {:?}", result);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_abort_interrupts_backoff() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .base_url(BASE)
        .unwrap()
        .fetcher(failing_fetcher(calls.clone()))
        .retries(3)
        .backoff(Backoff::Constant(Duration::from_secs(10)))
        .build()
        .unwrap();
    let controller = AbortController::new();
    let signal = controller.signal();

    let start = Instant::now();
    let task = tokio::spawn(async move { client.get("/pet/1").signal(signal).send().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.abort();

    let result = task.await.unwrap();

    assert!(matches!(result, Err(Error::Cancelled)), "got {:?}", result);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_constant_backoff_waits_between_attempts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder()
        .base_url(BASE)
        .unwrap()
        .fetcher(failing_fetcher(calls.clone()))
        .retries(2)
        .backoff(Backoff::Constant(Duration::from_millis(20)))
        .build()
        .unwrap();

    let start = Instant::now();
    let result = client.get("/pet/1").send().await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[tokio::test]
async fn test_derived_client_merges_headers_and_middlewares() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let base = Client::builder()
        .base_url(BASE)
        .unwrap()
        .fetcher(echo_fetcher)
        .default_header("x-a", "1")
        .unwrap()
        .default_header("x-b", "1")
        .unwrap()
        .middleware(Recorder {
            name: "A",
            log: log.clone(),
        })
        .build()
        .unwrap();

    let derived = base.with(
        Client::builder()
            .default_header("x-b", "2")
            .unwrap()
            .default_header("x-c", "3")
            .unwrap()
            .middleware(Recorder {
                name: "B",
                log: log.clone(),
            }),
    );

    let response = derived.get("/pet/1").send().await.unwrap();
    assert_eq!(response.header("x-a"), Some("1"));
    assert_eq!(response.header("x-b"), Some("2"));
    assert_eq!(response.header("x-c"), Some("3"));
    assert_eq!(
        response.header("x-echo-url"),
        Some("https://petstore.test/api/v3/pet/1/A/B")
    );

    let response = base.get("/pet/1").send().await.unwrap();
    assert_eq!(response.header("x-b"), Some("1"));
    assert_eq!(response.header("x-c"), None);
    assert_eq!(
        response.header("x-echo-url"),
        Some("https://petstore.test/api/v3/pet/1/A")
    );
}

#[tokio::test]
async fn test_request_headers_override_defaults() {
    let client = Client::builder()
        .base_url(BASE)
        .unwrap()
        .fetcher(echo_fetcher)
        .default_header("api_key", "default")
        .unwrap()
        .build()
        .unwrap();

    let response = client
        .delete("/pet/1")
        .headers(&json!({ "api_key": "special" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.header("api_key"), Some("special"));
}

#[tokio::test]
async fn test_last_body_setter_wins() {
    let client = client(echo_fetcher, 0);

    let response = client
        .post("/pet")
        .body(&json!({ "name": "ignored" }))
        .form(&json!({ "name": "doggie", "status": "available" }))
        .send()
        .await
        .unwrap();

    assert_eq!(
        response.header("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(response.text().unwrap(), "name=doggie&status=available");
}

#[tokio::test]
async fn test_incomplete_request_never_calls_fetcher() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = client(status_fetcher(calls.clone(), StatusCode::OK), 2);

    let builder = client
        .operation(
            Operation::put("/pet/{petId}")
                .require(Part::Path)
                .require(Part::Body),
        )
        .path(&json!({ "petId": 1 }));
    assert!(!builder.is_ready());
    assert_eq!(builder.missing(), vec![Part::Body]);

    let result = builder.send().await;

    match result {
        Err(Error::IncompleteRequest { missing }) => assert_eq!(missing, vec![Part::Body]),
        other => panic!("expected IncompleteRequest, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failure_after_abort_reports_cancelled_without_retries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = client(failing_fetcher(calls.clone()), 0);
    let controller = AbortController::new();
    controller.abort();

    let result = client.get("/pet/1").signal(controller.signal()).send().await;

    assert!(matches!(result, Err(Error::Cancelled)), "got {:?}", result);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_any_fetcher_error_except_cancellation_is_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let fetcher = move |_url: String, _init: RequestInit| {
        let calls = calls_clone.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<Response, _>(Error::SerializationFailed("decode failed".to_string()))
        }
    };

    let result = client(fetcher, 2).get("/store/inventory").send().await;

    assert!(
        matches!(result, Err(Error::SerializationFailed(ref message)) if message == "decode failed"),
        "got {:?}",
        result
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cancelled_from_fetcher_is_never_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let fetcher = move |_url: String, _init: RequestInit| {
        let calls = calls_clone.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<Response, _>(Error::Cancelled)
        }
    };

    let result = client(fetcher, 3).get("/store/inventory").send().await;

    assert!(matches!(result, Err(Error::Cancelled)), "got {:?}", result);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
