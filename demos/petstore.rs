//! Talks to the public Swagger petstore.
//!
//! Run with `RUST_LOG=openfetch=debug cargo run --example petstore`.

use openfetch::retry::RejectServerErrors;
use openfetch::{
    async_trait, Backoff, Client, Middleware, Next, Operation, Part, RequestInit, Response,
    Result,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};

#[derive(Debug, Serialize, Deserialize)]
struct Pet {
    id: u64,
    name: String,
    #[serde(rename = "photoUrls", default)]
    photo_urls: Vec<String>,
    #[serde(default)]
    status: Option<String>,
}

struct Timing;

#[async_trait]
impl Middleware for Timing {
    async fn handle(&self, url: String, init: RequestInit, next: Next<'_>) -> Result<Response> {
        let method = init.method.clone();
        let start = Instant::now();
        let result = next.run(url.clone(), init).await;
        tracing::info!(
            method = %method,
            url = %url,
            elapsed_ms = start.elapsed().as_millis(),
            ok = result.as_ref().map(Response::ok).unwrap_or(false),
            "Request finished"
        );
        result
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let client = Client::builder()
        .base_url("https://petstore3.swagger.io/api/v3")?
        .default_header("Accept", "application/json")?
        .middleware(Timing)
        .retries(2)
        .retry_condition(RejectServerErrors)
        .backoff(Backoff::Exponential {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            jitter: true,
        })
        .build()?;

    let pet = Pet {
        id: 4242,
        name: "doggie".to_string(),
        photo_urls: vec!["https://example.com/doggie.png".to_string()],
        status: Some("available".to_string()),
    };

    let created = client.post("/pet").body(&pet).send().await?;
    println!("POST /pet -> {}", created.status);

    let response = client
        .operation(Operation::get("/pet/{petId}").require(Part::Path))
        .path(&json!({ "petId": pet.id }))
        .send()
        .await?;
    if response.ok() {
        let fetched: Pet = response.json()?;
        println!("GET /pet/{} -> {:?}", pet.id, fetched);
    } else {
        println!("GET /pet/{} -> {}", pet.id, response.status);
    }

    let available = client
        .get("/pet/findByStatus")
        .query(&json!({ "status": "available" }))
        .send()
        .await?;
    println!(
        "GET /pet/findByStatus -> {} ({} bytes, {} attempt(s))",
        available.status,
        available.bytes().len(),
        available.attempts
    );

    let deleted = client
        .delete("/pet/{petId}")
        .path(&json!({ "petId": pet.id }))
        .header("api_key", "special-key")
        .send()
        .await?;
    println!("DELETE /pet/{} -> {}", pet.id, deleted.status);

    Ok(())
}
