//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! with mock generation services, so API tests run without network access.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use forge_core::testing::{
    fixtures, MockAssociationService, MockImageService, MockModelService, MockPromptService,
};
use forge_core::{BatchConfig, BatchManager, Config, PipelineConfig, PipelineRunner};
use forge_server::{create_router, AppState};

/// Test fixture with mock generation services.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_generate() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/generate", json!({
///         "description": "oak dining chair"
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub prompts: Arc<MockPromptService>,
    pub images: Arc<MockImageService>,
    pub models: Arc<MockModelService>,
    /// Only wired in when the fixture has services
    pub associations: Arc<MockAssociationService>,
    /// Single job output directory
    pub output_dir: PathBuf,
    /// Batch output directory
    pub batch_dir: PathBuf,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Wire the mock services into the runner
    pub with_services: bool,
    pub max_parallel: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            with_services: true,
            max_parallel: 2,
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub fn new() -> Self {
        Self::with_config(TestConfig::default())
    }

    /// Create a test fixture whose runner has no services configured.
    pub fn without_services() -> Self {
        Self::with_config(TestConfig {
            with_services: false,
            ..Default::default()
        })
    }

    pub fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let output_dir = temp_dir.path().join("output");
        let batch_dir = temp_dir.path().join("batch");

        let prompts = Arc::new(MockPromptService::new());
        let images = Arc::new(MockImageService::new());
        let models = Arc::new(MockModelService::new());
        let associations = Arc::new(MockAssociationService::new());

        let mut config = Config::default();
        config.output.dir = output_dir.clone();
        config.output.batch_dir = batch_dir.clone();
        config.batch.max_parallel = test_config.max_parallel;

        let runner = if test_config.with_services {
            fixtures::pipeline_runner(
                &output_dir,
                Arc::clone(&prompts),
                Arc::clone(&images),
                Arc::clone(&models),
            )
        } else {
            PipelineRunner::new(PipelineConfig::from(&config))
        };
        let runner = Arc::new(runner);
        let batches = BatchManager::new(BatchConfig::from(&config), Arc::clone(&runner));

        let mut state = AppState::new(config, runner, batches);
        if test_config.with_services {
            state = state.with_association_service(associations.clone());
        }
        let router = create_router(Arc::new(state));

        Self {
            router,
            prompts,
            images,
            models,
            associations,
            output_dir,
            batch_dir,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let (status, bytes) = self.get_bytes(path).await;
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a GET request and return the raw body bytes.
    pub async fn get_bytes(&self, path: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, bytes.to_vec())
    }

    /// Poll a job's progress until it holds a final record.
    pub async fn wait_for_job(&self, handle: &str) -> Value {
        for _ in 0..400 {
            let response = self.get(&format!("/api/v1/jobs/{}/progress", handle)).await;
            if !response.body["result"].is_null() {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", handle);
    }

    /// Poll a batch's status until every item is terminal.
    pub async fn wait_for_batch(&self, batch_id: &str) -> Value {
        for _ in 0..400 {
            let response = self.get(&format!("/api/v1/batch/{}/status", batch_id)).await;
            let progress = &response.body["progress"];
            let total = progress["total"].as_u64().unwrap_or(0);
            let done = progress["completed"].as_u64().unwrap_or(0)
                + progress["failed"].as_u64().unwrap_or(0);
            if total > 0 && done == total {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch {} did not finish", batch_id);
    }

    /// Poll until the batch index file exists.
    pub async fn wait_for_index(&self, batch_id: &str) {
        let path = self.batch_dir.join(batch_id).join("index.json");
        for _ in 0..400 {
            if path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("index of batch {} was not written", batch_id);
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
