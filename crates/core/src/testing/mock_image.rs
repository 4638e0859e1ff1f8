//! Mock image service for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::services::{ImageService, ServiceError};

/// PNG signature every mock image starts with.
pub const MOCK_PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n";

/// A recorded image request for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedImageRequest {
    pub prompt: String,
    pub negative_prompt: String,
}

/// Mock implementation of the ImageService trait.
///
/// Returns [`MOCK_PNG_HEADER`] followed by the prompt bytes, so later
/// stages can tell images apart. Tracks the highest number of calls in
/// flight at once.
#[derive(Debug)]
pub struct MockImageService {
    requests: Arc<RwLock<Vec<RecordedImageRequest>>>,
    /// Prompts containing the key fail with the error.
    failures: Arc<RwLock<Vec<(String, ServiceError)>>>,
    /// Prompts containing any of these panic.
    panics: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<ServiceError>>>,
    delay: Arc<RwLock<Duration>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockImageService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImageService {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(Vec::new())),
            panics: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn recorded_requests(&self) -> Vec<RecordedImageRequest> {
        self.requests.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Fail every request whose prompt contains `needle`.
    pub async fn fail_for(&self, needle: &str, error: ServiceError) {
        self.failures.write().await.push((needle.to_string(), error));
    }

    /// Panic inside `generate` for prompts containing `needle`.
    pub async fn panic_for(&self, needle: &str) {
        self.panics.write().await.push(needle.to_string());
    }

    pub async fn set_next_error(&self, error: ServiceError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Highest number of concurrent `generate` calls observed.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Bytes the mock returns for `prompt`.
    pub fn image_for(prompt: &str) -> Vec<u8> {
        let mut bytes = MOCK_PNG_HEADER.to_vec();
        bytes.extend_from_slice(prompt.as_bytes());
        bytes
    }
}

/// Decrements the in-flight counter even if the call panics.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageService for MockImageService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        prompt: &str,
        negative_prompt: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlight(Arc::clone(&self.in_flight));

        self.requests.write().await.push(RecordedImageRequest {
            prompt: prompt.to_string(),
            negative_prompt: negative_prompt.to_string(),
        });

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let should_panic = self
            .panics
            .read()
            .await
            .iter()
            .any(|needle| prompt.contains(needle.as_str()));
        if should_panic {
            panic!("mock image service panicked for prompt {:?}", prompt);
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if let Some((_, error)) = self
            .failures
            .read()
            .await
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
        {
            return Err(error.clone());
        }

        Ok(Self::image_for(prompt))
    }
}
