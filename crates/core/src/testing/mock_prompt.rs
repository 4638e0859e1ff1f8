//! Mock prompt service for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::services::{GeneratedPrompt, PromptRequest, PromptService, ServiceError};

/// Mock implementation of the PromptService trait.
///
/// By default every request succeeds with `"<description>, studio lighting"`
/// and no suggested identifier.
///
/// # Example
///
/// ```rust,ignore
/// use forge_core::testing::MockPromptService;
///
/// let prompts = MockPromptService::new();
/// prompts.set_identifier("chair_oak").await;
/// prompts.fail_for("broken", ServiceError::invalid("no prompt")).await;
/// ```
#[derive(Debug)]
pub struct MockPromptService {
    /// Recorded requests.
    requests: Arc<RwLock<Vec<PromptRequest>>>,
    /// Replies keyed by exact description.
    replies: Arc<RwLock<HashMap<String, GeneratedPrompt>>>,
    /// Suggested identifier for descriptions without a configured reply.
    identifier: Arc<RwLock<Option<String>>>,
    /// Descriptions containing the key fail with the error.
    failures: Arc<RwLock<Vec<(String, ServiceError)>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<ServiceError>>>,
    /// Simulated latency.
    delay: Arc<RwLock<Duration>>,
}

impl Default for MockPromptService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPromptService {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            replies: Arc::new(RwLock::new(HashMap::new())),
            identifier: Arc::new(RwLock::new(None)),
            failures: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// Get all recorded requests.
    pub async fn recorded_requests(&self) -> Vec<PromptRequest> {
        self.requests.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Reply with `reply` when the description matches exactly.
    pub async fn set_reply(&self, description: &str, reply: GeneratedPrompt) {
        self.replies
            .write()
            .await
            .insert(description.to_string(), reply);
    }

    /// Suggest `identifier` for every description without a configured reply.
    pub async fn set_identifier(&self, identifier: &str) {
        *self.identifier.write().await = Some(identifier.to_string());
    }

    /// Fail every request whose description contains `needle`.
    pub async fn fail_for(&self, needle: &str, error: ServiceError) {
        self.failures.write().await.push((needle.to_string(), error));
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: ServiceError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }
}

#[async_trait]
impl PromptService for MockPromptService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: PromptRequest) -> Result<GeneratedPrompt, ServiceError> {
        self.requests.write().await.push(request.clone());

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if let Some((_, error)) = self
            .failures
            .read()
            .await
            .iter()
            .find(|(needle, _)| request.description.contains(needle.as_str()))
        {
            return Err(error.clone());
        }
        if let Some(reply) = self.replies.read().await.get(&request.description) {
            return Ok(reply.clone());
        }

        Ok(GeneratedPrompt {
            prompt: format!("{}, studio lighting", request.description),
            negative_prompt: "blurry".to_string(),
            analysis: Some(format!("Analysis of {}", request.description)),
            confidence: Some("HIGH".to_string()),
            detected_domain: request.effective_domain().as_str().to_string(),
            style: request.style.unwrap_or_default().as_str().to_string(),
            suggested_identifier: self.identifier.read().await.clone(),
        })
    }
}
