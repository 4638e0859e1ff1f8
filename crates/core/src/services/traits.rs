//! Collaborator contracts consumed by the pipeline.

use async_trait::async_trait;

use super::association::{AssociatedItem, AssociationRequest};
use super::error::ServiceError;
use super::types::{GeneratedPrompt, MeshQuality, ModelFormat, PromptRequest, TaskSnapshot};

/// Turns a free-form description into an image prompt.
#[async_trait]
pub trait PromptService: Send + Sync {
    /// Provider name (e.g., "gemini", "mock").
    fn name(&self) -> &str;

    /// Generates a prompt. Unparseable replies are reported as
    /// [`ServiceError::InvalidResponse`].
    async fn generate(&self, request: PromptRequest) -> Result<GeneratedPrompt, ServiceError>;
}

/// Renders an image from a prompt.
#[async_trait]
pub trait ImageService: Send + Sync {
    fn name(&self) -> &str;

    /// Returns encoded image bytes (PNG).
    async fn generate(&self, prompt: &str, negative_prompt: &str)
        -> Result<Vec<u8>, ServiceError>;
}

/// Converts an image into a 3D asset through an asynchronous task.
#[async_trait]
pub trait Model3DService: Send + Sync {
    fn name(&self) -> &str;

    /// Submits a generation task and returns its id.
    async fn submit(
        &self,
        image: &[u8],
        quality: MeshQuality,
        format: ModelFormat,
    ) -> Result<String, ServiceError>;

    /// Reads the current status of a task.
    async fn status(&self, task_id: &str) -> Result<TaskSnapshot, ServiceError>;

    /// Downloads the compressed bundle referenced by a succeeded task payload.
    async fn fetch_archive(&self, payload: &serde_json::Value) -> Result<Vec<u8>, ServiceError>;
}

/// Expands one category into concrete variants.
#[async_trait]
pub trait AssociationService: Send + Sync {
    fn name(&self) -> &str;

    /// Returns at most `request.count` variants, possibly fewer.
    async fn associate(
        &self,
        request: &AssociationRequest,
    ) -> Result<Vec<AssociatedItem>, ServiceError>;
}
