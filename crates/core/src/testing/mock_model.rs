//! Mock image-to-3D service for testing.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::services::{
    archive_url, MeshQuality, Model3DService, ModelFormat, ServiceError, TaskSnapshot, TaskStatus,
};

use super::fixtures;

/// A recorded task submission for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub task_id: String,
    pub image: Vec<u8>,
    pub quality: MeshQuality,
    pub format: ModelFormat,
}

#[derive(Debug, Clone)]
struct MockTask {
    script: Vec<TaskStatus>,
    polls: usize,
}

/// Mock implementation of the Model3DService trait.
///
/// Each submitted task replays a status script, one entry per status call,
/// repeating the last entry once the script runs out. The default script is
/// `running, succeeded`. Succeeded payloads point at a `mock://` archive
/// that [`fetch_archive`](Model3DService::fetch_archive) serves.
///
/// # Example
///
/// ```rust,ignore
/// use forge_core::testing::MockModelService;
///
/// let models = MockModelService::new();
/// // Tasks whose input image contains "lamp" end up failed.
/// models.set_script_for("lamp", vec![TaskStatus::Running, TaskStatus::Failed]).await;
/// ```
#[derive(Debug)]
pub struct MockModelService {
    submissions: Arc<RwLock<Vec<RecordedSubmission>>>,
    tasks: Arc<RwLock<HashMap<String, MockTask>>>,
    default_script: Arc<RwLock<Vec<TaskStatus>>>,
    /// Scripts chosen by a marker found in the submitted image bytes.
    scripts: Arc<RwLock<Vec<(Vec<u8>, Vec<TaskStatus>)>>>,
    archive: Arc<RwLock<Vec<u8>>>,
    next_submit_error: Arc<RwLock<Option<ServiceError>>>,
    status_delay: Arc<RwLock<Duration>>,
}

impl Default for MockModelService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockModelService {
    pub fn new() -> Self {
        Self {
            submissions: Arc::new(RwLock::new(Vec::new())),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            default_script: Arc::new(RwLock::new(vec![
                TaskStatus::Running,
                TaskStatus::Succeeded,
            ])),
            scripts: Arc::new(RwLock::new(Vec::new())),
            archive: Arc::new(RwLock::new(fixtures::model_archive(&[(
                "model.glb",
                b"glTF-mock-binary",
            )]))),
            next_submit_error: Arc::new(RwLock::new(None)),
            status_delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    pub async fn recorded_submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    pub async fn submission_count(&self) -> usize {
        self.submissions.read().await.len()
    }

    /// Number of status calls made for `task_id`.
    pub async fn poll_count(&self, task_id: &str) -> usize {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(|t| t.polls)
            .unwrap_or(0)
    }

    /// Script used for tasks without a more specific match.
    pub async fn set_default_script(&self, script: Vec<TaskStatus>) {
        *self.default_script.write().await = script;
    }

    /// Script for tasks whose submitted image contains `marker`.
    pub async fn set_script_for(&self, marker: &str, script: Vec<TaskStatus>) {
        self.scripts
            .write()
            .await
            .push((marker.as_bytes().to_vec(), script));
    }

    /// Archive bytes served for succeeded tasks.
    pub async fn set_archive(&self, archive: Vec<u8>) {
        *self.archive.write().await = archive;
    }

    pub async fn set_next_submit_error(&self, error: ServiceError) {
        *self.next_submit_error.write().await = Some(error);
    }

    /// Simulated latency of each status call.
    pub async fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.write().await = delay;
    }

    fn payload(task_id: &str, status: TaskStatus) -> serde_json::Value {
        match status {
            TaskStatus::Succeeded => json!({
                "id": task_id,
                "status": status.as_str(),
                "content": { "file_url": format!("mock://{}.zip", task_id) },
            }),
            TaskStatus::Failed => json!({
                "id": task_id,
                "status": status.as_str(),
                "error": { "message": "mock task failed" },
            }),
            _ => json!({ "id": task_id, "status": status.as_str() }),
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[async_trait]
impl Model3DService for MockModelService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(
        &self,
        image: &[u8],
        quality: MeshQuality,
        format: ModelFormat,
    ) -> Result<String, ServiceError> {
        if let Some(error) = self.next_submit_error.write().await.take() {
            return Err(error);
        }

        let script = self
            .scripts
            .read()
            .await
            .iter()
            .find(|(marker, _)| contains(image, marker))
            .map(|(_, script)| script.clone());
        let script = match script {
            Some(script) => script,
            None => self.default_script.read().await.clone(),
        };

        let mut submissions = self.submissions.write().await;
        let task_id = format!("mock-task-{}", submissions.len() + 1);
        submissions.push(RecordedSubmission {
            task_id: task_id.clone(),
            image: image.to_vec(),
            quality,
            format,
        });
        self.tasks
            .write()
            .await
            .insert(task_id.clone(), MockTask { script, polls: 0 });

        Ok(task_id)
    }

    async fn status(&self, task_id: &str) -> Result<TaskSnapshot, ServiceError> {
        let delay = *self.status_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(task_id).ok_or_else(|| ServiceError::Api {
            status: 404,
            message: format!("task {} not found", task_id),
        })?;

        let status = task
            .script
            .get(task.polls)
            .or_else(|| task.script.last())
            .copied()
            .unwrap_or(TaskStatus::Pending);
        task.polls += 1;

        Ok(TaskSnapshot {
            task_id: task_id.to_string(),
            status,
            payload: Self::payload(task_id, status),
            submitted_at: Utc::now(),
        })
    }

    async fn fetch_archive(&self, payload: &serde_json::Value) -> Result<Vec<u8>, ServiceError> {
        match archive_url(payload) {
            Some(url) if url.starts_with("mock://") => Ok(self.archive.read().await.clone()),
            Some(url) => Err(ServiceError::Http(format!("unexpected url {}", url))),
            None => Err(ServiceError::invalid("task result has no file_url")),
        }
    }
}
