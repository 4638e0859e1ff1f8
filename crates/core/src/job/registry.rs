//! In-memory store of single-job status, owned by whoever starts jobs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{Job, JobStage};
use crate::progress::{JobProgress, ProgressObserver};

/// Latest known state of one submitted job.
#[derive(Debug, Clone, Serialize)]
pub struct JobEntry {
    /// Handle returned at submission. Stable for the job's lifetime.
    pub handle: String,
    /// Current job id (changes if the job is renamed).
    pub job_id: String,
    pub description: String,
    pub stage: JobStage,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Final record once the job is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Job>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobEntry {
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

/// Terminal entries kept in memory unless configured otherwise.
pub const DEFAULT_RETAINED_JOBS: usize = 500;

/// Explicit registry of jobs started by this process.
///
/// Entries are created at submission, updated by the job's progress
/// observer, and frozen once a terminal state is recorded. Only the newest
/// `retained` terminal entries are kept; older results stay readable from
/// their `result.json` on disk.
#[derive(Debug)]
pub struct JobRegistry {
    entries: RwLock<HashMap<String, JobEntry>>,
    retained: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_JOBS)
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retained` terminal entries. Running jobs are never
    /// evicted.
    pub fn with_retention(retained: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retained,
        }
    }

    pub async fn insert(&self, handle: &str, description: &str) -> JobEntry {
        let now = Utc::now();
        let entry = JobEntry {
            handle: handle.to_string(),
            job_id: handle.to_string(),
            description: description.to_string(),
            stage: JobStage::Init,
            message: "Queued".to_string(),
            extra: serde_json::Map::new(),
            result: None,
            created_at: now,
            updated_at: now,
        };
        self.entries
            .write()
            .await
            .insert(handle.to_string(), entry.clone());
        entry
    }

    /// Apply a progress event. Ignored once the entry is terminal.
    pub async fn record_progress(&self, handle: &str, event: JobProgress) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(handle) else {
            return;
        };
        if entry.is_terminal() {
            return;
        }
        entry.job_id = event.job_id;
        entry.stage = event.stage;
        entry.message = event.message;
        entry.extra = event.extra;
        entry.updated_at = event.timestamp;
    }

    /// Store the final job record. Only the first terminal record is kept.
    pub async fn finish(&self, handle: &str, job: Job) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(handle) else {
            return;
        };
        if entry.result.is_some() {
            return;
        }
        entry.job_id = job.id.clone();
        entry.stage = job.stage;
        entry.message = match &job.error {
            Some(error) => format!("Failed: {}", error),
            None => "Completed".to_string(),
        };
        entry.updated_at = Utc::now();
        entry.result = Some(job);

        evict_finished(&mut entries, self.retained);
    }

    /// Look up by submission handle or by current job id.
    pub async fn get(&self, id: &str) -> Option<JobEntry> {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .or_else(|| entries.values().find(|e| e.job_id == id))
            .cloned()
    }

    /// All entries, newest first.
    pub async fn list(&self) -> Vec<JobEntry> {
        let mut list: Vec<JobEntry> = self.entries.read().await.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Drop the oldest terminal entries beyond `retained`.
fn evict_finished(entries: &mut HashMap<String, JobEntry>, retained: usize) {
    let mut finished: Vec<(DateTime<Utc>, String)> = entries
        .values()
        .filter(|e| e.is_terminal())
        .map(|e| (e.updated_at, e.handle.clone()))
        .collect();
    if finished.len() <= retained {
        return;
    }
    finished.sort();
    let excess = finished.len() - retained;
    for (_, handle) in finished.into_iter().take(excess) {
        entries.remove(&handle);
    }
    debug!(evicted = excess, "Evicted finished job entries");
}

/// Progress observer writing into a [`JobRegistry`] entry.
pub struct RegistryObserver {
    registry: Arc<JobRegistry>,
    handle: String,
}

impl RegistryObserver {
    pub fn new(registry: Arc<JobRegistry>, handle: impl Into<String>) -> Self {
        Self {
            registry,
            handle: handle.into(),
        }
    }
}

#[async_trait]
impl ProgressObserver<JobProgress> for RegistryObserver {
    async fn observe(&self, event: JobProgress) {
        self.registry.record_progress(&self.handle, event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressReporter;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_progress_updates_entry() {
        let registry = Arc::new(JobRegistry::new());
        registry.insert("a1b2c3d4", "oak chair").await;

        let reporter = ProgressReporter::direct(Arc::new(RegistryObserver::new(
            Arc::clone(&registry),
            "a1b2c3d4",
        )));
        reporter
            .report(
                JobProgress::new("chair_oak", JobStage::Image, "Generating image", "oak chair")
                    .with_extra("prompt", "oak chair"),
            )
            .await;

        let entry = registry.get("a1b2c3d4").await.unwrap();
        assert_eq!(entry.job_id, "chair_oak");
        assert_eq!(entry.stage, JobStage::Image);
        assert_eq!(entry.extra["prompt"], "oak chair");

        // Lookup by renamed id
        assert!(registry.get("chair_oak").await.is_some());
    }

    #[tokio::test]
    async fn test_entry_frozen_after_terminal() {
        let registry = JobRegistry::new();
        registry.insert("h", "desc").await;

        let mut job = Job::new("h", "desc", PathBuf::from("/out/h"));
        job.fail("boom");
        registry.finish("h", job).await;

        registry
            .record_progress("h", JobProgress::new("h", JobStage::Model, "late", "desc"))
            .await;
        let mut other = Job::new("h", "desc", PathBuf::from("/out/h"));
        other.advance(JobStage::Prompt).unwrap();
        registry.finish("h", other).await;

        let entry = registry.get("h").await.unwrap();
        assert_eq!(entry.stage, JobStage::Failed);
        assert_eq!(entry.message, "Failed: boom");
        assert_eq!(entry.result.unwrap().error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let registry = JobRegistry::new();
        registry.insert("first", "a").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        registry.insert("second", "b").await;

        let list = registry.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].handle, "second");
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_oldest_finished_entries_are_evicted() {
        let registry = JobRegistry::with_retention(2);
        registry.insert("running", "still going").await;
        for handle in ["a", "b", "c"] {
            registry.insert(handle, "desc").await;
            let mut job = Job::new(handle, "desc", PathBuf::from("/out").join(handle));
            job.fail("boom");
            registry.finish(handle, job).await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert_eq!(registry.len().await, 3);
        assert!(registry.get("a").await.is_none());
        assert!(registry.get("b").await.is_some());
        assert!(registry.get("c").await.is_some());
        assert!(registry.get("running").await.is_some());
    }
}
