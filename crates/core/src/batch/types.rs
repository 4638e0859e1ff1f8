//! Types for batch coordination.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::short_id;
use crate::job::{Job, JobStage, ModelFile};
use crate::services::AssociatedItem;

/// Scheduler view of one item. Distinct from the wrapped job's stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Running => "running",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live progress of a running item for a job stage.
pub fn stage_percent(stage: JobStage) -> u8 {
    match stage {
        JobStage::Init => 0,
        JobStage::Prompt => 20,
        JobStage::Image => 50,
        JobStage::Model => 80,
        JobStage::Completed | JobStage::Failed => 100,
    }
}

/// Input for [`BatchCoordinator::add_items`](super::BatchCoordinator::add_items).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBatchItem {
    pub name: String,
    pub description: String,
    /// Image prompt to use instead of generating one.
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

impl NewBatchItem {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            custom_prompt: None,
        }
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }
}

impl From<AssociatedItem> for NewBatchItem {
    /// The variant's own prompt, when it has one, skips prompt generation.
    fn from(variant: AssociatedItem) -> Self {
        let description = if variant.description.trim().is_empty() {
            variant.name.clone()
        } else {
            variant.description
        };
        let prompt = variant.prompt.trim();
        Self {
            custom_prompt: (!prompt.is_empty()).then(|| prompt.to_string()),
            name: variant.name,
            description,
        }
    }
}

/// One unit of work inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub custom_prompt: Option<String>,
    pub status: ItemStatus,
    pub progress_percent: u8,
    /// Stage of the wrapped job while running.
    pub current_stage: Option<JobStage>,
    /// Item directory. Planned when a worker picks the item up, then
    /// replaced by the job's final directory once it finishes.
    pub output_location: Option<PathBuf>,
    /// Final job record.
    pub job: Option<Job>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchItem {
    pub fn new(item: NewBatchItem) -> Self {
        Self {
            id: short_id(),
            name: item.name,
            description: item.description,
            custom_prompt: item.custom_prompt,
            status: ItemStatus::Pending,
            progress_percent: 0,
            current_stage: None,
            output_location: None,
            job: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Seconds between pickup and terminal status.
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// A running item as shown in a progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningItem {
    pub id: String,
    pub name: String,
    pub stage: Option<JobStage>,
    pub progress_percent: u8,
}

/// Consistent snapshot of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub pending: usize,
    /// `(completed + failed) / total * 100`, or 0 for an empty batch.
    pub progress_percent: f64,
    pub current_items: Vec<RunningItem>,
    /// Rough seconds left, from the mean duration of finished items.
    pub estimated_remaining_secs: Option<f64>,
}

impl BatchProgress {
    pub(crate) fn from_items(batch_id: &str, items: &[BatchItem], max_parallel: usize) -> Self {
        let count = |status: ItemStatus| items.iter().filter(|i| i.status == status).count();
        let completed = count(ItemStatus::Completed);
        let failed = count(ItemStatus::Failed);
        let running = count(ItemStatus::Running);
        let pending = count(ItemStatus::Pending);
        let total = items.len();

        let progress_percent = if total > 0 {
            (completed + failed) as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let current_items = items
            .iter()
            .filter(|i| i.status == ItemStatus::Running)
            .map(|i| RunningItem {
                id: i.id.clone(),
                name: i.name.clone(),
                stage: i.current_stage,
                progress_percent: i.progress_percent,
            })
            .collect();

        let durations: Vec<f64> = items.iter().filter_map(BatchItem::duration_secs).collect();
        let estimated_remaining_secs = if durations.is_empty() || running + pending == 0 {
            None
        } else {
            let mean = durations.iter().sum::<f64>() / durations.len() as f64;
            let lanes = max_parallel.max(1) as f64;
            Some(mean * ((running + pending) as f64 / lanes).ceil())
        };

        Self {
            batch_id: batch_id.to_string(),
            total,
            completed,
            failed,
            running,
            pending,
            progress_percent,
            current_items,
            estimated_remaining_secs,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.running == 0 && self.pending == 0
    }
}

/// Outcome of [`BatchCoordinator::run`](super::BatchCoordinator::run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: String,
    pub category: String,
    pub items: Vec<BatchItem>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: f64,
    /// Directory holding every item of the batch.
    pub output_dir: PathBuf,
    pub index_file: Option<PathBuf>,
}

/// Short view of an in-memory batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub category: Option<String>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub progress_percent: f64,
    pub running: bool,
    pub created_at: DateTime<Utc>,
}

/// Persisted record of a finished batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchIndex {
    pub batch_id: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub config: IndexConfig,
    pub items: Vec<IndexItem>,
}

/// Batch settings recorded in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub max_parallel: usize,
    pub naming_pattern: String,
}

/// Final state of one item in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: ItemStatus,
    /// Final working directory (after any rename).
    pub output_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_files: Vec<ModelFile>,
}

impl From<&BatchItem> for IndexItem {
    fn from(item: &BatchItem) -> Self {
        let job = item.job.as_ref();
        let completed = item.status == ItemStatus::Completed;
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            status: item.status,
            output_dir: job
                .map(|j| j.output_dir.clone())
                .or_else(|| item.output_location.clone()),
            job_id: job.map(|j| j.id.clone()),
            error: item.error.clone(),
            image_path: job.and_then(|j| j.image_path.clone()),
            model_files: match job {
                Some(j) if completed => j.model_files.clone(),
                _ => Vec::new(),
            },
        }
    }
}

/// One persisted batch as listed by [`list_batches`](super::list_batches).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchIndexEntry {
    pub batch_id: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub item_count: usize,
    pub completed: usize,
    pub failed: usize,
    /// Path of the index file.
    pub path: PathBuf,
}
