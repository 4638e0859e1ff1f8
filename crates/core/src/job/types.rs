//! Job record and its stage machine.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::{IndustryDomain, MeshQuality, ModelFormat, RenderStyle};

/// Characters of the description kept as the display name.
const DISPLAY_NAME_LEN: usize = 50;

/// Stage of a single job.
///
/// Stages only move forward: `Init -> Prompt -> Image -> Model -> Completed`,
/// with `Failed` reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Init,
    Prompt,
    Image,
    Model,
    Completed,
    Failed,
}

impl JobStage {
    fn rank(self) -> u8 {
        match self {
            JobStage::Init => 0,
            JobStage::Prompt => 1,
            JobStage::Image => 2,
            JobStage::Model => 3,
            JobStage::Completed => 4,
            JobStage::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }

    /// Whether moving from `self` to `next` keeps the stage sequence forward.
    pub fn can_advance_to(self, next: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStage::Failed || next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Init => "init",
            JobStage::Prompt => "prompt",
            JobStage::Image => "image",
            JobStage::Model => "model",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("invalid stage transition from {from} to {to}")]
    InvalidTransition { from: JobStage, to: JobStage },

    #[error("job {job_id} cannot be renamed: {reason}")]
    RenameNotAllowed { job_id: String, reason: &'static str },
}

/// One extracted model file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// One end-to-end conversion from description to 3D asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Current handle. Starts as the working directory name.
    pub id: String,
    pub temp_id: String,
    pub stage: JobStage,
    pub description: String,
    pub display_name: String,
    /// Semantic handle after a rename.
    pub folder_name: Option<String>,
    /// Working location holding every artifact of this job.
    pub output_dir: PathBuf,

    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub analysis: Option<String>,
    pub confidence: Option<String>,
    pub detected_domain: Option<String>,
    pub style: Option<String>,

    pub image_path: Option<PathBuf>,
    pub image_size_bytes: Option<u64>,

    pub task_id: Option<String>,
    pub model_dir: Option<PathBuf>,
    #[serde(default)]
    pub model_files: Vec<ModelFile>,

    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(temp_id: impl Into<String>, description: impl Into<String>, output_dir: PathBuf) -> Self {
        let temp_id = temp_id.into();
        let description = description.into();
        Self {
            id: temp_id.clone(),
            temp_id,
            stage: JobStage::Init,
            display_name: description.chars().take(DISPLAY_NAME_LEN).collect(),
            description,
            folder_name: None,
            output_dir,
            prompt: None,
            negative_prompt: None,
            analysis: None,
            confidence: None,
            detected_domain: None,
            style: None,
            image_path: None,
            image_size_bytes: None,
            task_id: None,
            model_dir: None,
            model_files: Vec::new(),
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to `next`, refusing any backward or post-terminal transition.
    pub fn advance(&mut self, next: JobStage) -> Result<(), JobError> {
        if !self.stage.can_advance_to(next) {
            return Err(JobError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record the one allowed identity change.
    ///
    /// Only valid during `Prompt`, before the job has been renamed and
    /// before any image or model output exists.
    pub fn rename(&mut self, handle: impl Into<String>, output_dir: PathBuf) -> Result<(), JobError> {
        let reason = if self.stage != JobStage::Prompt {
            Some("not in prompt stage")
        } else if self.folder_name.is_some() {
            Some("already renamed")
        } else if self.image_path.is_some() || self.model_dir.is_some() {
            Some("outputs already written")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(JobError::RenameNotAllowed {
                job_id: self.id.clone(),
                reason,
            });
        }

        let handle = handle.into();
        self.id = handle.clone();
        self.folder_name = Some(handle);
        self.output_dir = output_dir;
        Ok(())
    }

    /// Mark the job failed, keeping every field produced so far.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        if !self.stage.is_terminal() {
            self.stage = JobStage::Failed;
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn is_renamed(&self) -> bool {
        self.folder_name.is_some()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.completed_at
            .map(|end| (end - self.created_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// Per-run adjustments to a job.
#[derive(Debug, Clone, Default)]
pub struct JobOverrides {
    /// Used verbatim instead of calling the prompt service.
    pub custom_prompt: Option<String>,
    pub equipment_type: Option<String>,
    pub voltage_level: Option<String>,
    pub domain: Option<IndustryDomain>,
    pub style: Option<RenderStyle>,
    pub mesh_quality: Option<MeshQuality>,
    pub model_format: Option<ModelFormat>,
    /// Directory the working location is created in. Defaults to the
    /// configured output directory.
    pub base_dir: Option<PathBuf>,
    /// Initial working handle. Defaults to the temporary id.
    pub working_handle: Option<String>,
    /// Temporary id. Defaults to a fresh random id.
    pub temp_id: Option<String>,
}
