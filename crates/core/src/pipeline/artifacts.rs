//! On-disk records written into a job's working directory.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::error::PipelineError;
use crate::job::Job;

pub const PROMPT_FILE: &str = "prompt.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const IMAGE_FILE: &str = "image.png";
pub const MODEL_DIR: &str = "model";
pub const RESULT_FILE: &str = "result.json";

/// Output of the prompt stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRecord {
    pub description: String,
    pub prompt: String,
    pub negative_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    pub detected_domain: String,
    pub style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_identifier: Option<String>,
    /// True when the prompt was supplied by the caller.
    pub custom: bool,
    pub created_at: DateTime<Utc>,
}

/// Identity and display fields of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: String,
    pub temp_id: String,
    pub display_name: String,
    pub description: String,
    pub folder_name: Option<String>,
    pub detected_domain: Option<String>,
    pub style: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for MetadataRecord {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            temp_id: job.temp_id.clone(),
            display_name: job.display_name.clone(),
            description: job.description.clone(),
            folder_name: job.folder_name.clone(),
            detected_domain: job.detected_domain.clone(),
            style: job.style.clone(),
            created_at: job.created_at,
            updated_at: Utc::now(),
        }
    }
}

/// Write `value` as pretty JSON.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)
        .await
        .map_err(|e| PipelineError::io(path, e))
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let bytes = fs::read(path).await.map_err(|e| PipelineError::io(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}
