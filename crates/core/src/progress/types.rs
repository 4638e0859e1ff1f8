use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobStage;

/// One progress update from a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Current job id. Changes once if the job is renamed.
    pub job_id: String,
    pub stage: JobStage,
    /// Human readable status line.
    pub message: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Stage specific fields (task id while polling, image path, etc).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl JobProgress {
    pub fn new(
        job_id: impl Into<String>,
        stage: JobStage,
        message: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            stage,
            message: message.into(),
            description: description.into(),
            detected_domain: None,
            style: None,
            extra: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}
