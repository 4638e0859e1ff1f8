//! Error types for the pipeline module.

use std::path::PathBuf;
use thiserror::Error;

use crate::identity::IdentityError;
use crate::job::JobError;
use crate::poller::PollError;
use crate::services::ServiceError;

/// Errors raised while driving a job.
///
/// Only [`PipelineError::Configuration`] escapes
/// [`PipelineRunner::run`](super::PipelineRunner::run). Every other variant
/// is recorded on the job, which then ends in the `failed` stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required collaborator is missing. Raised before any work starts.
    #[error("pipeline misconfigured: {0}")]
    Configuration(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Job(#[from] JobError),

    /// The model archive could not be unpacked.
    #[error("invalid model archive: {0}")]
    Archive(String),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No result record exists for the requested job.
    #[error("job not found: {0}")]
    JobNotFound(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
