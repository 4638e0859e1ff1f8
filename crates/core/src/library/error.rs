//! Error types for the model library.

use std::path::PathBuf;
use thiserror::Error;

use crate::batch::BatchError;
use crate::pipeline::PipelineError;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error(transparent)]
    Jobs(#[from] PipelineError),

    #[error(transparent)]
    Batches(#[from] BatchError),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Page number or size outside the accepted range.
    #[error("invalid page request: {0}")]
    InvalidPage(String),
}
