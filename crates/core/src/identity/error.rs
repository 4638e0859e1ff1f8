//! Error types for identity renames.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Both the desired handle and its one fallback are taken.
    #[error("identity collision: both {desired} and {fallback} already exist")]
    Collision { desired: String, fallback: String },

    /// Nothing usable remained after sanitizing the desired handle.
    #[error("invalid handle: {0:?}")]
    InvalidHandle(String),

    /// The working location has no parent directory to rename within.
    #[error("working location has no parent: {}", .0.display())]
    NoParent(PathBuf),

    #[error("failed to rename {} to {}", .from.display(), .to.display())]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
