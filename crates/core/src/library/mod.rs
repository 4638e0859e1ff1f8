//! Read-only view over every finished model on disk.
//!
//! The library merges two sources:
//! - Single jobs: `result.json` records directly under the jobs directory
//! - Batches: completed items listed in each batch's `index.json`
//!
//! Nothing is cached; every call rescans the directories.

mod error;
mod scanner;
mod types;

pub use error::LibraryError;
pub use scanner::ModelLibrary;
pub use types::{
    BrowseQuery, LibraryEntry, LibraryPage, LibraryStats, ModelSource, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
