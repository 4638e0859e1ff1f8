//! Batch coordination.
//!
//! A batch runs many independent jobs with a fixed upper bound on how many
//! run at once, tracks live progress, and persists an index when it
//! finishes:
//!
//! ```text
//! <output_dir>/<batch_id>/
//!   index.json
//!   <item location>/   one job working directory per item
//! ```

mod catalog;
mod config;
mod coordinator;
mod error;
mod index;
mod manager;
mod naming;
mod types;

pub use catalog::{categories, search_categories, CATEGORY_CATALOG};
pub use config::BatchConfig;
pub use coordinator::BatchCoordinator;
pub use error::BatchError;
pub use index::{batch_models, index_path, list_batches, read_index, write_index, INDEX_FILE};
pub use manager::{BatchManager, DEFAULT_RETAINED_BATCHES};
pub use naming::{assign_location, render_location};
pub use types::{
    stage_percent, BatchIndex, BatchIndexEntry, BatchItem, BatchProgress, BatchResult,
    BatchSummary, IndexConfig, IndexItem, ItemStatus, NewBatchItem, RunningItem,
};
