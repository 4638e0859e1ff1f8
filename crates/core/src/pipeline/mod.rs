//! Single-job pipeline.
//!
//! [`PipelineRunner`] drives a job through the prompt, image and model
//! stages, writing each stage's artifacts under the job's working directory:
//!
//! ```text
//! <base_dir>/<handle>/
//!   prompt.json     prompt stage output
//!   metadata.json   identity and display fields
//!   image.png       image stage output
//!   model/          extracted 3D asset
//!   result.json     full job record, written on success and on failure
//! ```

mod archive;
mod artifacts;
mod config;
mod error;
mod runner;

pub use archive::extract_archive;
pub use artifacts::{
    read_json, write_json, MetadataRecord, PromptRecord, IMAGE_FILE, METADATA_FILE, MODEL_DIR,
    PROMPT_FILE, RESULT_FILE,
};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub(crate) use runner::list_results;
pub use runner::PipelineRunner;
