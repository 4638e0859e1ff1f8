//! Single job record, stage machine and in-process registry.

mod registry;
mod types;

pub use registry::{JobEntry, JobRegistry, RegistryObserver, DEFAULT_RETAINED_JOBS};
pub use types::{Job, JobError, JobOverrides, JobStage, ModelFile};
