pub mod batch;
pub mod config;
pub mod identity;
pub mod job;
pub mod library;
pub mod metrics;
pub mod pipeline;
pub mod poller;
pub mod progress;
pub mod services;
pub mod testing;

pub use batch::{
    BatchConfig, BatchCoordinator, BatchError, BatchItem, BatchManager, BatchProgress,
    BatchResult, ItemStatus, NewBatchItem,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use identity::{IdentityError, JobIdentityManager};
pub use job::{Job, JobOverrides, JobRegistry, JobStage};
pub use library::{LibraryError, ModelLibrary};
pub use pipeline::{PipelineConfig, PipelineError, PipelineRunner};
pub use poller::{ExternalTaskPoller, PollError, PollerConfig};
pub use progress::{JobProgress, ProgressObserver, ProgressReporter};
pub use services::{
    AssociationService, ImageService, Model3DService, PromptService, ServiceError,
};
