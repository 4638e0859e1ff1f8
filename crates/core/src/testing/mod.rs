//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the generation and
//! association service traits, allowing end-to-end pipeline and batch tests
//! without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_core::testing::{fixtures, MockImageService, MockModelService, MockPromptService};
//!
//! let prompts = Arc::new(MockPromptService::new());
//! let images = Arc::new(MockImageService::new());
//! let models = Arc::new(MockModelService::new());
//!
//! let runner = fixtures::pipeline_runner(dir.path(), prompts, images, models);
//! let job = runner.run("oak chair", JobOverrides::default(), ProgressReporter::disabled()).await?;
//! ```

mod mock_association;
mod mock_image;
mod mock_model;
mod mock_prompt;

pub use mock_association::{variant, MockAssociationService};
pub use mock_image::{MockImageService, RecordedImageRequest, MOCK_PNG_HEADER};
pub use mock_model::{MockModelService, RecordedSubmission};
pub use mock_prompt::MockPromptService;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::io::{Cursor, Write};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::{MockImageService, MockModelService, MockPromptService};
    use crate::pipeline::{PipelineConfig, PipelineRunner};
    use crate::poller::PollerConfig;
    use crate::services::GeneratedPrompt;

    /// Build an in-memory zip archive from `(name, contents)` pairs.
    pub fn model_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Create a prompt reply with reasonable defaults.
    pub fn generated_prompt(prompt: &str, identifier: Option<&str>) -> GeneratedPrompt {
        GeneratedPrompt {
            prompt: prompt.to_string(),
            negative_prompt: "blurry, low quality".to_string(),
            analysis: Some(format!("Analysis of {}", prompt)),
            confidence: Some("HIGH".to_string()),
            detected_domain: "general".to_string(),
            style: "photorealistic".to_string(),
            suggested_identifier: identifier.map(String::from),
        }
    }

    /// Poller bounds short enough for tests (2 s timeout, 10 ms interval).
    pub fn fast_poller() -> PollerConfig {
        PollerConfig::new(Duration::from_secs(2), Duration::from_millis(10))
    }

    /// Runner writing under `output_dir`, wired to the given mocks.
    pub fn pipeline_runner(
        output_dir: &Path,
        prompts: Arc<MockPromptService>,
        images: Arc<MockImageService>,
        models: Arc<MockModelService>,
    ) -> PipelineRunner {
        PipelineRunner::new(PipelineConfig::new(output_dir).with_poller(fast_poller()))
            .with_prompt_service(prompts)
            .with_image_service(images)
            .with_model_service(models)
    }
}
