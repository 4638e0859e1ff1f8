//! Model library integration tests.
//!
//! Single jobs and batches are produced against mock services, then read
//! back through the library:
//! - Only completed work is listed
//! - Category filters and paging
//! - Totals and bytes on disk

use std::sync::Arc;

use tempfile::TempDir;

use forge_core::{
    batch::{BatchConfig, BatchCoordinator, NewBatchItem},
    job::{JobOverrides, JobStage},
    library::{BrowseQuery, LibraryError, ModelLibrary, ModelSource},
    pipeline::PipelineRunner,
    progress::ProgressReporter,
    services::TaskStatus,
    testing::{fixtures, MockImageService, MockModelService, MockPromptService},
};

struct TestHarness {
    models: Arc<MockModelService>,
    runner: Arc<PipelineRunner>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let models = Arc::new(MockModelService::new());
        let runner = Arc::new(fixtures::pipeline_runner(
            &temp_dir.path().join("jobs"),
            Arc::new(MockPromptService::new()),
            Arc::new(MockImageService::new()),
            Arc::clone(&models),
        ));
        Self {
            models,
            runner,
            temp_dir,
        }
    }

    fn library(&self) -> ModelLibrary {
        ModelLibrary::new(
            self.temp_dir.path().join("jobs"),
            self.temp_dir.path().join("batch"),
        )
    }

    async fn run_single(&self, description: &str) -> JobStage {
        self.runner
            .run(description, JobOverrides::default(), ProgressReporter::disabled())
            .await
            .expect("run returned a configuration error")
            .stage
    }

    async fn run_batch(&self, category: &str, descriptions: &[&str]) {
        let config = BatchConfig::new(self.temp_dir.path().join("batch"));
        let batch = BatchCoordinator::new(config, Arc::clone(&self.runner));
        batch
            .add_items(
                descriptions
                    .iter()
                    .map(|d| NewBatchItem::new(*d, *d))
                    .collect(),
            )
            .await;
        batch.run(category).await.unwrap();
    }
}

#[tokio::test]
async fn test_lists_completed_singles_and_batch_items() {
    let harness = TestHarness::new();
    harness
        .models
        .set_script_for("broken", vec![TaskStatus::Failed])
        .await;

    assert_eq!(harness.run_single("oak chair").await, JobStage::Completed);
    assert_eq!(harness.run_single("broken lamp").await, JobStage::Failed);
    harness
        .run_batch("furniture", &["pine table", "broken stool"])
        .await;

    let page = harness
        .library()
        .browse(&BrowseQuery::default())
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    let single = page
        .models
        .iter()
        .find(|m| m.source == ModelSource::Single)
        .unwrap();
    assert_eq!(single.description, "oak chair");
    assert!(single.batch_id.is_none());
    assert!(!single.model_files.is_empty());

    let item = page
        .models
        .iter()
        .find(|m| m.source == ModelSource::Batch)
        .unwrap();
    assert_eq!(item.name, "pine table");
    assert_eq!(item.category.as_deref(), Some("furniture"));
    assert!(item.batch_id.is_some());
    // Batch finished last, so its item comes first.
    assert_eq!(page.models[0].source, ModelSource::Batch);
}

#[tokio::test]
async fn test_category_filter_and_paging() {
    let harness = TestHarness::new();
    harness
        .run_batch("furniture", &["oak chair", "pine table", "birch shelf"])
        .await;
    harness.run_batch("lighting", &["desk lamp"]).await;

    let library = harness.library();
    let furniture = library
        .browse(&BrowseQuery {
            category: Some("FURN".to_string()),
            page: 2,
            page_size: 2,
        })
        .await
        .unwrap();

    assert_eq!(furniture.total, 3);
    assert_eq!(furniture.total_pages, 2);
    assert_eq!(furniture.models.len(), 1);
    assert!(furniture
        .models
        .iter()
        .all(|m| m.category.as_deref() == Some("furniture")));

    let err = library
        .browse(&BrowseQuery {
            page: 0,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::InvalidPage(_)));
}

#[tokio::test]
async fn test_stats_count_sources_and_bytes() {
    let harness = TestHarness::new();
    harness.run_single("oak chair").await;
    harness
        .run_batch("furniture", &["pine table", "birch shelf"])
        .await;

    let stats = harness.library().stats().await.unwrap();

    assert_eq!(stats.single_models, 1);
    assert_eq!(stats.batch_models, 2);
    assert_eq!(stats.total_models, 3);
    assert!(stats.total_size_bytes > 0);
}
