//! Batch API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use forge_core::batch::{
    batch_models, list_batches, BatchIndexEntry, BatchItem, BatchProgress, BatchSummary,
    IndexItem,
};
use forge_core::config::MAX_PARALLEL_LIMIT;
use forge_core::identity::sanitize_handle;
use forge_core::{BatchCoordinator, BatchError, JobOverrides, NewBatchItem};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a batch
#[derive(Debug, Deserialize)]
pub struct CreateBatchBody {
    /// Category used in output location names
    pub category: String,
    pub items: Vec<NewBatchItem>,
    /// Overrides the configured concurrency for this batch
    pub max_parallel: Option<usize>,
}

/// Response for a started batch
#[derive(Debug, Serialize)]
pub struct CreateBatchResponse {
    pub batch_id: String,
    pub total: usize,
}

/// Response for listing in-memory batches
#[derive(Debug, Serialize)]
pub struct ListBatchesResponse {
    pub batches: Vec<BatchSummary>,
}

/// Response for a batch's live status
#[derive(Debug, Serialize)]
pub struct BatchStatusResponse {
    pub progress: BatchProgress,
    pub items: Vec<BatchItem>,
}

/// Response for the persisted batch index
#[derive(Debug, Serialize)]
pub struct BatchIndexResponse {
    pub batches: Vec<BatchIndexEntry>,
}

/// Response for a persisted batch's models
#[derive(Debug, Serialize)]
pub struct BatchModelsResponse {
    pub batch_id: String,
    pub models: Vec<IndexItem>,
}

fn batch_error(e: BatchError) -> ApiError {
    match e {
        BatchError::NotFound(id) => {
            api_error(StatusCode::NOT_FOUND, format!("Batch not found: {}", id))
        }
        BatchError::AlreadyRunning(_) => api_error(StatusCode::CONFLICT, e.to_string()),
        e => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Run a registered batch in the background.
pub(super) fn spawn_run(coordinator: Arc<BatchCoordinator>, category: String) {
    tokio::spawn(async move {
        if let Err(e) = coordinator.run(&category).await {
            error!(batch_id = %coordinator.batch_id(), error = %e, "Batch run failed");
        }
    });
}

/// Checks `max_parallel` against the accepted range.
pub(super) fn check_max_parallel(max_parallel: Option<usize>) -> Result<(), ApiError> {
    match max_parallel {
        Some(n) if n == 0 || n > MAX_PARALLEL_LIMIT => Err(api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "max_parallel must be between 1 and {}, got {}",
                MAX_PARALLEL_LIMIT, n
            ),
        )),
        _ => Ok(()),
    }
}

/// Fails with 503 if the runner lacks a service any item needs.
pub(super) fn check_runnable(state: &AppState, items: &[NewBatchItem]) -> Result<(), ApiError> {
    for item in items {
        let overrides = JobOverrides {
            custom_prompt: item.custom_prompt.clone(),
            ..Default::default()
        };
        state
            .runner()
            .ensure_configured(&overrides)
            .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a batch, add its items and run it in the background
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBatchBody>,
) -> Result<(StatusCode, Json<CreateBatchResponse>), ApiError> {
    if body.category.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "category must not be empty",
        ));
    }
    if body.items.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "items must not be empty"));
    }
    if body.items.iter().any(|i| i.description.trim().is_empty()) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "every item needs a description",
        ));
    }
    check_max_parallel(body.max_parallel)?;
    check_runnable(&state, &body.items)?;

    let coordinator = state.batches().create(body.max_parallel).await;
    let total = coordinator.add_items(body.items).await.len();
    let batch_id = coordinator.batch_id().to_string();
    info!(batch_id = %batch_id, category = %body.category, total, "Batch submitted");

    spawn_run(coordinator, body.category);

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateBatchResponse { batch_id, total }),
    ))
}

/// List batches started by this process
pub async fn list(State(state): State<Arc<AppState>>) -> Json<ListBatchesResponse> {
    Json(ListBatchesResponse {
        batches: state.batches().list().await,
    })
}

/// Live progress and items of a batch started by this process
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatchStatusResponse>, ApiError> {
    let Some(coordinator) = state.batches().get(&id).await else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Batch not found: {}", id),
        ));
    };
    Ok(Json(BatchStatusResponse {
        progress: coordinator.get_progress().await,
        items: coordinator.items().await,
    }))
}

/// Persisted batches under the batch output directory, newest first
pub async fn get_index(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BatchIndexResponse>, ApiError> {
    let batches = list_batches(&state.batches().config().output_dir)
        .await
        .map_err(batch_error)?;
    Ok(Json(BatchIndexResponse { batches }))
}

/// Completed items of a persisted batch
pub async fn get_models(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatchModelsResponse>, ApiError> {
    if sanitize_handle(&id) != id {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Batch not found: {}", id),
        ));
    }
    let models = batch_models(&state.batches().config().output_dir, &id)
        .await
        .map_err(batch_error)?;
    Ok(Json(BatchModelsResponse {
        batch_id: id,
        models,
    }))
}
