//! Category association API handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use forge_core::batch::{categories, search_categories};
use forge_core::services::{AssociatedItem, AssociationMode, AssociationRequest};
use forge_core::{AssociationService, NewBatchItem};

use super::batch::{check_max_parallel, check_runnable, spawn_run};
use super::handlers::{api_error, ApiError};
use crate::state::AppState;

/// Items echoed back when a batch is started from an association.
const PREVIEW_ITEMS: usize = 5;
/// Characters of each previewed description.
const PREVIEW_CHARS: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for a generated association
#[derive(Debug, Serialize)]
pub struct AssociationResponse {
    pub category: String,
    pub mode: AssociationMode,
    pub total_count: usize,
    pub items: Vec<AssociatedItem>,
    pub provider: String,
    pub requested_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CategoriesQuery {
    pub industry: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub keyword: String,
    pub results: Vec<String>,
}

/// Request body for a batch seeded by association
#[derive(Debug, Deserialize)]
pub struct AssociationBatchBody {
    pub association: AssociationRequest,
    /// Overrides the configured concurrency for this batch
    pub max_parallel: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ItemPreview {
    pub name: String,
    pub description: String,
}

/// Response for a batch seeded by association
#[derive(Debug, Serialize)]
pub struct AssociationBatchResponse {
    pub batch_id: String,
    pub category: String,
    pub total: usize,
    pub items_preview: Vec<ItemPreview>,
}

// ============================================================================
// Helpers
// ============================================================================

fn association_service(state: &AppState) -> Result<Arc<dyn AssociationService>, ApiError> {
    state.associations().cloned().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "association service not configured",
        )
    })
}

async fn associate(
    service: &dyn AssociationService,
    request: &AssociationRequest,
) -> Result<Vec<AssociatedItem>, ApiError> {
    request
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let items = service.associate(request).await.map_err(|e| {
        warn!(category = %request.category, error = %e, "Association failed");
        api_error(StatusCode::BAD_GATEWAY, e.to_string())
    })?;
    info!(
        category = %request.category,
        mode = %request.mode,
        requested = request.count,
        received = items.len(),
        "Association generated"
    );
    Ok(items)
}

// ============================================================================
// Handlers
// ============================================================================

/// Expand a category into concrete variants
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AssociationRequest>,
) -> Result<Json<AssociationResponse>, ApiError> {
    let service = association_service(&state)?;
    let items = associate(service.as_ref(), &request).await?;

    Ok(Json(AssociationResponse {
        category: request.category,
        mode: request.mode,
        total_count: items.len(),
        items,
        provider: service.name().to_string(),
        requested_count: request.count,
    }))
}

/// Built-in category catalog, optionally for one industry
pub async fn list_categories(
    Query(query): Query<CategoriesQuery>,
) -> Json<BTreeMap<String, Vec<String>>> {
    Json(categories(query.industry.as_deref()))
}

/// Catalog categories matching a keyword
pub async fn search(Query(query): Query<SearchQuery>) -> Json<SearchResponse> {
    Json(SearchResponse {
        results: search_categories(&query.keyword),
        keyword: query.keyword,
    })
}

/// Generate variants for a category and run them as one batch
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AssociationBatchBody>,
) -> Result<(StatusCode, Json<AssociationBatchResponse>), ApiError> {
    check_max_parallel(body.max_parallel)?;
    let service = association_service(&state)?;
    // Image and model services are needed whatever the variants look like.
    let prompted = [NewBatchItem::new("", "").with_custom_prompt("-")];
    check_runnable(&state, &prompted)?;

    let request = body.association;
    let variants = associate(service.as_ref(), &request).await?;
    if variants.is_empty() {
        return Err(api_error(
            StatusCode::BAD_GATEWAY,
            format!("association returned no variants for {}", request.category),
        ));
    }
    let planned: Vec<NewBatchItem> = variants.iter().cloned().map(NewBatchItem::from).collect();
    check_runnable(&state, &planned)?;

    let items_preview = planned
        .iter()
        .take(PREVIEW_ITEMS)
        .map(|item| ItemPreview {
            name: item.name.clone(),
            description: item.description.chars().take(PREVIEW_CHARS).collect(),
        })
        .collect();

    let coordinator = state.batches().create(body.max_parallel).await;
    let total = coordinator.add_from_association(variants).await.len();
    let batch_id = coordinator.batch_id().to_string();
    let category = request.category.trim().to_string();
    info!(batch_id = %batch_id, category = %category, total, "Association batch submitted");

    spawn_run(coordinator, category.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(AssociationBatchResponse {
            batch_id,
            category,
            total,
            items_preview,
        }),
    ))
}
