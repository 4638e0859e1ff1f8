use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{association, batch, handlers, jobs, library, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/domains", get(handlers::list_domains))
        .route("/styles", get(handlers::list_styles))
        // Single jobs
        .route("/generate", post(jobs::generate))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/progress", get(jobs::get_progress))
        .route("/jobs/{id}/image", get(jobs::get_image))
        .route("/jobs/{id}/model/{*filename}", get(jobs::get_model_file))
        // Batches
        .route("/batch", post(batch::create_batch))
        .route("/batch", get(batch::list))
        .route("/batch/index", get(batch::get_index))
        .route("/batch/{id}/status", get(batch::get_status))
        .route("/batch/{id}/models", get(batch::get_models))
        .route("/batch/from-association", post(association::create_batch))
        // Association
        .route("/association/generate", post(association::generate))
        .route("/association/categories", get(association::list_categories))
        .route("/association/search", get(association::search))
        // Library
        .route("/library/browse", get(library::browse))
        .route("/library/stats", get(library::stats))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
