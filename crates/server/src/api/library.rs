//! Model library API handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use forge_core::library::{BrowseQuery, LibraryPage, LibraryStats};
use forge_core::LibraryError;

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

fn library_error(e: LibraryError) -> ApiError {
    match e {
        LibraryError::InvalidPage(_) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        e => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Page through finished single jobs and batch items, newest first
pub async fn browse(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<LibraryPage>, ApiError> {
    state
        .library()
        .browse(&query)
        .await
        .map(Json)
        .map_err(library_error)
}

/// Model counts and bytes on disk
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<LibraryStats>, ApiError> {
    state
        .library()
        .stats()
        .await
        .map(Json)
        .map_err(library_error)
}
