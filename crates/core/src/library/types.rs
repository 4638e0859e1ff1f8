//! Library entries, pages and totals.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::LibraryError;
use crate::job::ModelFile;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Where a library entry was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Single,
    Batch,
}

/// One finished model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Job id for single jobs, item id for batch items.
    pub id: String,
    pub source: ModelSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub name: String,
    pub description: String,
    /// Batch category, or the detected domain of a single job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    pub model_files: Vec<ModelFile>,
}

impl LibraryEntry {
    /// Case-insensitive substring match on the category.
    pub fn matches_category(&self, filter: &str) -> bool {
        let filter = filter.trim().to_lowercase();
        filter.is_empty()
            || self
                .category
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(&filter))
    }
}

/// Paging and filtering for [`ModelLibrary::browse`](super::ModelLibrary::browse).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrowseQuery {
    #[serde(default)]
    pub category: Option<String>,
    /// One-based page number.
    #[serde(default = "first_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn first_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for BrowseQuery {
    fn default() -> Self {
        Self {
            category: None,
            page: first_page(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl BrowseQuery {
    pub fn validate(&self) -> Result<(), LibraryError> {
        if self.page == 0 {
            return Err(LibraryError::InvalidPage("page starts at 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(LibraryError::InvalidPage(format!(
                "page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        Ok(())
    }
}

/// One page of library entries, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryPage {
    /// Entries matching the filter across all pages.
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub models: Vec<LibraryEntry>,
}

impl LibraryPage {
    /// Cut page `query.page` out of `entries`. Pages past the end are empty.
    pub(crate) fn slice(entries: Vec<LibraryEntry>, query: &BrowseQuery) -> Self {
        let total = entries.len();
        let models = entries
            .into_iter()
            .skip(query.page.saturating_sub(1) * query.page_size)
            .take(query.page_size)
            .collect();
        Self {
            total,
            page: query.page,
            page_size: query.page_size,
            total_pages: total.div_ceil(query.page_size),
            models,
        }
    }
}

/// Totals over the whole library.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryStats {
    pub single_models: usize,
    pub batch_models: usize,
    pub total_models: usize,
    /// Bytes on disk under every entry's directory.
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
}

impl LibraryStats {
    pub(crate) fn new(single_models: usize, batch_models: usize, total_size_bytes: u64) -> Self {
        let mb = total_size_bytes as f64 / 1024.0 / 1024.0;
        Self {
            single_models,
            batch_models,
            total_models: single_models + batch_models,
            total_size_bytes,
            total_size_mb: (mb * 100.0).round() / 100.0,
        }
    }
}
