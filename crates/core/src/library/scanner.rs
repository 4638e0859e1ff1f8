use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use super::error::LibraryError;
use super::types::{BrowseQuery, LibraryEntry, LibraryPage, LibraryStats, ModelSource};
use crate::batch::{batch_models, list_batches};
use crate::job::JobStage;
use crate::pipeline::list_results;

/// Finished models under a jobs directory and a batch directory.
#[derive(Debug, Clone)]
pub struct ModelLibrary {
    jobs_dir: PathBuf,
    batch_dir: PathBuf,
}

impl ModelLibrary {
    pub fn new(jobs_dir: impl Into<PathBuf>, batch_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs_dir: jobs_dir.into(),
            batch_dir: batch_dir.into(),
        }
    }

    /// Every completed single job and completed batch item, newest first.
    pub async fn entries(&self) -> Result<Vec<LibraryEntry>, LibraryError> {
        let mut entries: Vec<LibraryEntry> = list_results(&self.jobs_dir)
            .await?
            .into_iter()
            .filter(|job| job.stage == JobStage::Completed)
            .map(|job| LibraryEntry {
                name: job.display_name.clone(),
                category: job.detected_domain.clone(),
                source: ModelSource::Single,
                batch_id: None,
                created_at: job.created_at,
                output_dir: Some(job.output_dir),
                image_path: job.image_path,
                model_files: job.model_files,
                description: job.description,
                id: job.id,
            })
            .collect();

        for batch in list_batches(&self.batch_dir).await? {
            for item in batch_models(&self.batch_dir, &batch.batch_id).await? {
                entries.push(LibraryEntry {
                    id: item.id,
                    source: ModelSource::Batch,
                    batch_id: Some(batch.batch_id.clone()),
                    name: item.name,
                    description: item.description,
                    category: Some(batch.category.clone()),
                    created_at: batch.created_at,
                    output_dir: item.output_dir,
                    image_path: item.image_path,
                    model_files: item.model_files,
                });
            }
        }

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// One page of entries, optionally filtered by category.
    pub async fn browse(&self, query: &BrowseQuery) -> Result<LibraryPage, LibraryError> {
        query.validate()?;
        let mut entries = self.entries().await?;
        if let Some(category) = query.category.as_deref() {
            entries.retain(|e| e.matches_category(category));
        }
        debug!(matched = entries.len(), page = query.page, "Library browsed");
        Ok(LibraryPage::slice(entries, query))
    }

    /// Entry counts per source and bytes on disk.
    pub async fn stats(&self) -> Result<LibraryStats, LibraryError> {
        let entries = self.entries().await?;
        let single = entries
            .iter()
            .filter(|e| e.source == ModelSource::Single)
            .count();

        let mut total_size = 0;
        for dir in entries.iter().filter_map(|e| e.output_dir.as_deref()) {
            total_size += dir_size(dir).await?;
        }

        Ok(LibraryStats::new(single, entries.len() - single, total_size))
    }
}

/// Bytes of every regular file under `root`. A missing root counts as empty.
async fn dir_size(root: &Path) -> Result<u64, LibraryError> {
    let mut total = 0;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(LibraryError::Io { path: dir, source: e }),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LibraryError::Io {
                path: dir.clone(),
                source: e,
            })?
        {
            let file_type = entry.file_type().await.map_err(|e| LibraryError::Io {
                path: entry.path(),
                source: e,
            })?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                let metadata = entry.metadata().await.map_err(|e| LibraryError::Io {
                    path: entry.path(),
                    source: e,
                })?;
                total += metadata.len();
            }
        }
    }

    Ok(total)
}
