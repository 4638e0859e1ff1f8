//! Durable index of finished batches.
//!
//! Each batch writes `<output_dir>/<batch_id>/index.json` when it finishes.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

use super::error::BatchError;
use super::types::{BatchIndex, BatchIndexEntry, IndexItem, ItemStatus};

pub const INDEX_FILE: &str = "index.json";

pub fn index_path(output_dir: &Path, batch_id: &str) -> PathBuf {
    output_dir.join(batch_id).join(INDEX_FILE)
}

/// Write the index of `index.batch_id` under `output_dir`.
pub async fn write_index(output_dir: &Path, index: &BatchIndex) -> Result<PathBuf, BatchError> {
    let dir = output_dir.join(&index.batch_id);
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| BatchError::io(&dir, e))?;

    let path = dir.join(INDEX_FILE);
    let bytes = serde_json::to_vec_pretty(index)?;
    fs::write(&path, bytes)
        .await
        .map_err(|e| BatchError::io(&path, e))?;
    Ok(path)
}

pub async fn read_index(output_dir: &Path, batch_id: &str) -> Result<BatchIndex, BatchError> {
    let path = index_path(output_dir, batch_id);
    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BatchError::NotFound(batch_id.to_string()))
        }
        Err(e) => return Err(BatchError::io(&path, e)),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

/// Every persisted batch under `output_dir`, newest first.
///
/// Directories without a readable index are skipped.
pub async fn list_batches(output_dir: &Path) -> Result<Vec<BatchIndexEntry>, BatchError> {
    let mut batches = Vec::new();
    let mut entries = match fs::read_dir(output_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(batches),
        Err(e) => return Err(BatchError::io(output_dir, e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| BatchError::io(output_dir, e))?
    {
        let path = entry.path().join(INDEX_FILE);
        let index: BatchIndex = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(index) => index,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable batch index");
                    continue;
                }
            },
            Err(_) => continue,
        };

        let count = |status| index.items.iter().filter(|i| i.status == status).count();
        batches.push(BatchIndexEntry {
            completed: count(ItemStatus::Completed),
            failed: count(ItemStatus::Failed),
            item_count: index.items.len(),
            batch_id: index.batch_id,
            category: index.category,
            created_at: index.created_at,
            path,
        });
    }

    batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(batches)
}

/// Completed items of a persisted batch, with their model files.
pub async fn batch_models(output_dir: &Path, batch_id: &str) -> Result<Vec<IndexItem>, BatchError> {
    let index = read_index(output_dir, batch_id).await?;
    Ok(index
        .items
        .into_iter()
        .filter(|item| item.status == ItemStatus::Completed)
        .collect())
}
