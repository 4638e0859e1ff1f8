//! Unpacking of downloaded model archives.

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use super::error::PipelineError;
use crate::job::ModelFile;

/// Extract a zip archive into `dest` and list the extracted files.
///
/// Every entry name is checked before anything is written; one entry that
/// would land outside `dest` rejects the whole archive. Files are returned
/// sorted by their path relative to `dest`.
pub async fn extract_archive(bytes: Vec<u8>, dest: &Path) -> Result<Vec<ModelFile>, PipelineError> {
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&bytes, &dest))
        .await
        .map_err(|e| PipelineError::Archive(format!("extraction task failed: {}", e)))?
}

fn extract_blocking(bytes: &[u8], dest: &Path) -> Result<Vec<ModelFile>, PipelineError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| PipelineError::Archive(e.to_string()))?;

    let mut entries: Vec<(usize, PathBuf, bool)> = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| PipelineError::Archive(e.to_string()))?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| PipelineError::Archive(format!("unsafe entry path: {}", entry.name())))?;
        entries.push((index, relative, entry.is_dir()));
    }

    fs::create_dir_all(dest).map_err(|e| PipelineError::io(dest, e))?;

    let mut files = Vec::new();
    for (index, relative, is_dir) in entries {
        let target = dest.join(&relative);
        if is_dir {
            fs::create_dir_all(&target).map_err(|e| PipelineError::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| PipelineError::Archive(e.to_string()))?;
        let mut out = File::create(&target).map_err(|e| PipelineError::io(&target, e))?;
        let size_bytes = io::copy(&mut entry, &mut out).map_err(|e| PipelineError::io(&target, e))?;

        files.push(ModelFile {
            name: relative.to_string_lossy().replace('\\', "/"),
            path: target,
            size_bytes,
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}
