use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::IdentityError;
use super::handle::sanitize_handle;
use crate::metrics::IDENTITY_RENAMES;

/// Characters of the temporary id appended on a name collision.
const SUFFIX_LEN: usize = 4;

/// Outcome of a successful rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedJob {
    /// Final handle (last path component).
    pub handle: String,
    /// Final working location.
    pub path: PathBuf,
}

/// Performs the one-time rename of a job's working directory from its
/// temporary handle to a semantic one.
///
/// Renames that share a base directory are serialized by a per-base lock.
/// The target is reserved with `create_dir`, which fails if anything already
/// exists there, so two renamers in different processes cannot both claim
/// the same name.
#[derive(Debug, Default)]
pub struct JobIdentityManager {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl JobIdentityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-base lock. Locks nobody holds are dropped on the way.
    async fn lock_for(&self, base: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(base.to_path_buf()).or_default())
    }

    /// Creates a fresh working directory `<base>/<desired_handle>`.
    ///
    /// Same collision rule as [`rename`](Self::rename): one suffixed
    /// attempt, then [`IdentityError::Collision`]. An existing directory is
    /// never reused, so two jobs can never end up sharing one.
    pub async fn claim(
        &self,
        base: &Path,
        desired_handle: &str,
        temp_id: &str,
    ) -> Result<RenamedJob, IdentityError> {
        let (desired, fallback) = candidates(desired_handle, temp_id)?;

        let lock = self.lock_for(base).await;
        let _guard = lock.lock().await;

        for handle in [&desired, &fallback] {
            let target = base.join(handle);
            if reserve(&target).await? {
                debug!(path = %target.display(), "Claimed working directory");
                return Ok(RenamedJob {
                    handle: handle.clone(),
                    path: target,
                });
            }
            debug!(handle = %handle, "Handle already taken");
        }

        warn!(desired = %desired, fallback = %fallback, "Working directory collision");
        Err(IdentityError::Collision { desired, fallback })
    }

    /// Moves `current_path` to `<parent>/<desired_handle>`.
    ///
    /// If that name is taken, one more attempt is made with
    /// `<desired>_<first 4 chars of temp_id>`. If that is taken too the
    /// rename fails with [`IdentityError::Collision`] and `current_path` is
    /// left untouched. A job already sitting at either name stays put.
    pub async fn rename(
        &self,
        current_path: &Path,
        desired_handle: &str,
        temp_id: &str,
    ) -> Result<RenamedJob, IdentityError> {
        let (desired, fallback) = candidates(desired_handle, temp_id)?;
        let base = current_path
            .parent()
            .ok_or_else(|| IdentityError::NoParent(current_path.to_path_buf()))?;

        let lock = self.lock_for(base).await;
        let _guard = lock.lock().await;

        for (attempt, handle) in [&desired, &fallback].into_iter().enumerate() {
            let target = base.join(handle);
            if target == current_path {
                return Ok(RenamedJob {
                    handle: handle.clone(),
                    path: target,
                });
            }
            if !reserve(&target).await? {
                debug!(handle = %handle, "Handle already taken");
                continue;
            }

            if let Err(e) = fs::rename(current_path, &target).await {
                let _ = fs::remove_dir(&target).await;
                return Err(IdentityError::Io {
                    from: current_path.to_path_buf(),
                    to: target,
                    source: e,
                });
            }

            let result = if attempt == 0 { "renamed" } else { "suffixed" };
            IDENTITY_RENAMES.with_label_values(&[result]).inc();
            info!(
                from = %current_path.display(),
                handle = %handle,
                suffixed = attempt > 0,
                "Renamed working directory"
            );
            return Ok(RenamedJob {
                handle: handle.clone(),
                path: target,
            });
        }

        IDENTITY_RENAMES.with_label_values(&["collision"]).inc();
        warn!(desired = %desired, fallback = %fallback, "Identity collision");
        Err(IdentityError::Collision { desired, fallback })
    }
}

/// Desired handle and its one suffixed fallback.
fn candidates(desired_handle: &str, temp_id: &str) -> Result<(String, String), IdentityError> {
    let desired = sanitize_handle(desired_handle);
    if desired.is_empty() {
        return Err(IdentityError::InvalidHandle(desired_handle.to_string()));
    }
    let suffix: String = sanitize_handle(temp_id).chars().take(SUFFIX_LEN).collect();
    let fallback = format!("{}_{}", desired, suffix);
    Ok((desired, fallback))
}

/// Claims `target` by creating it as an empty directory.
///
/// Returns `false` if an entry already exists there.
async fn reserve(target: &Path) -> Result<bool, IdentityError> {
    match fs::create_dir(target).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(IdentityError::Io {
            from: target.to_path_buf(),
            to: target.to_path_buf(),
            source: e,
        }),
    }
}
