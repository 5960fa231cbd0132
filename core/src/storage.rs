//! File naming contract and atomic publication of files.
//!
//! Every file a worker produces is first written under a unique staging
//! name in the destination directory and then renamed into place, so readers
//! either see a complete file or no file at all.

use mr_common::{Result, WorkerError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

/// Name of the intermediate unit written by `map_task_id` for `bucket`.
pub fn intermediate_name(prefix: &str, map_task_id: u32, bucket: u32) -> String {
    format!("{}-{}-{}", prefix, map_task_id, bucket)
}

/// Name of the final output file of `bucket`.
pub fn output_name(prefix: &str, bucket: u32) -> String {
    format!("{}-out-{}", prefix, bucket)
}

/// Unique hidden sibling of `path` used while the file is being written.
///
/// Uniqueness matters when the coordinator hands the same task to two
/// workers sharing a directory.
pub fn staging_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()))
}

/// Writes `data` to a staging file next to `path` and returns the staging path.
pub async fn stage(path: &Path, data: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            WorkerError::io_error_with_source(format!("creating directory {:?}", parent), e)
        })?;
    }
    let staged = staging_path(path);
    if let Err(e) = fs::write(&staged, data).await {
        discard(&[staged.clone()]).await;
        return Err(WorkerError::io_error_with_source(
            format!("writing staging file {:?}", staged),
            e,
        ));
    }
    Ok(staged)
}

/// Renames a staged file onto its final path.
pub async fn publish(staged: &Path, path: &Path) -> Result<()> {
    fs::rename(staged, path).await.map_err(|e| {
        WorkerError::io_error_with_source(format!("publishing {:?} as {:?}", staged, path), e)
    })
}

/// Removes staging files left behind by a failed attempt.
pub async fn discard(staged: &[PathBuf]) {
    for path in staged {
        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staging file {:?}: {}", path, e),
        }
    }
}

/// Writes `data` to `path` so that no reader ever observes a partial file.
pub async fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let staged = stage(path, data).await?;
    if let Err(e) = publish(&staged, path).await {
        discard(&[staged]).await;
        return Err(e);
    }
    Ok(())
}
