//! Final output files.

use crate::storage;
use mr_common::{KeyValue, Result, WorkerError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes a bucket's final output as `<prefix>-out-<bucket>`, one
/// `key value` line per record.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_dir: PathBuf,
    prefix: String,
}

impl OutputWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            prefix: prefix.into(),
        }
    }

    pub fn output_path(&self, bucket: u32) -> PathBuf {
        self.output_dir
            .join(storage::output_name(&self.prefix, bucket))
    }

    /// Writes `output` in order and returns the published path.
    pub async fn write(&self, bucket: u32, output: &[KeyValue]) -> Result<PathBuf> {
        let mut contents = String::new();
        for kv in output {
            if kv.key.contains('\n') || kv.value.contains('\n') {
                return Err(WorkerError::task_execution_error(format!(
                    "record for key {:?} contains a line break",
                    kv.key
                )));
            }
            contents.push_str(&kv.to_string());
            contents.push('\n');
        }
        let path = self.output_path(bucket);
        storage::atomic_write(&path, contents.as_bytes()).await?;
        debug!("Wrote {} records to {:?}", output.len(), path);
        Ok(path)
    }
}
