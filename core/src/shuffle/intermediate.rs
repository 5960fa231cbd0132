//! Intermediate store implementations
//!
//! Every map task owns the units `(map_task_id, bucket)` it writes, so
//! concurrent writers never touch the same unit and no locking is needed on
//! the file store's write path.

use crate::distributed::types::{IntermediateBucket, TaskId};
use crate::storage;
use async_trait::async_trait;
use mr_common::{KeyValue, Result, WorkerError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage for partitioned map output.
#[async_trait]
pub trait IntermediateStore: Send + Sync {
    /// Atomically publishes one unit and returns its location.
    async fn write(&self, map_task_id: TaskId, bucket: u32, pairs: &[KeyValue]) -> Result<String>;

    /// Publishes every bucket of one map task. If any bucket cannot be
    /// staged, none of them becomes visible.
    async fn write_all(&self, buckets: &[IntermediateBucket]) -> Result<Vec<String>>;

    /// Concatenates the units of `map_task_ids` for `bucket`, in the given
    /// map order. Fails with [`WorkerError::MissingMapOutput`] on the first
    /// absent unit.
    async fn read_all(&self, bucket: u32, map_task_ids: &[TaskId]) -> Result<Vec<KeyValue>>;

    async fn contains(&self, map_task_id: TaskId, bucket: u32) -> Result<bool>;
}

fn encode_pairs(pairs: &[KeyValue]) -> Result<Vec<u8>> {
    bincode::encode_to_vec(pairs, bincode::config::standard()).map_err(|e| {
        WorkerError::serialization_error_with_source("encoding intermediate pairs", e)
    })
}

fn decode_pairs(data: &[u8], path: &Path) -> Result<Vec<KeyValue>> {
    bincode::decode_from_slice(data, bincode::config::standard())
        .map(|(pairs, _)| pairs)
        .map_err(|e| {
            WorkerError::serialization_error_with_source(format!("decoding {:?}", path), e)
        })
}

/// File-based intermediate store: one bincode file per unit, named
/// `<prefix>-<mapTaskId>-<bucket>` inside the root directory.
#[derive(Debug, Clone)]
pub struct FileIntermediateStore {
    root_dir: PathBuf,
    prefix: String,
}

impl FileIntermediateStore {
    pub fn new<P: AsRef<Path>>(root_dir: P, prefix: impl Into<String>) -> Result<Self> {
        let path = root_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path).map_err(|e| {
            WorkerError::io_error_with_source(format!("creating work directory {:?}", path), e)
        })?;
        Ok(Self {
            root_dir: path,
            prefix: prefix.into(),
        })
    }

    pub fn unit_path(&self, map_task_id: TaskId, bucket: u32) -> PathBuf {
        self.root_dir
            .join(storage::intermediate_name(&self.prefix, map_task_id, bucket))
    }
}

#[async_trait]
impl IntermediateStore for FileIntermediateStore {
    async fn write(&self, map_task_id: TaskId, bucket: u32, pairs: &[KeyValue]) -> Result<String> {
        let path = self.unit_path(map_task_id, bucket);
        storage::atomic_write(&path, &encode_pairs(pairs)?).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn write_all(&self, buckets: &[IntermediateBucket]) -> Result<Vec<String>> {
        // Stage every unit before publishing any of them
        let mut staged = Vec::with_capacity(buckets.len());
        for unit in buckets {
            let path = self.unit_path(unit.map_task_id, unit.bucket);
            let encoded = match encode_pairs(&unit.pairs) {
                Ok(encoded) => encoded,
                Err(e) => {
                    let staged_paths: Vec<PathBuf> = staged.into_iter().map(|(s, _)| s).collect();
                    storage::discard(&staged_paths).await;
                    return Err(e);
                }
            };
            match storage::stage(&path, &encoded).await {
                Ok(staged_path) => staged.push((staged_path, path)),
                Err(e) => {
                    let staged_paths: Vec<PathBuf> = staged.into_iter().map(|(s, _)| s).collect();
                    storage::discard(&staged_paths).await;
                    return Err(e);
                }
            }
        }

        // A rename failure withdraws the units this attempt already published
        let mut locations = Vec::with_capacity(staged.len());
        for (i, (staged_path, path)) in staged.iter().enumerate() {
            if let Err(e) = storage::publish(staged_path, path).await {
                let published: Vec<PathBuf> =
                    staged[..i].iter().map(|(_, p)| p.clone()).collect();
                let remaining: Vec<PathBuf> =
                    staged[i..].iter().map(|(s, _)| s.clone()).collect();
                storage::discard(&published).await;
                storage::discard(&remaining).await;
                return Err(e);
            }
            locations.push(path.to_string_lossy().into_owned());
        }
        debug!("Published {} intermediate units", locations.len());
        Ok(locations)
    }

    async fn read_all(&self, bucket: u32, map_task_ids: &[TaskId]) -> Result<Vec<KeyValue>> {
        let mut pairs = Vec::new();
        for &map_task_id in map_task_ids {
            let path = self.unit_path(map_task_id, bucket);
            let data = match fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(WorkerError::MissingMapOutput {
                        map_task_id,
                        bucket,
                    });
                }
                Err(e) => {
                    return Err(WorkerError::io_error_with_source(
                        format!("reading {:?}", path),
                        e,
                    ));
                }
            };
            pairs.extend(decode_pairs(&data, &path)?);
        }
        Ok(pairs)
    }

    async fn contains(&self, map_task_id: TaskId, bucket: u32) -> Result<bool> {
        fs::try_exists(self.unit_path(map_task_id, bucket))
            .await
            .map_err(|e| WorkerError::io_error_with_source("checking intermediate unit", e))
    }
}

/// In-memory intermediate store, shared by clones.
#[derive(Debug, Default, Clone)]
pub struct MemoryIntermediateStore {
    prefix: String,
    units: Arc<RwLock<HashMap<(TaskId, u32), Vec<KeyValue>>>>,
}

impl MemoryIntermediateStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            units: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of units currently stored.
    pub async fn len(&self) -> usize {
        self.units.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.units.read().await.is_empty()
    }

    fn location(&self, map_task_id: TaskId, bucket: u32) -> String {
        format!(
            "memory://{}",
            storage::intermediate_name(&self.prefix, map_task_id, bucket)
        )
    }
}

#[async_trait]
impl IntermediateStore for MemoryIntermediateStore {
    async fn write(&self, map_task_id: TaskId, bucket: u32, pairs: &[KeyValue]) -> Result<String> {
        self.units
            .write()
            .await
            .insert((map_task_id, bucket), pairs.to_vec());
        Ok(self.location(map_task_id, bucket))
    }

    async fn write_all(&self, buckets: &[IntermediateBucket]) -> Result<Vec<String>> {
        let mut units = self.units.write().await;
        let mut locations = Vec::with_capacity(buckets.len());
        for unit in buckets {
            units.insert((unit.map_task_id, unit.bucket), unit.pairs.clone());
            locations.push(self.location(unit.map_task_id, unit.bucket));
        }
        Ok(locations)
    }

    async fn read_all(&self, bucket: u32, map_task_ids: &[TaskId]) -> Result<Vec<KeyValue>> {
        let units = self.units.read().await;
        let mut pairs = Vec::new();
        for &map_task_id in map_task_ids {
            let unit = units
                .get(&(map_task_id, bucket))
                .ok_or(WorkerError::MissingMapOutput {
                    map_task_id,
                    bucket,
                })?;
            pairs.extend(unit.iter().cloned());
        }
        Ok(pairs)
    }

    async fn contains(&self, map_task_id: TaskId, bucket: u32) -> Result<bool> {
        Ok(self.units.read().await.contains_key(&(map_task_id, bucket)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn unit(map_task_id: TaskId, bucket: u32, pairs: &[(&str, &str)]) -> IntermediateBucket {
        IntermediateBucket {
            map_task_id,
            bucket,
            pairs: pairs.iter().map(|&(k, v)| KeyValue::new(k, v)).collect(),
        }
    }

    #[tokio::test]
    async fn test_file_store_write_and_read() {
        let dir = tempdir().unwrap();
        let store = FileIntermediateStore::new(dir.path(), "mr").unwrap();

        let location = store
            .write(0, 1, &[KeyValue::new("the", "1")])
            .await
            .unwrap();
        assert!(location.ends_with("mr-0-1"));
        assert!(store.contains(0, 1).await.unwrap());
        assert!(!store.contains(0, 0).await.unwrap());

        store
            .write_all(&[unit(1, 0, &[]), unit(1, 1, &[("fox", "1"), ("the", "1")])])
            .await
            .unwrap();

        let pairs = store.read_all(1, &[0, 1]).await.unwrap();
        let keys: Vec<&str> = pairs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["the", "fox", "the"]);

        // Empty buckets are still published
        assert!(store.read_all(0, &[1]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_missing_unit() {
        let dir = tempdir().unwrap();
        let store = FileIntermediateStore::new(dir.path(), "mr").unwrap();
        store.write(0, 0, &[KeyValue::new("a", "1")]).await.unwrap();

        let err = store.read_all(0, &[0, 5]).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::MissingMapOutput {
                map_task_id: 5,
                bucket: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_file_store_leaves_no_staging_files() {
        let dir = tempdir().unwrap();
        let store = FileIntermediateStore::new(dir.path(), "mr").unwrap();
        store
            .write_all(&[unit(2, 0, &[("a", "1")]), unit(2, 1, &[("b", "1")])])
            .await
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["mr-2-0", "mr-2-1"]);
    }

    #[tokio::test]
    async fn test_file_store_failed_publish_withdraws_earlier_units() {
        let dir = tempdir().unwrap();
        let store = FileIntermediateStore::new(dir.path(), "mr").unwrap();

        // A non-empty directory in place of bucket 1 makes its rename fail
        let blocker = store.unit_path(0, 1);
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        let result = store
            .write_all(&[unit(0, 0, &[("a", "1")]), unit(0, 1, &[("b", "1")])])
            .await;
        assert!(result.is_err());

        let err = store.read_all(0, &[0]).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::MissingMapOutput {
                map_task_id: 0,
                bucket: 0
            }
        ));

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["mr-0-1"]);
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_unit() {
        let dir = tempdir().unwrap();
        let store = FileIntermediateStore::new(dir.path(), "mr").unwrap();
        std::fs::write(store.unit_path(0, 0), [0xff, 0xff, 0xff]).unwrap();

        let err = store.read_all(0, &[0]).await.unwrap_err();
        assert!(matches!(err, WorkerError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryIntermediateStore::new("mr");
        assert!(store.is_empty().await);

        let locations = store
            .write_all(&[unit(0, 0, &[("a", "1")]), unit(0, 1, &[("b", "1")])])
            .await
            .unwrap();
        assert_eq!(locations, vec!["memory://mr-0-0", "memory://mr-0-1"]);
        assert_eq!(store.len().await, 2);
        assert!(store.contains(0, 1).await.unwrap());

        let pairs = store.read_all(1, &[0]).await.unwrap();
        assert_eq!(pairs, vec![KeyValue::new("b", "1")]);
        assert!(store.read_all(1, &[0, 1]).await.is_err());
    }
}
