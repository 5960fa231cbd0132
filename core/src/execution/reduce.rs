//! Reduce task execution.

use crate::distributed::types::{Task, TaskKind};
use crate::shuffle::IntermediateStore;
use crate::traits::ReduceFunction;
use mr_common::{KeyValue, Result, WorkerError, group_sorted};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Sorts, groups and reduces the pairs of one bucket.
///
/// Output is in ascending key order with one entry per distinct key. Groups
/// are reduced in parallel on the current rayon pool; the indexed collect
/// writes each result into the slot of its group, so no two units share a
/// destination. The first failing group fails the whole bucket.
pub fn reduce_pairs(
    mut pairs: Vec<KeyValue>,
    reduce_fn: &dyn ReduceFunction,
) -> Result<Vec<KeyValue>> {
    pairs.sort_by(|a, b| a.key.cmp(&b.key));
    group_sorted(pairs)
        .into_par_iter()
        .map(|group| {
            reduce_fn
                .reduce(&group.key, &group.values)
                .map(|value| KeyValue::new(group.key.clone(), value))
                .map_err(|e| {
                    WorkerError::task_execution_error_with_source(
                        format!("reduce function failed on key {:?}", group.key),
                        e,
                    )
                })
        })
        .collect()
}

/// Collects a bucket's intermediate pairs and reduces them.
#[derive(Clone)]
pub struct ReduceExecutor {
    store: Arc<dyn IntermediateStore>,
    pool: Arc<rayon::ThreadPool>,
}

impl ReduceExecutor {
    pub fn new(store: Arc<dyn IntermediateStore>, parallelism: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism.max(1))
            .thread_name(|i| format!("mr-reduce-{}", i))
            .build()
            .map_err(|e| {
                WorkerError::Configuration {
                    message: "cannot build reduce thread pool".to_string(),
                    source: Some(e.into()),
                }
            })?;
        Ok(Self {
            store,
            pool: Arc::new(pool),
        })
    }

    /// Executes a reduce task and returns its final output.
    ///
    /// Fails with [`WorkerError::MissingMapOutput`] when any listed map
    /// task has no unit for the bucket.
    pub async fn run_reduce(
        &self,
        task: &Task,
        reduce_fn: Arc<dyn ReduceFunction>,
    ) -> Result<Vec<KeyValue>> {
        if task.kind != TaskKind::Reduce {
            return Err(WorkerError::task_execution_error(format!(
                "task {} is a {} task, not a reduce task",
                task.id, task.kind
            )));
        }
        let start = Instant::now();
        let bucket = task.bucket();
        let pairs = self.store.read_all(bucket, &task.map_task_ids).await?;
        debug!(
            "Reduce task {} read {} pairs from {} map outputs",
            task.id,
            pairs.len(),
            task.map_task_ids.len()
        );

        let pool = Arc::clone(&self.pool);
        let output = tokio::task::spawn_blocking(move || {
            pool.install(|| reduce_pairs(pairs, reduce_fn.as_ref()))
        })
        .await
        .map_err(|e| {
            WorkerError::task_execution_error_with_source(
                format!("reduce function panicked on task {}", task.id),
                e,
            )
        })??;

        info!(
            "Reduce task {} produced {} keys in {:?}",
            task.id,
            output.len(),
            start.elapsed()
        );
        Ok(output)
    }
}
