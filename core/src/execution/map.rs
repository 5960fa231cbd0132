//! Map task execution.

use crate::distributed::types::{IntermediateBucket, Task, TaskKind};
use crate::shuffle::IntermediateStore;
use crate::traits::MapFunction;
use mr_common::{HashPartitioner, KeyValue, Partitioner, Result, WorkerError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Routes every pair to its bucket; the result has exactly
/// `partitioner.num_partitions()` entries, empty buckets included.
pub fn partition_pairs(pairs: Vec<KeyValue>, partitioner: &dyn Partitioner) -> Vec<Vec<KeyValue>> {
    let mut buckets = vec![Vec::new(); partitioner.num_partitions() as usize];
    for kv in pairs {
        let bucket = partitioner.get_partition(&kv.key) as usize;
        buckets[bucket].push(kv);
    }
    buckets
}

/// What a map task published.
#[derive(Debug, Clone, Default)]
pub struct MapOutput {
    pub buckets: Vec<IntermediateBucket>,
    /// Store location of each bucket, in bucket order
    pub locations: Vec<String>,
}

/// Runs the user map function over one input split and publishes its
/// partitioned output.
#[derive(Clone)]
pub struct MapExecutor {
    store: Arc<dyn IntermediateStore>,
}

impl MapExecutor {
    pub fn new(store: Arc<dyn IntermediateStore>) -> Self {
        Self { store }
    }

    /// Executes a map task and returns what it published.
    ///
    /// Nothing is published when the input cannot be read or the map
    /// function fails or panics.
    pub async fn run_map(
        &self,
        task: &Task,
        map_fn: Arc<dyn MapFunction>,
    ) -> Result<MapOutput> {
        if task.kind != TaskKind::Map {
            return Err(WorkerError::task_execution_error(format!(
                "task {} is a {} task, not a map task",
                task.id, task.kind
            )));
        }
        let partitioner = HashPartitioner::new(task.partition_count)?;
        let start = Instant::now();

        let contents = tokio::fs::read_to_string(&task.input_ref)
            .await
            .map_err(|e| {
                WorkerError::task_execution_error_with_source(
                    format!("cannot read input split {:?}", task.input_ref),
                    e,
                )
            })?;

        let input_ref = task.input_ref.clone();
        let pairs = tokio::task::spawn_blocking(move || map_fn.map(&input_ref, &contents))
            .await
            .map_err(|e| {
                WorkerError::task_execution_error_with_source(
                    format!("map function panicked on task {}", task.id),
                    e,
                )
            })?
            .map_err(|e| {
                WorkerError::task_execution_error_with_source(
                    format!("map function failed on task {}", task.id),
                    e,
                )
            })?;
        debug!("Map task {} emitted {} pairs", task.id, pairs.len());

        let buckets: Vec<IntermediateBucket> = partition_pairs(pairs, &partitioner)
            .into_iter()
            .enumerate()
            .map(|(bucket, pairs)| IntermediateBucket {
                map_task_id: task.id,
                bucket: bucket as u32,
                pairs,
            })
            .collect();
        let locations = self.store.write_all(&buckets).await?;

        info!(
            "Map task {} wrote {} buckets in {:?}",
            task.id,
            buckets.len(),
            start.elapsed()
        );
        Ok(MapOutput { buckets, locations })
    }
}
