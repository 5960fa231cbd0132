//! Worker loop
//!
//! A [`Worker`] repeatedly asks the coordinator for a task, runs it through
//! the map or reduce pipeline and reports the outcome, until the coordinator
//! says the job is done or the transport breaks.

use crate::config::WorkerConfig;
use crate::distributed::task_client::TaskClient;
use crate::distributed::types::{Task, TaskKind, TaskReply, WorkerPhase, WorkerState};
use crate::execution::{MapExecutor, OutputWriter, ReduceExecutor};
use crate::shuffle::{FileIntermediateStore, IntermediateStore};
use crate::traits::Application;
use mr_common::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Executors shared by every worker loop of a process.
#[derive(Clone)]
pub struct WorkerRuntime {
    pub map_executor: MapExecutor,
    pub reduce_executor: ReduceExecutor,
    pub output_writer: OutputWriter,
    pub poll_interval: Duration,
}

impl WorkerRuntime {
    /// File-backed runtime rooted at the configured work directory.
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        let store: Arc<dyn IntermediateStore> = Arc::new(FileIntermediateStore::new(
            &config.work_dir,
            config.file_prefix.clone(),
        )?);
        Self::with_store(store, config)
    }

    /// Runtime over an arbitrary intermediate store; output still goes to
    /// the configured work directory.
    pub fn with_store(store: Arc<dyn IntermediateStore>, config: &WorkerConfig) -> Result<Self> {
        Ok(Self {
            map_executor: MapExecutor::new(Arc::clone(&store)),
            reduce_executor: ReduceExecutor::new(store, config.reduce_parallelism)?,
            output_writer: OutputWriter::new(&config.work_dir, config.file_prefix.clone()),
            poll_interval: config.poll_interval,
        })
    }
}

/// One orchestrator loop with its own identity and coordinator channel.
pub struct Worker<C: TaskClient> {
    state: WorkerState,
    client: C,
    app: Application,
    runtime: WorkerRuntime,
}

impl<C: TaskClient> Worker<C> {
    pub fn new(
        worker_id: impl Into<String>,
        client: C,
        app: Application,
        runtime: WorkerRuntime,
    ) -> Self {
        Self {
            state: WorkerState::new(worker_id),
            client,
            app,
            runtime,
        }
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    fn transition(&mut self, phase: WorkerPhase) {
        debug!(
            "Worker {} {:?} -> {:?}",
            self.state.worker_id, self.state.phase, phase
        );
        self.state.phase = phase;
    }

    /// Runs until the coordinator reports that all tasks are done.
    ///
    /// Returns the final state on a clean stop; transport and protocol
    /// failures stop the loop and are returned as errors.
    pub async fn run(mut self) -> Result<WorkerState> {
        info!(
            "Worker {} running application {}",
            self.state.worker_id,
            self.app.name()
        );
        loop {
            match self.step().await {
                Ok(true) => continue,
                Ok(false) => {
                    info!(
                        "Worker {} stopping: {} tasks completed, {} failed",
                        self.state.worker_id, self.state.completed_tasks, self.state.failed_tasks
                    );
                    return Ok(self.state);
                }
                Err(e) => {
                    error!("Worker {} stopping on fatal error: {}", self.state.worker_id, e);
                    self.transition(WorkerPhase::Stopped);
                    return Err(e);
                }
            }
        }
    }

    /// Performs one request/execute/report cycle. Returns `false` once the
    /// worker has stopped.
    pub async fn step(&mut self) -> Result<bool> {
        if self.state.phase == WorkerPhase::Stopped {
            return Ok(false);
        }
        self.transition(WorkerPhase::Requesting);
        let reply = self.client.request_task(&self.state.worker_id).await?;

        let task = match reply {
            TaskReply::AllTasksDone => {
                self.transition(WorkerPhase::Stopped);
                return Ok(false);
            }
            TaskReply::NoTaskAvailable => {
                self.transition(WorkerPhase::Idle);
                sleep(self.runtime.poll_interval).await;
                return Ok(true);
            }
            TaskReply::Assigned(task) => task,
        };

        self.transition(WorkerPhase::Executing(task.kind));
        let outcome = Self::execute(&self.runtime, &self.app, &task).await;

        self.transition(WorkerPhase::Reporting);
        match outcome {
            Ok(locations) => {
                let accepted = self
                    .client
                    .report_done(&self.state.worker_id, task.id, task.kind, locations)
                    .await?;
                if accepted {
                    self.state.completed_tasks += 1;
                } else {
                    warn!(
                        "Coordinator declined done report for {} task {}",
                        task.kind, task.id
                    );
                    self.state.rejected_reports += 1;
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("{} task {} failed: {}", task.kind, task.id, e);
                self.client
                    .report_failed(&self.state.worker_id, task.id, task.kind, &e.to_string())
                    .await?;
                self.state.failed_tasks += 1;
            }
        }

        self.transition(WorkerPhase::Idle);
        Ok(true)
    }

    /// Runs a task and returns the locations to report.
    async fn execute(
        runtime: &WorkerRuntime,
        app: &Application,
        task: &Task,
    ) -> Result<Vec<String>> {
        match task.kind {
            TaskKind::Map => {
                let output = runtime.map_executor.run_map(task, app.map_fn()).await?;
                Ok(output.locations)
            }
            TaskKind::Reduce => {
                let output = runtime
                    .reduce_executor
                    .run_reduce(task, app.reduce_fn())
                    .await?;
                let path = runtime.output_writer.write(task.bucket(), &output).await?;
                Ok(vec![path.to_string_lossy().into_owned()])
            }
        }
    }
}
