//! Task and worker state types
//!
//! This module defines the core types exchanged between the worker loop,
//! the executors and the coordinator protocol.

use crate::distributed::proto::coordinator as proto;
use mr_common::{KeyValue, Result, WorkerError};
use std::fmt;

/// Identifier of a task. For reduce tasks it is the bucket index.
pub type TaskId = u32;

/// Unique identifier for workers
pub type WorkerId = String;

/// Kind of work carried by a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Map,
    Reduce,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Map => write!(f, "map"),
            TaskKind::Reduce => write!(f, "reduce"),
        }
    }
}

impl From<TaskKind> for proto::TaskKind {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Map => proto::TaskKind::Map,
            TaskKind::Reduce => proto::TaskKind::Reduce,
        }
    }
}

impl TryFrom<i32> for TaskKind {
    type Error = WorkerError;

    fn try_from(value: i32) -> Result<Self> {
        match proto::TaskKind::try_from(value) {
            Ok(proto::TaskKind::Map) => Ok(TaskKind::Map),
            Ok(proto::TaskKind::Reduce) => Ok(TaskKind::Reduce),
            _ => Err(WorkerError::protocol_error(format!(
                "unknown task kind {}",
                value
            ))),
        }
    }
}

/// A unit of work assigned by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Path of the input split for a map task
    pub input_ref: String,
    /// Number of reduce buckets in the job
    pub partition_count: u32,
    /// Map tasks whose output feeds this reduce task's bucket
    pub map_task_ids: Vec<TaskId>,
}

impl Task {
    pub fn map(id: TaskId, input_ref: impl Into<String>, partition_count: u32) -> Self {
        Self {
            id,
            kind: TaskKind::Map,
            input_ref: input_ref.into(),
            partition_count,
            map_task_ids: Vec::new(),
        }
    }

    pub fn reduce(bucket: u32, partition_count: u32, map_task_ids: Vec<TaskId>) -> Self {
        Self {
            id: bucket,
            kind: TaskKind::Reduce,
            input_ref: String::new(),
            partition_count,
            map_task_ids,
        }
    }

    /// Bucket index handled by a reduce task.
    pub fn bucket(&self) -> u32 {
        self.id
    }
}

impl TryFrom<proto::TaskAssignment> for Task {
    type Error = WorkerError;

    fn try_from(assignment: proto::TaskAssignment) -> Result<Self> {
        let kind = TaskKind::try_from(assignment.kind)?;
        if assignment.partition_count == 0 {
            return Err(WorkerError::protocol_error(format!(
                "{} task {} has zero partitions",
                kind, assignment.task_id
            )));
        }
        if kind == TaskKind::Reduce && assignment.task_id >= assignment.partition_count {
            return Err(WorkerError::protocol_error(format!(
                "reduce task {} is outside {} buckets",
                assignment.task_id, assignment.partition_count
            )));
        }
        Ok(Self {
            id: assignment.task_id,
            kind,
            input_ref: assignment.input_ref,
            partition_count: assignment.partition_count,
            map_task_ids: assignment.map_task_ids,
        })
    }
}

impl From<&Task> for proto::TaskAssignment {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id,
            kind: proto::TaskKind::from(task.kind) as i32,
            input_ref: task.input_ref.clone(),
            partition_count: task.partition_count,
            map_task_ids: task.map_task_ids.clone(),
        }
    }
}

/// Coordinator's answer to a task request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReply {
    Assigned(Task),
    /// Nothing to hand out right now; ask again later
    NoTaskAvailable,
    /// The job is finished; the worker should stop
    AllTasksDone,
}

/// Pairs produced by one map task for one bucket
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntermediateBucket {
    pub map_task_id: TaskId,
    pub bucket: u32,
    pub pairs: Vec<KeyValue>,
}

/// Phase of the worker loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Requesting,
    Executing(TaskKind),
    Reporting,
    Stopped,
}

/// Identity and progress of one worker loop
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub worker_id: WorkerId,
    pub phase: WorkerPhase,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Done reports the coordinator declined, e.g. duplicates
    pub rejected_reports: u64,
}

impl WorkerState {
    pub fn new(worker_id: impl Into<WorkerId>) -> Self {
        Self {
            worker_id: worker_id.into(),
            phase: WorkerPhase::Idle,
            completed_tasks: 0,
            failed_tasks: 0,
            rejected_reports: 0,
        }
    }
}
