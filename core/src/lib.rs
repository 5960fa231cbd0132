//! MR Core - map/reduce worker runtime
//!
//! Pulls tasks from a coordinator, runs user map and reduce functions over
//! them and publishes intermediate and final output atomically.

pub mod apps;
pub mod config;
pub mod distributed;
pub mod execution;
pub mod shuffle;
pub mod storage;
pub mod traits;

pub use config::WorkerConfig;
pub use distributed::{
    Coordinator, GrpcTaskClient, Task, TaskClient, TaskKind, TaskReply, Worker, WorkerRuntime,
};
pub use execution::{MapExecutor, OutputWriter, ReduceExecutor};
pub use shuffle::{FileIntermediateStore, IntermediateStore, MemoryIntermediateStore};
pub use traits::{Application, MapFunction, ReduceFunction};

pub use mr_common::{KeyValue, Result, WorkerError};
