//! Distributed side of the worker
//!
//! The worker talks to a coordinator over gRPC: it pulls tasks, runs them
//! and reports the outcome. A reference coordinator lives here too.

pub mod coordinator;
pub mod task_client;
pub mod types;
pub mod worker;

pub use coordinator::Coordinator;
pub use task_client::{GrpcTaskClient, TaskClient};
pub use types::*;
pub use worker::{Worker, WorkerRuntime};

// Re-export generated protobuf types
pub mod proto {
    pub mod coordinator {
        tonic::include_proto!("mr.coordinator");
    }
}
