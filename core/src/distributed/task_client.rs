//! Client side of the coordinator protocol.

use crate::distributed::proto::coordinator::{
    ReportTaskDoneRequest, ReportTaskFailedRequest, RequestTaskRequest,
    coordinator_service_client::CoordinatorServiceClient, request_task_response::Reply,
};
use crate::distributed::types::{Task, TaskId, TaskKind, TaskReply};
use async_trait::async_trait;
use mr_common::{Result, WorkerError};
use std::time::Duration;
use tokio::time::sleep;
use tonic::transport::Channel;
use tracing::{debug, info, warn};

/// Request/response channel to the coordinator.
///
/// Every call completes only once the coordinator has replied or the
/// transport failed. Failed calls are surfaced, never retried.
#[async_trait]
pub trait TaskClient: Send {
    async fn request_task(&mut self, worker_id: &str) -> Result<TaskReply>;

    /// Reports a finished task. Returns `false` when the coordinator
    /// declined the report, e.g. because the task was already acknowledged.
    async fn report_done(
        &mut self,
        worker_id: &str,
        task_id: TaskId,
        kind: TaskKind,
        output_locations: Vec<String>,
    ) -> Result<bool>;

    async fn report_failed(
        &mut self,
        worker_id: &str,
        task_id: TaskId,
        kind: TaskKind,
        reason: &str,
    ) -> Result<()>;
}

fn status_error(call: &str, status: tonic::Status) -> WorkerError {
    WorkerError::transport_error_with_source(
        format!("{} failed with {:?}", call, status.code()),
        status,
    )
}

/// gRPC implementation of [`TaskClient`].
#[derive(Debug, Clone)]
pub struct GrpcTaskClient {
    client: CoordinatorServiceClient<Channel>,
}

impl GrpcTaskClient {
    /// Connects once.
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let client = CoordinatorServiceClient::connect(addr.clone())
            .await
            .map_err(|e| {
                WorkerError::transport_error_with_source(
                    format!("cannot reach coordinator at {}", addr),
                    e,
                )
            })?;
        Ok(Self { client })
    }

    /// Connects, retrying up to `retries` more times with a fixed backoff.
    pub async fn connect_with_retry(
        addr: impl Into<String>,
        retries: u32,
        backoff: Duration,
    ) -> Result<Self> {
        let addr = addr.into();
        let mut attempt = 0;
        loop {
            match Self::connect(addr.clone()).await {
                Ok(client) => {
                    info!("Connected to coordinator at {}", addr);
                    return Ok(client);
                }
                Err(e) if attempt < retries => {
                    attempt += 1;
                    warn!(
                        "Connection attempt {} to {} failed: {}. Retrying in {:?}",
                        attempt, addr, e, backoff
                    );
                    sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl TaskClient for GrpcTaskClient {
    async fn request_task(&mut self, worker_id: &str) -> Result<TaskReply> {
        let response = self
            .client
            .request_task(RequestTaskRequest {
                worker_id: worker_id.to_string(),
            })
            .await
            .map_err(|status| status_error("RequestTask", status))?
            .into_inner();

        match response.reply {
            Some(Reply::Task(assignment)) => {
                let task = Task::try_from(assignment)?;
                debug!("Assigned {} task {}", task.kind, task.id);
                Ok(TaskReply::Assigned(task))
            }
            Some(Reply::Wait(_)) => Ok(TaskReply::NoTaskAvailable),
            Some(Reply::Done(_)) => Ok(TaskReply::AllTasksDone),
            None => Err(WorkerError::protocol_error(
                "RequestTask reply carries no outcome",
            )),
        }
    }

    async fn report_done(
        &mut self,
        worker_id: &str,
        task_id: TaskId,
        kind: TaskKind,
        output_locations: Vec<String>,
    ) -> Result<bool> {
        let request = ReportTaskDoneRequest {
            worker_id: worker_id.to_string(),
            task_id,
            kind: crate::distributed::proto::coordinator::TaskKind::from(kind) as i32,
            output_locations,
        };
        let response = self
            .client
            .report_task_done(request)
            .await
            .map_err(|status| status_error("ReportTaskDone", status))?
            .into_inner();
        if !response.accepted {
            debug!(
                "Coordinator declined done report for {} task {}: {}",
                kind, task_id, response.message
            );
        }
        Ok(response.accepted)
    }

    async fn report_failed(
        &mut self,
        worker_id: &str,
        task_id: TaskId,
        kind: TaskKind,
        reason: &str,
    ) -> Result<()> {
        let request = ReportTaskFailedRequest {
            worker_id: worker_id.to_string(),
            task_id,
            kind: crate::distributed::proto::coordinator::TaskKind::from(kind) as i32,
            reason: reason.to_string(),
        };
        let response = self
            .client
            .report_task_failed(request)
            .await
            .map_err(|status| status_error("ReportTaskFailed", status))?
            .into_inner();
        if !response.acknowledged {
            warn!(
                "Coordinator did not acknowledge failure of {} task {}",
                kind, task_id
            );
        }
        Ok(())
    }
}
