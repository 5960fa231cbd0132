//! Reference coordinator
//!
//! Hands out one map task per input file, holds workers off while maps are
//! in flight, then hands out one reduce task per bucket. It keeps no leases:
//! a task is only handed out again after its worker reports a failure.

use crate::distributed::proto::coordinator::{
    AllTasksDone, NoTaskAvailable, ReportTaskDoneRequest, ReportTaskDoneResponse,
    ReportTaskFailedRequest, ReportTaskFailedResponse, RequestTaskRequest, RequestTaskResponse,
    coordinator_service_server::{CoordinatorService, CoordinatorServiceServer},
    request_task_response::Reply,
};
use crate::distributed::types::{Task, TaskId, TaskKind, WorkerId};
use mr_common::{Result, WorkerError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotStatus {
    Idle,
    InProgress(WorkerId),
    Completed,
}

#[derive(Debug)]
struct TaskSlot {
    task: Task,
    status: SlotStatus,
    attempts: u32,
}

impl TaskSlot {
    fn new(task: Task) -> Self {
        Self {
            task,
            status: SlotStatus::Idle,
            attempts: 0,
        }
    }
}

#[derive(Debug)]
struct JobState {
    maps: Vec<TaskSlot>,
    reduces: Vec<TaskSlot>,
}

impl JobState {
    fn all_completed(slots: &[TaskSlot]) -> bool {
        slots.iter().all(|s| s.status == SlotStatus::Completed)
    }

    fn is_done(&self) -> bool {
        Self::all_completed(&self.maps) && Self::all_completed(&self.reduces)
    }

    fn slots_mut(&mut self, kind: TaskKind) -> &mut Vec<TaskSlot> {
        match kind {
            TaskKind::Map => &mut self.maps,
            TaskKind::Reduce => &mut self.reduces,
        }
    }

    /// Picks the next idle task of the current phase.
    fn assign(&mut self, worker_id: &str) -> Reply {
        if self.is_done() {
            return Reply::Done(AllTasksDone {});
        }
        let phase = if Self::all_completed(&self.maps) {
            &mut self.reduces
        } else {
            &mut self.maps
        };
        match phase.iter_mut().find(|s| s.status == SlotStatus::Idle) {
            Some(slot) => {
                slot.status = SlotStatus::InProgress(worker_id.to_string());
                slot.attempts += 1;
                Reply::Task((&slot.task).into())
            }
            None => Reply::Wait(NoTaskAvailable {}),
        }
    }
}

/// In-memory task tracker served over gRPC.
#[derive(Clone)]
pub struct Coordinator {
    state: Arc<Mutex<JobState>>,
    done_tx: Arc<watch::Sender<bool>>,
    linger: Duration,
}

impl Coordinator {
    /// Builds a job over `inputs` with `n_reduce` buckets.
    pub fn new(inputs: Vec<String>, n_reduce: u32) -> Result<Self> {
        if n_reduce == 0 {
            return Err(WorkerError::configuration_error(
                "a job needs at least one reduce bucket",
            ));
        }
        let map_ids: Vec<TaskId> = (0..inputs.len() as TaskId).collect();
        let maps = inputs
            .into_iter()
            .enumerate()
            .map(|(id, input)| TaskSlot::new(Task::map(id as TaskId, input, n_reduce)))
            .collect();
        let reduces = (0..n_reduce)
            .map(|bucket| TaskSlot::new(Task::reduce(bucket, n_reduce, map_ids.clone())))
            .collect();
        let state = JobState { maps, reduces };
        let (done_tx, _) = watch::channel(state.is_done());

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            done_tx: Arc::new(done_tx),
            linger: Duration::from_secs(1),
        })
    }

    /// How long the server keeps answering `AllTasksDone` once the job is
    /// finished.
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub async fn is_done(&self) -> bool {
        self.state.lock().await.is_done()
    }

    /// Resolves once every map and reduce task has been acknowledged.
    pub async fn wait_until_done(&self) {
        let mut done_rx = self.done_tx.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = done_rx.wait_for(|done| *done).await;
    }

    /// Number of times a task has been handed out.
    pub async fn attempts(&self, kind: TaskKind, task_id: TaskId) -> Option<u32> {
        let mut state = self.state.lock().await;
        state
            .slots_mut(kind)
            .get(task_id as usize)
            .map(|slot| slot.attempts)
    }

    pub fn into_service(self) -> CoordinatorServiceServer<Self> {
        CoordinatorServiceServer::new(self)
    }

    /// Binds `addr` and serves until the job is done.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            WorkerError::transport_error_with_source(format!("cannot bind {}", addr), e)
        })?;
        self.serve_with_listener(listener).await
    }

    /// Serves on an already bound listener until the job is done and the
    /// linger period has elapsed.
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr().ok();
        info!("Coordinator listening on {:?}", local_addr);

        let shutdown = {
            let coordinator = self.clone();
            async move {
                coordinator.wait_until_done().await;
                info!("All tasks done, shutting down in {:?}", coordinator.linger);
                tokio::time::sleep(coordinator.linger).await;
            }
        };

        Server::builder()
            .add_service(self.into_service())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
            .map_err(|e| WorkerError::transport_error_with_source("coordinator server failed", e))
    }
}

fn decode_kind(kind: i32) -> std::result::Result<TaskKind, Status> {
    TaskKind::try_from(kind).map_err(|e| Status::invalid_argument(e.to_string()))
}

#[tonic::async_trait]
impl CoordinatorService for Coordinator {
    async fn request_task(
        &self,
        request: Request<RequestTaskRequest>,
    ) -> std::result::Result<Response<RequestTaskResponse>, Status> {
        let worker_id = request.into_inner().worker_id;
        let reply = self.state.lock().await.assign(&worker_id);
        if let Reply::Task(assignment) = &reply {
            debug!(
                "Assigned task {} (kind {}) to worker {}",
                assignment.task_id, assignment.kind, worker_id
            );
        }
        Ok(Response::new(RequestTaskResponse { reply: Some(reply) }))
    }

    async fn report_task_done(
        &self,
        request: Request<ReportTaskDoneRequest>,
    ) -> std::result::Result<Response<ReportTaskDoneResponse>, Status> {
        let req = request.into_inner();
        let kind = decode_kind(req.kind)?;

        let mut state = self.state.lock().await;
        let (accepted, message) = match state.slots_mut(kind).get_mut(req.task_id as usize) {
            None => (false, format!("unknown {} task {}", kind, req.task_id)),
            Some(slot) if slot.status == SlotStatus::Completed => (
                false,
                format!("{} task {} already completed", kind, req.task_id),
            ),
            Some(slot) => {
                if let SlotStatus::InProgress(owner) = &slot.status {
                    if *owner != req.worker_id {
                        debug!(
                            "{} task {} was assigned to {}, completed by {}",
                            kind, req.task_id, owner, req.worker_id
                        );
                    }
                }
                slot.status = SlotStatus::Completed;
                info!(
                    "Worker {} completed {} task {} ({} outputs)",
                    req.worker_id,
                    kind,
                    req.task_id,
                    req.output_locations.len()
                );
                (true, String::new())
            }
        };
        if !accepted {
            debug!("Declined report from {}: {}", req.worker_id, message);
        }
        if state.is_done() {
            self.done_tx.send_replace(true);
        }
        Ok(Response::new(ReportTaskDoneResponse { accepted, message }))
    }

    async fn report_task_failed(
        &self,
        request: Request<ReportTaskFailedRequest>,
    ) -> std::result::Result<Response<ReportTaskFailedResponse>, Status> {
        let req = request.into_inner();
        let kind = decode_kind(req.kind)?;

        let mut state = self.state.lock().await;
        let acknowledged = match state.slots_mut(kind).get_mut(req.task_id as usize) {
            Some(slot) if slot.status != SlotStatus::Completed => {
                warn!(
                    "Worker {} failed {} task {}: {}. Requeueing",
                    req.worker_id, kind, req.task_id, req.reason
                );
                slot.status = SlotStatus::Idle;
                true
            }
            _ => false,
        };
        Ok(Response::new(ReportTaskFailedResponse { acknowledged }))
    }
}
