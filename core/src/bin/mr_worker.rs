//! Worker process: runs one or more worker loops against a coordinator.

use clap::Parser;
use mr_core::{GrpcTaskClient, Worker, WorkerConfig, WorkerRuntime, apps};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Exit status when the coordinator cannot be reached at startup
const EXIT_UNREACHABLE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "mr-worker", about = "Map/reduce worker")]
struct Args {
    /// Coordinator endpoint
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    coordinator: String,
    /// Application to run: wc or indexer
    #[arg(long, default_value = "wc")]
    app: String,
    /// Directory for intermediate and output files
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,
    /// Concurrent worker loops in this process
    #[arg(long, default_value_t = 1)]
    workers: usize,
    /// Threads for reducing groups in parallel (defaults to the CPU count)
    #[arg(long)]
    reduce_threads: Option<usize>,
    /// Delay before asking again when no task is available
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,
    /// Connection attempts before giving up on the coordinator
    #[arg(long, default_value_t = 5)]
    connect_retries: u32,
}

impl Args {
    fn config(&self) -> WorkerConfig {
        let mut config = WorkerConfig::default()
            .with_coordinator_addr(&self.coordinator)
            .with_work_dir(&self.work_dir)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms));
        config.connect_retries = self.connect_retries;
        if let Some(threads) = self.reduce_threads {
            config = config.with_reduce_parallelism(threads);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    let config = args.config();

    let Some(app) = apps::by_name(&args.app) else {
        error!(
            "Unknown application {}, expected one of {:?}",
            args.app,
            apps::APPLICATION_NAMES
        );
        return ExitCode::FAILURE;
    };
    let runtime = match WorkerRuntime::from_config(&config) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Cannot set up worker runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let client = match GrpcTaskClient::connect_with_retry(
        config.coordinator_addr.clone(),
        config.connect_retries,
        config.connect_backoff,
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            error!("Coordinator unreachable: {}", e);
            return ExitCode::from(EXIT_UNREACHABLE);
        }
    };

    let process_id = Uuid::new_v4().simple().to_string();
    let mut workers = JoinSet::new();
    for index in 0..args.workers.max(1) {
        let worker_id = format!("{}-{}", &process_id[..8], index);
        let worker = Worker::new(worker_id, client.clone(), app.clone(), runtime.clone());
        workers.spawn(worker.run());
    }

    let mut status = ExitCode::SUCCESS;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(state)) => info!(
                "Worker {} finished: {} completed, {} failed, {} declined",
                state.worker_id, state.completed_tasks, state.failed_tasks, state.rejected_reports
            ),
            Ok(Err(e)) => {
                error!("Worker stopped: {}", e);
                status = ExitCode::FAILURE;
            }
            Err(e) => {
                error!("Worker loop aborted: {}", e);
                status = ExitCode::FAILURE;
            }
        }
    }
    status
}
