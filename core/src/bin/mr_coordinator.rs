//! Reference coordinator process.

use anyhow::Context;
use clap::Parser;
use mr_core::Coordinator;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mr-coordinator", about = "Map/reduce coordinator")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:50051")]
    listen: SocketAddr,
    /// Number of reduce buckets
    #[arg(long, default_value_t = 10)]
    n_reduce: u32,
    /// How long to keep answering workers after the job is done
    #[arg(long, default_value_t = 2000)]
    linger_ms: u64,
    /// Input files, one map task each
    #[arg(required = true)]
    inputs: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    info!(
        "Coordinating {} inputs over {} buckets",
        args.inputs.len(),
        args.n_reduce
    );
    let coordinator = Coordinator::new(args.inputs, args.n_reduce)?
        .with_linger(Duration::from_millis(args.linger_ms));
    coordinator
        .serve(args.listen)
        .await
        .with_context(|| format!("coordinator on {} failed", args.listen))?;
    info!("Job complete");
    Ok(())
}
