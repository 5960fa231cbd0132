//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default file prefix of intermediate and output files.
pub const DEFAULT_FILE_PREFIX: &str = "mr";

/// Configuration for a worker process
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Coordinator endpoint, e.g. `http://127.0.0.1:50051`
    pub coordinator_addr: String,
    /// Directory holding intermediate and final output files
    pub work_dir: PathBuf,
    /// Prefix of every file the worker writes
    pub file_prefix: String,
    /// Threads used to run reduce groups in parallel
    pub reduce_parallelism: usize,
    /// How long to wait before asking again when no task is available
    pub poll_interval: Duration,
    /// Connection attempts made before the coordinator is declared unreachable
    pub connect_retries: u32,
    /// Delay between connection attempts
    pub connect_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            coordinator_addr: "http://127.0.0.1:50051".to_string(),
            work_dir: PathBuf::from("."),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            reduce_parallelism: num_cpus::get(),
            poll_interval: Duration::from_millis(500),
            connect_retries: 5,
            connect_backoff: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    pub fn with_coordinator_addr(mut self, addr: impl Into<String>) -> Self {
        self.coordinator_addr = addr.into();
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Zero is clamped to one thread.
    pub fn with_reduce_parallelism(mut self, threads: usize) -> Self {
        self.reduce_parallelism = threads.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_connect_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.connect_retries = retries;
        self.connect_backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.file_prefix, "mr");
        assert!(config.reduce_parallelism >= 1);
        assert!(config.connect_retries > 0);
    }

    #[test]
    fn test_builders() {
        let config = WorkerConfig::default()
            .with_coordinator_addr("http://10.0.0.1:7000")
            .with_work_dir("/tmp/job")
            .with_file_prefix("wc")
            .with_reduce_parallelism(0)
            .with_poll_interval(Duration::from_millis(10))
            .with_connect_retries(2, Duration::from_millis(5));
        assert_eq!(config.coordinator_addr, "http://10.0.0.1:7000");
        assert_eq!(config.work_dir, PathBuf::from("/tmp/job"));
        assert_eq!(config.file_prefix, "wc");
        assert_eq!(config.reduce_parallelism, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.connect_retries, 2);
    }
}
