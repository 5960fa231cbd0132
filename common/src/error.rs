//! Error handling for the mr-common crate.

use thiserror::Error;

/// Error type shared by every stage of the worker pipeline.
///
/// Variants carry a human-readable message plus an optional source so the
/// underlying I/O, codec or RPC error is kept in the chain.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The coordinator could not be reached or a call failed in transit.
    #[error("Transport failure: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The coordinator replied with something the worker cannot interpret.
    #[error("Protocol violation: {message}")]
    Protocol {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A user function failed or panicked, or the task input was unreadable.
    #[error("Task execution failed: {message}")]
    TaskExecution {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A reduce task found no output for one of the map tasks feeding its bucket.
    #[error("Missing intermediate output of map task {map_task_id} for bucket {bucket}")]
    MissingMapOutput { map_task_id: u32, bucket: u32 },

    #[error("IO operation failed: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Serialization failed: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

impl WorkerError {
    /// Create a transport error with a custom message.
    pub fn transport_error<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with a custom message and source error.
    pub fn transport_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a protocol error with a custom message.
    pub fn protocol_error<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a task execution error with a custom message.
    pub fn task_execution_error<S: Into<String>>(message: S) -> Self {
        Self::TaskExecution {
            message: message.into(),
            source: None,
        }
    }

    /// Create a task execution error with a custom message and source error.
    pub fn task_execution_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::TaskExecution {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an IO error with a custom message and source error.
    pub fn io_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a serialization error with a custom message and source error.
    pub fn serialization_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a configuration error with a custom message.
    pub fn configuration_error<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the error must stop the worker loop.
    ///
    /// Transport and protocol failures mean the coordinator can no longer be
    /// trusted to hear about task outcomes; everything else is scoped to a
    /// single task and is reported back as a task failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Protocol { .. })
    }
}
