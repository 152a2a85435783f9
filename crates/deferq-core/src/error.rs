use std::path::PathBuf;

use thiserror::Error;

use crate::domain::DiagnosticContext;

/// Failure raised by a task or by an error handler.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Source(Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    pub fn msg(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }

    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        TaskError::Source(Box::new(source))
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// A task failed and no error handler was configured. The rest of the
    /// generation was abandoned.
    #[error("task failed while flushing queue `{queue}`")]
    TaskFailed {
        queue: String,
        #[source]
        source: TaskError,
        context: DiagnosticContext,
    },

    #[error("error handler failed while flushing queue `{queue}`")]
    HandlerFailed {
        queue: String,
        #[source]
        source: TaskError,
    },

    #[error("queue `{queue}` is already flushing")]
    AlreadyFlushing { queue: String },

    #[error("unknown queue `{0}`")]
    UnknownQueue(String),

    #[error("queue driver is closed")]
    DriverClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
