use crate::types::ExecutionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("command already exists: {0}")]
    CommandExists(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("failed to launch process: {0}")]
    LaunchFailed(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("execution {0} is not active")]
    NotActive(ExecutionId),

    #[error("failed to terminate process {pid}: {reason}")]
    TerminationFailed { pid: u32, reason: String },

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
