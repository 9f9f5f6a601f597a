use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] r8ci_core::errors::ConfigError),

    #[error(transparent)]
    Protocol(#[from] r8ci_core::errors::ProtocolError),

    #[error(transparent)]
    Historic(#[from] r8ci_core::errors::HistoricError),

    #[error(transparent)]
    Executor(#[from] r8ci_executor::ExecutorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blob '{0}' does not exist.")]
    BlobNotFound(String),

    #[error("Invalid blob key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Storage command '{command}' failed: {stderr}")]
    StoreCommandFailed { command: String, stderr: String },

    #[error("git command '{command}' failed: {stderr}")]
    GitFailed { command: String, stderr: String },

    #[error("The working tree has uncommitted changes, refusing to touch it:\n{diff}")]
    DirtyWorkingTree { diff: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;
