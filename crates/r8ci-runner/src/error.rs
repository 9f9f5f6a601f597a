use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] r8ci_core::errors::ConfigError),

    #[error(transparent)]
    Client(#[from] r8ci_client::error::ClientError),

    #[error(transparent)]
    Executor(#[from] r8ci_executor::ExecutorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Failed to install the Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Worker process failed: {0}")]
    Worker(String),
}
