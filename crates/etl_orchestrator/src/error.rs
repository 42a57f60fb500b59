use thiserror::Error;

/// Infrastructure-level failures only (§7): a file failing never produces
/// one of these, it only ever changes that file's own `FileTaskStatus`.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("job {0} not found")]
    UnknownJob(String),
    #[error(transparent)]
    Metadata(#[from] etl_metadata::MetadataError),
    #[error("file discovery failed: {0}")]
    Discovery(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
