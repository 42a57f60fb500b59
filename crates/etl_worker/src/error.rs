use thiserror::Error;

/// `ErrFileRead` and the downstream failures a `FileTask` can carry (§7).
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("could not read {path}: {source}")]
    FileRead { path: String, #[source] source: std::io::Error },
    #[error("{path} could not be decoded with any of the configured encodings")]
    Undecodable { path: String },
    #[error("malformed delimited content in {path}: {source}")]
    Malformed { path: String, #[source] source: csv::Error },
    #[error(transparent)]
    Db(#[from] etl_db::DbError),
    #[error(transparent)]
    Metadata(#[from] etl_metadata::MetadataError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
