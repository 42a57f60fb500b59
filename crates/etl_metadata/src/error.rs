use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
