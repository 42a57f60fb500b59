//! Error taxonomy for the Dialect Adapter (C1) and Repository (C3).
//!
//! `Dialect` covers connect/exec failures surfaced by the adapter (`ErrDialect`);
//! `Repo` wraps it for repository-level callers per the "no partial success"
//! contract (`ErrRepo`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    /// `ErrDialect`: connect or exec failure from the underlying driver.
    #[error("dialect error: {0}")]
    Dialect(String),

    /// `ErrDialect{unsupported}`: the active dialect does not implement a
    /// requested capability (e.g. an MS SQL-only feature compiled out).
    #[error("unsupported feature for this dialect: {0}")]
    UnsupportedFeature(String),

    /// `ErrRepo`: repository-level failure, wrapping an adapter error. No
    /// partial success is ever reported alongside this variant.
    #[error("repository error: {0}")]
    Repo(String),

    #[error("row conversion error: {0}")]
    TypeConversion(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "mssql")]
    #[error("mssql error: {0}")]
    Tiberius(#[from] tiberius::error::Error),
}

impl DbError {
    pub fn dialect(msg: impl Into<String>) -> Self {
        Self::Dialect(msg.into())
    }

    pub fn repo(msg: impl Into<String>) -> Self {
        Self::Repo(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
