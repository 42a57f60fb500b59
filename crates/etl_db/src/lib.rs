//! Dialect Adapter (C1) and Repository (C3) for the ETL warehouse.
//!
//! Opens connections across SQLite, MS SQL/Azure SQL, PostgreSQL, and MySQL,
//! normalizes canonical DDL/SQL fragments to the active dialect, and exposes
//! a dialect-agnostic parameterized CRUD surface.
//!
//! ```rust,ignore
//! use etl_db::{DbConnection, Repository};
//!
//! let conn = DbConnection::Sqlite(pool);
//! let repo = Repository::new(&conn, "people");
//! repo.upsert_by_primary_key(&rows, "person_id").await?;
//! ```

pub mod connection;
pub mod dialect;
pub mod error;
#[cfg(feature = "mssql")]
pub mod mssql;
pub mod quote;
pub mod repository;
pub mod value;

pub use connection::{hash_sql, DbConnection};
pub use dialect::{Dialect, UnknownDialect};
pub use error::{DbError, Result};
pub use quote::{quote_ident, quote_ident_path};
pub use repository::{InsertResult, QueryResult, Repository, Row};
pub use value::{DbRow, DbTimestamp, DbValue, FromDbValue};
