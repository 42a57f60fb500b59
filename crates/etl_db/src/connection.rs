//! Dialect Adapter (C1): connection handles, one per supported backend.
//!
//! Mirrors `DbConnection`/`DbTransaction` from the teacher's DuckDB-only
//! adapter, generalized to dispatch across sqlite/postgres/mysql pools (via
//! sqlx) and MS SQL (via tiberius, which has no `sqlx` driver). Every op is
//! wrapped in a `debug_span` carrying an FNV-1a SQL hash and duration, as in
//! the teacher's `execute_duckdb_on_conn`.

use std::time::Instant;

#[cfg(feature = "mysql")]
use sqlx::mysql::MySqlPool;
#[cfg(feature = "postgres")]
use sqlx::postgres::PgPool;
use sqlx::sqlite::SqlitePool;
use sqlx::{Column, Row as SqlxRow, TypeInfo};
use tracing::debug_span;

use crate::dialect::Dialect;
use crate::error::{DbError, Result};
use crate::value::{DbRow, DbTimestamp, DbValue};

#[cfg(feature = "mssql")]
use crate::mssql::MssqlHandle;

/// One open warehouse connection pool, keyed by dialect.
#[derive(Clone)]
pub enum DbConnection {
    Sqlite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
    #[cfg(feature = "mysql")]
    MySql(MySqlPool),
    #[cfg(feature = "mssql")]
    Mssql(MssqlHandle),
}

impl DbConnection {
    pub fn dialect(&self) -> Dialect {
        match self {
            DbConnection::Sqlite(_) => Dialect::Sqlite,
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(_) => Dialect::Postgres,
            #[cfg(feature = "mysql")]
            DbConnection::MySql(_) => Dialect::MySql,
            #[cfg(feature = "mssql")]
            DbConnection::Mssql(_) => Dialect::Mssql,
        }
    }

    /// `Conn.Exec(sql, args…)`. Returns rows affected.
    pub async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64> {
        let _span = exec_span("execute", sql);
        let started = Instant::now();
        let result = match self {
            DbConnection::Sqlite(pool) => {
                let mut q = sqlx::query(sql);
                for p in params {
                    q = bind_sqlite(q, p);
                }
                q.execute(pool).await.map(|r| r.rows_affected())?
            }
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(pool) => {
                let mut q = sqlx::query(sql);
                for p in params {
                    q = bind_postgres(q, p);
                }
                q.execute(pool).await.map(|r| r.rows_affected())?
            }
            #[cfg(feature = "mysql")]
            DbConnection::MySql(pool) => {
                let mut q = sqlx::query(sql);
                for p in params {
                    q = bind_mysql(q, p);
                }
                q.execute(pool).await.map(|r| r.rows_affected())?
            }
            #[cfg(feature = "mssql")]
            DbConnection::Mssql(handle) => handle.execute(sql, params).await?,
        };
        tracing::trace!(duration_ms = started.elapsed().as_millis() as u64, "executed");
        Ok(result)
    }

    /// `Conn.ExecMany(sql, argsBatch)`.
    pub async fn execute_many(&self, sql: &str, batches: &[Vec<DbValue>]) -> Result<u64> {
        let mut total = 0;
        for params in batches {
            total += self.execute(sql, params).await?;
        }
        Ok(total)
    }

    /// `Conn.Query(sql, args…) → Rows`.
    pub async fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>> {
        let _span = exec_span("query_all", sql);
        match self {
            DbConnection::Sqlite(pool) => {
                let mut q = sqlx::query(sql);
                for p in params {
                    q = bind_sqlite(q, p);
                }
                let rows = q.fetch_all(pool).await?;
                rows.iter().map(sqlite_row_to_db_row).collect()
            }
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(pool) => {
                let mut q = sqlx::query(sql);
                for p in params {
                    q = bind_postgres(q, p);
                }
                let rows = q.fetch_all(pool).await?;
                rows.iter().map(postgres_row_to_db_row).collect()
            }
            #[cfg(feature = "mysql")]
            DbConnection::MySql(pool) => {
                let mut q = sqlx::query(sql);
                for p in params {
                    q = bind_mysql(q, p);
                }
                let rows = q.fetch_all(pool).await?;
                rows.iter().map(mysql_row_to_db_row).collect()
            }
            #[cfg(feature = "mssql")]
            DbConnection::Mssql(handle) => handle.query_all(sql, params).await,
        }
    }

    pub async fn query_optional(&self, sql: &str, params: &[DbValue]) -> Result<Option<DbRow>> {
        Ok(self.query_all(sql, params).await?.into_iter().next())
    }

    pub async fn query_one(&self, sql: &str, params: &[DbValue]) -> Result<DbRow> {
        self.query_optional(sql, params)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("no row for query: {}", hash_sql(sql))))
    }
}

fn exec_span(op: &str, sql: &str) -> tracing::span::EnteredSpan {
    debug_span!("db_op", op = op, sql_hash = hash_sql(sql)).entered()
}

/// FNV-1a 64-bit hash of a SQL string, used for log correlation without
/// emitting raw SQL text into metrics.
pub fn hash_sql(sql: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn bind_sqlite<'q>(
    q: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q DbValue,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        DbValue::Null => q.bind(None::<String>),
        DbValue::Integer(v) => q.bind(v),
        DbValue::Real(v) => q.bind(v),
        DbValue::Text(v) => q.bind(v),
        DbValue::Blob(v) => q.bind(v),
        DbValue::Boolean(v) => q.bind(v),
        DbValue::Timestamp(ts) => q.bind(ts.to_rfc3339()),
    }
}

#[cfg(feature = "postgres")]
fn bind_postgres<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &'q DbValue,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        DbValue::Null => q.bind(None::<String>),
        DbValue::Integer(v) => q.bind(v),
        DbValue::Real(v) => q.bind(v),
        DbValue::Text(v) => q.bind(v),
        DbValue::Blob(v) => q.bind(v),
        DbValue::Boolean(v) => q.bind(v),
        DbValue::Timestamp(ts) => q.bind(ts.as_chrono()),
    }
}

#[cfg(feature = "mysql")]
fn bind_mysql<'q>(
    q: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    value: &'q DbValue,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    match value {
        DbValue::Null => q.bind(None::<String>),
        DbValue::Integer(v) => q.bind(v),
        DbValue::Real(v) => q.bind(v),
        DbValue::Text(v) => q.bind(v),
        DbValue::Blob(v) => q.bind(v),
        DbValue::Boolean(v) => q.bind(v),
        DbValue::Timestamp(ts) => q.bind(ts.as_chrono()),
    }
}

fn sqlite_row_to_db_row(row: &sqlx::sqlite::SqliteRow) -> Result<DbRow> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, col) in row.columns().iter().enumerate() {
        columns.push(col.name().to_string());
        values.push(sqlite_value_at(row, idx, col.type_info().name())?);
    }
    Ok(DbRow { columns, values })
}

fn sqlite_value_at(row: &sqlx::sqlite::SqliteRow, idx: usize, type_name: &str) -> Result<DbValue> {
    use sqlx::Row;
    match type_name.to_ascii_uppercase().as_str() {
        "INTEGER" | "BIGINT" | "INT" => {
            let v: Option<i64> = row.try_get(idx).map_err(DbError::from)?;
            Ok(v.map(DbValue::Integer).unwrap_or(DbValue::Null))
        }
        "REAL" | "FLOAT" | "DOUBLE" => {
            let v: Option<f64> = row.try_get(idx).map_err(DbError::from)?;
            Ok(v.map(DbValue::Real).unwrap_or(DbValue::Null))
        }
        "BOOLEAN" | "BOOL" => {
            let v: Option<bool> = row.try_get(idx).map_err(DbError::from)?;
            Ok(v.map(DbValue::Boolean).unwrap_or(DbValue::Null))
        }
        "BLOB" => {
            let v: Option<Vec<u8>> = row.try_get(idx).map_err(DbError::from)?;
            Ok(v.map(DbValue::Blob).unwrap_or(DbValue::Null))
        }
        _ => {
            let v: Option<String> = row.try_get(idx).map_err(DbError::from)?;
            Ok(v.map(DbValue::Text).unwrap_or(DbValue::Null))
        }
    }
}

#[cfg(feature = "postgres")]
fn postgres_row_to_db_row(row: &sqlx::postgres::PgRow) -> Result<DbRow> {
    use sqlx::Row;
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, col) in row.columns().iter().enumerate() {
        columns.push(col.name().to_string());
        let type_name = col.type_info().name().to_ascii_uppercase();
        let value = match type_name.as_str() {
            "INT2" | "INT4" | "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .map_err(DbError::from)?
                .map(DbValue::Integer)
                .unwrap_or(DbValue::Null),
            "FLOAT4" | "FLOAT8" | "NUMERIC" => row
                .try_get::<Option<f64>, _>(idx)
                .map_err(DbError::from)?
                .map(DbValue::Real)
                .unwrap_or(DbValue::Null),
            "BOOL" => row
                .try_get::<Option<bool>, _>(idx)
                .map_err(DbError::from)?
                .map(DbValue::Boolean)
                .unwrap_or(DbValue::Null),
            "TIMESTAMP" | "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .map_err(DbError::from)?
                .map(|dt| DbValue::Timestamp(DbTimestamp::from_chrono(dt)))
                .unwrap_or(DbValue::Null),
            _ => row
                .try_get::<Option<String>, _>(idx)
                .map_err(DbError::from)?
                .map(DbValue::Text)
                .unwrap_or(DbValue::Null),
        };
        values.push(value);
    }
    Ok(DbRow { columns, values })
}

#[cfg(feature = "mysql")]
fn mysql_row_to_db_row(row: &sqlx::mysql::MySqlRow) -> Result<DbRow> {
    use sqlx::Row;
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, col) in row.columns().iter().enumerate() {
        columns.push(col.name().to_string());
        let type_name = col.type_info().name().to_ascii_uppercase();
        let value = match type_name.as_str() {
            "TINYINT" | "SMALLINT" | "INT" | "BIGINT" => row
                .try_get::<Option<i64>, _>(idx)
                .map_err(DbError::from)?
                .map(DbValue::Integer)
                .unwrap_or(DbValue::Null),
            "FLOAT" | "DOUBLE" | "DECIMAL" => row
                .try_get::<Option<f64>, _>(idx)
                .map_err(DbError::from)?
                .map(DbValue::Real)
                .unwrap_or(DbValue::Null),
            "DATETIME" | "TIMESTAMP" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .map_err(DbError::from)?
                .map(|dt| DbValue::Timestamp(DbTimestamp::from_chrono(dt)))
                .unwrap_or(DbValue::Null),
            _ => row
                .try_get::<Option<String>, _>(idx)
                .map_err(DbError::from)?
                .map(DbValue::Text)
                .unwrap_or(DbValue::Null),
        };
        values.push(value);
    }
    Ok(DbRow { columns, values })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_hash_is_stable_and_sensitive_to_content() {
        let a = hash_sql("SELECT 1");
        let b = hash_sql("SELECT 1");
        let c = hash_sql("SELECT 2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
