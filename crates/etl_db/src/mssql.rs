//! Minimal MS SQL / Azure SQL connection handle via `tiberius`.
//!
//! `sqlx` has no MS SQL driver, so this backend is implemented directly
//! against `tiberius`'s async client over a Tokio TCP stream. Pooling is a
//! small round-robin over a fixed set of connections rather than a full
//! connection-pool crate, since the spec's default `max_connections=10` for
//! this dialect is modest and the upsert algorithm already serializes
//! per-table access (§5).

#![cfg(feature = "mssql")]

use std::sync::Arc;

use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::dialect::Dialect;
use crate::error::{DbError, Result};
use crate::value::{DbRow, DbTimestamp, DbValue};

type TiberiusClient = Client<Compat<TcpStream>>;

/// Connection parameters for MS SQL / Azure SQL (§6 `db` connection block).
#[derive(Debug, Clone)]
pub struct MssqlParams {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub trusted_connection: bool,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl MssqlParams {
    fn is_azure(&self) -> bool {
        Dialect::is_azure_sql(&self.server)
    }

    fn into_config(self) -> Result<Config> {
        if self.is_azure() && self.trusted_connection {
            return Err(DbError::dialect(
                "Azure SQL does not support trusted connections; user/password is required",
            ));
        }

        let mut config = Config::new();
        config.host(&self.server);
        config.port(self.port);
        config.database(&self.database);

        if self.is_azure() {
            config.encryption(EncryptionLevel::Required);
            config.trust_cert_ca(false);
        } else {
            config.trust_cert();
        }

        if self.trusted_connection {
            #[cfg(windows)]
            config.authentication(AuthMethod::Integrated);
            #[cfg(not(windows))]
            return Err(DbError::UnsupportedFeature(
                "trusted/integrated authentication is only available on Windows".into(),
            ));
        } else {
            let user = self
                .user
                .ok_or_else(|| DbError::dialect("mssql: user is required when not using a trusted connection"))?;
            let password = self.password.unwrap_or_default();
            config.authentication(AuthMethod::sql_server(user, password));
        }

        Ok(config)
    }
}

/// A handle to a small fixed pool of MS SQL connections.
#[derive(Clone)]
pub struct MssqlHandle {
    conns: Arc<Vec<Mutex<TiberiusClient>>>,
    next: Arc<std::sync::atomic::AtomicUsize>,
}

impl MssqlHandle {
    pub async fn connect(params: MssqlParams, pool_size: usize) -> Result<Self> {
        let config = params.into_config()?;
        let mut conns = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            let tcp = TcpStream::connect(config.get_addr())
                .await
                .map_err(DbError::Io)?;
            tcp.set_nodelay(true).ok();
            let client = Client::connect(config.clone(), tcp.compat_write())
                .await
                .map_err(DbError::Tiberius)?;
            conns.push(Mutex::new(client));
        }
        Ok(Self {
            conns: Arc::new(conns),
            next: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        })
    }

    fn pick(&self) -> &Mutex<TiberiusClient> {
        let idx = self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % self.conns.len();
        &self.conns[idx]
    }

    pub async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64> {
        let mut client = self.pick().lock().await;
        let bound = to_tiberius_params(params);
        let result = client
            .execute(sql, &bound.iter().map(|v| v as &dyn tiberius::ToSql).collect::<Vec<_>>())
            .await
            .map_err(DbError::Tiberius)?;
        Ok(result.total())
    }

    pub async fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>> {
        let mut client = self.pick().lock().await;
        let bound = to_tiberius_params(params);
        let stream = client
            .query(sql, &bound.iter().map(|v| v as &dyn tiberius::ToSql).collect::<Vec<_>>())
            .await
            .map_err(DbError::Tiberius)?;
        let rows = stream.into_first_result().await.map_err(DbError::Tiberius)?;
        rows.iter().map(tiberius_row_to_db_row).collect()
    }
}

/// `tiberius` binds owned scalar types directly; `DbValue::Null` becomes a
/// typed `Option::None` so the wire format still carries the column type.
enum TiberiusBound {
    I64(i64),
    F64(f64),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Null,
}

impl tiberius::ToSql for TiberiusBound {
    fn to_sql(&self) -> tiberius::ColumnData<'_> {
        match self {
            TiberiusBound::I64(v) => v.to_sql(),
            TiberiusBound::F64(v) => v.to_sql(),
            TiberiusBound::Str(v) => v.as_str().to_sql(),
            TiberiusBound::Bool(v) => v.to_sql(),
            TiberiusBound::Bytes(v) => v.as_slice().to_sql(),
            TiberiusBound::Null => tiberius::ColumnData::Binary(None),
        }
    }
}

fn to_tiberius_params(params: &[DbValue]) -> Vec<TiberiusBound> {
    params
        .iter()
        .map(|v| match v {
            DbValue::Null => TiberiusBound::Null,
            DbValue::Integer(i) => TiberiusBound::I64(*i),
            DbValue::Real(f) => TiberiusBound::F64(*f),
            DbValue::Text(s) => TiberiusBound::Str(s.clone()),
            DbValue::Blob(b) => TiberiusBound::Bytes(b.clone()),
            DbValue::Boolean(b) => TiberiusBound::Bool(*b),
            DbValue::Timestamp(ts) => TiberiusBound::Str(ts.to_rfc3339()),
        })
        .collect()
}

fn tiberius_row_to_db_row(row: &tiberius::Row) -> Result<DbRow> {
    let mut columns = Vec::with_capacity(row.columns().len());
    let mut values = Vec::with_capacity(row.columns().len());
    for (idx, col) in row.columns().iter().enumerate() {
        columns.push(col.name().to_string());
        values.push(tiberius_value_at(row, idx)?);
    }
    Ok(DbRow { columns, values })
}

fn tiberius_value_at(row: &tiberius::Row, idx: usize) -> Result<DbValue> {
    if let Ok(Some(v)) = row.try_get::<i64, _>(idx) {
        return Ok(DbValue::Integer(v));
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(idx) {
        return Ok(DbValue::Integer(v as i64));
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(idx) {
        return Ok(DbValue::Real(v));
    }
    if let Ok(Some(v)) = row.try_get::<bool, _>(idx) {
        return Ok(DbValue::Boolean(v));
    }
    if let Ok(Some(v)) = row.try_get::<&str, _>(idx) {
        return Ok(DbValue::Text(v.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
        return Ok(DbValue::Timestamp(DbTimestamp::from_chrono(
            chrono::DateTime::from_naive_utc_and_offset(v, chrono::Utc),
        )));
    }
    Ok(DbValue::Null)
}
