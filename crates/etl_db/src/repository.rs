//! Repository (C3): parameterized CRUD per warehouse table.
//!
//! Every call is parameterized; nothing interpolates user data into SQL
//! text (§4.3 contract). The upsert algorithm follows the literal spec: a
//! single `SELECT pk FROM t` prefetch splits the batch into existing/new
//! rows, because the core serializes workers per table (§5) so no concurrent
//! writer can race between the prefetch and the write (§9 Open Question a
//! notes `MERGE`/`ON CONFLICT` as a behaviorally-equivalent alternative; we
//! keep the prefetch form since it is dialect-uniform).

use std::time::Instant;

use crate::connection::DbConnection;
use crate::error::{DbError, Result};
use crate::quote::quote_ident;
use crate::value::{DbTimestamp, DbValue};

/// One named column value, as read from a cleaned file row.
pub type Row = Vec<(String, DbValue)>;

/// Result of `InsertBatch` / `UpsertByPrimaryKey` (§4.3, §9: split from a
/// heterogeneous `QueryResult` into a typed insert result).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertResult {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub total: u64,
    pub elapsed_ms: u64,
}

/// Result of a read (`GetAll`, `Search`).
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub total: u64,
}

pub struct Repository<'a> {
    conn: &'a DbConnection,
    table: &'a str,
}

impl<'a> Repository<'a> {
    pub fn new(conn: &'a DbConnection, table: &'a str) -> Self {
        Self { conn, table }
    }

    /// `InsertBatch(rows)` — appends; stamps both audit columns.
    pub async fn insert_batch(&self, rows: &[Row]) -> Result<InsertResult> {
        let started = Instant::now();
        if rows.is_empty() {
            return Ok(InsertResult::default());
        }

        let now = DbTimestamp::now();
        let mut inserted = 0u64;
        for row in rows {
            let mut columns: Vec<&str> = row.iter().map(|(c, _)| c.as_str()).collect();
            let mut values: Vec<DbValue> = row.iter().map(|(_, v)| v.clone()).collect();
            columns.push("etl_loaded_at");
            values.push(DbValue::Timestamp(now));
            columns.push("etl_updated_at");
            values.push(DbValue::Timestamp(now));

            let sql = build_insert_sql(self.table, &columns, self.conn);
            self.conn
                .execute(&sql, &values)
                .await
                .map_err(|e| DbError::repo(format!("insert into {}: {e}", self.table)))?;
            inserted += 1;
        }

        Ok(InsertResult {
            inserted,
            updated: 0,
            skipped: 0,
            total: rows.len() as u64,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// `UpsertByPrimaryKey(rows, pk)`.
    pub async fn upsert_by_primary_key(&self, rows: &[Row], pk: &str) -> Result<InsertResult> {
        let started = Instant::now();
        if rows.is_empty() {
            return Ok(InsertResult::default());
        }

        let existing = self.prefetch_keys(pk).await?;

        let mut to_insert = Vec::new();
        let mut to_update = Vec::new();
        for row in rows {
            match row.iter().find(|(c, _)| c == pk) {
                Some((_, DbValue::Text(v))) if existing.contains(v) => to_update.push(row),
                Some((_, value)) if matches!(value, DbValue::Integer(_)) => {
                    let key = match value {
                        DbValue::Integer(i) => i.to_string(),
                        _ => unreachable!(),
                    };
                    if existing.contains(&key) {
                        to_update.push(row);
                    } else {
                        to_insert.push(row);
                    }
                }
                Some(_) => to_insert.push(row),
                None => to_insert.push(row), // pk absent in this row: append
            }
        }

        let now = DbTimestamp::now();

        let insert_rows: Vec<Row> = to_insert.iter().map(|r| (*r).clone()).collect();
        let insert_result = self.insert_batch(&insert_rows).await?;

        let mut updated = 0u64;
        for row in &to_update {
            let pk_value = row
                .iter()
                .find(|(c, _)| c == pk)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| DbError::InvalidInput(format!("row missing primary key column {pk}")))?;

            let set_columns: Vec<&str> = row.iter().filter(|(c, _)| c != pk).map(|(c, _)| c.as_str()).collect();
            let mut values: Vec<DbValue> = row
                .iter()
                .filter(|(c, _)| c != pk)
                .map(|(_, v)| v.clone())
                .collect();
            values.push(DbValue::Timestamp(now));
            values.push(pk_value);

            let sql = build_update_sql(self.table, &set_columns, pk, self.conn);
            self.conn
                .execute(&sql, &values)
                .await
                .map_err(|e| DbError::repo(format!("update {} by {pk}: {e}", self.table)))?;
            updated += 1;
        }

        Ok(InsertResult {
            inserted: insert_result.inserted,
            updated,
            skipped: 0,
            total: rows.len() as u64,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn prefetch_keys(&self, pk: &str) -> Result<std::collections::HashSet<String>> {
        let sql = format!("SELECT {} FROM {}", quote_ident(pk), quote_ident(self.table));
        let rows = self
            .conn
            .query_all(&sql, &[])
            .await
            .map_err(|e| DbError::repo(format!("prefetch keys for {}: {e}", self.table)))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get_raw(0).cloned())
            .map(|v| match v {
                DbValue::Text(s) => s,
                DbValue::Integer(i) => i.to_string(),
                _ => String::new(),
            })
            .collect())
    }

    pub async fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(self.table));
        let row = self.conn.query_one(&sql, &[]).await.map_err(|e| DbError::repo(e.to_string()))?;
        row.get::<i64>(0).map(|v| v as u64)
    }

    pub async fn get_all(&self, limit: u64, offset: u64) -> Result<QueryResult> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {} OFFSET {}",
            quote_ident(self.table),
            limit,
            offset
        );
        let rows = self.conn.query_all(&sql, &[]).await.map_err(|e| DbError::repo(e.to_string()))?;
        let total = self.count().await?;
        Ok(QueryResult {
            rows: rows.into_iter().map(row_to_named).collect(),
            total,
        })
    }

    pub async fn get_by_id(&self, id: &DbValue, pk_col: &str) -> Result<Option<Row>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            quote_ident(self.table),
            quote_ident(pk_col)
        );
        let row = self.conn.query_optional(&sql, std::slice::from_ref(id)).await?;
        Ok(row.map(row_to_named))
    }

    pub async fn search(&self, term: &str, cols: &[&str], limit: u64) -> Result<QueryResult> {
        if cols.is_empty() {
            return Ok(QueryResult { rows: vec![], total: 0 });
        }
        let clause = cols
            .iter()
            .map(|c| format!("{} LIKE ?", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT * FROM {} WHERE {} LIMIT {}",
            quote_ident(self.table),
            clause,
            limit
        );
        let pattern = format!("%{term}%");
        let params: Vec<DbValue> = cols.iter().map(|_| DbValue::Text(pattern.clone())).collect();
        let rows = self.conn.query_all(&sql, &params).await?;
        let total = rows.len() as u64;
        Ok(QueryResult {
            rows: rows.into_iter().map(row_to_named).collect(),
            total,
        })
    }
}

fn row_to_named(row: crate::value::DbRow) -> Row {
    row.columns.into_iter().zip(row.values).collect()
}

fn build_insert_sql(table: &str, columns: &[&str], conn: &DbConnection) -> String {
    let cols = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| conn.dialect().placeholder(i))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", quote_ident(table), cols, placeholders)
}

fn build_update_sql(table: &str, set_columns: &[&str], pk: &str, conn: &DbConnection) -> String {
    let mut idx = 1;
    let mut assignments: Vec<String> = set_columns
        .iter()
        .map(|c| {
            let ph = conn.dialect().placeholder(idx);
            idx += 1;
            format!("{} = {}", quote_ident(c), ph)
        })
        .collect();
    assignments.push(format!("etl_updated_at = {}", conn.dialect().placeholder(idx)));
    idx += 1;
    let where_ph = conn.dialect().placeholder(idx);
    format!(
        "UPDATE {} SET {} WHERE {} = {}",
        quote_ident(table),
        assignments.join(", "),
        quote_ident(pk),
        where_ph
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> DbConnection {
        let pool = SqlitePoolOptions::new().connect(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE people (person_id TEXT PRIMARY KEY, first_name TEXT, last_name TEXT, \
             etl_loaded_at TEXT, etl_updated_at TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        DbConnection::Sqlite(pool)
    }

    fn row(pk: &str, first: &str, last: &str) -> Row {
        vec![
            ("person_id".into(), DbValue::Text(pk.into())),
            ("first_name".into(), DbValue::Text(first.into())),
            ("last_name".into(), DbValue::Text(last.into())),
        ]
    }

    #[tokio::test]
    async fn insert_batch_is_noop_on_empty_input() {
        let conn = setup().await;
        let repo = Repository::new(&conn, "people");
        let result = repo.insert_batch(&[]).await.unwrap();
        assert_eq!(result, InsertResult::default());
    }

    #[tokio::test]
    async fn happy_path_upsert_inserts_three_new_rows() {
        // Scenario 1: happy path upsert.
        let conn = setup().await;
        let repo = Repository::new(&conn, "people");
        let rows = vec![
            row("p1", "John", "Doe"),
            row("p2", "Jane", "Smith"),
            row("p3", "Jos\u{e9}", "Garc\u{ed}a"),
        ];
        let result = repo.upsert_by_primary_key(&rows, "person_id").await.unwrap();
        assert_eq!(result.inserted, 3);
        assert_eq!(result.updated, 0);
        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn upsert_over_existing_rows_splits_insert_and_update() {
        // Scenario 2: upsert over existing rows.
        let conn = setup().await;
        let repo = Repository::new(&conn, "people");
        repo.upsert_by_primary_key(&[row("p1", "John", "Doe")], "person_id")
            .await
            .unwrap();

        let result = repo
            .upsert_by_primary_key(&[row("p1", "Johnny", "Doe"), row("p4", "Bob", "Johnson")], "person_id")
            .await
            .unwrap();
        assert_eq!(result.inserted, 1);
        assert_eq!(result.updated, 1);

        let updated = repo.get_by_id(&DbValue::Text("p1".into()), "person_id").await.unwrap().unwrap();
        let first_name = updated.iter().find(|(c, _)| c == "first_name").unwrap();
        assert_eq!(first_name.1, DbValue::Text("Johnny".into()));
    }
}
