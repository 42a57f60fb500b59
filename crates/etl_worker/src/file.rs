//! File Worker (C8, §4.8): reads one file, runs validation → clean → hash →
//! upsert, and reports the outcome. Never raises across its API: every
//! failure is caught and folded into a `failed` `FileResult` (§7).

use std::time::Instant;

use etl_db::repository::Row as DbRow;
use etl_db::{DbConnection, DbValue, Repository};
use etl_metadata::{now_iso, FileTaskStatus, MetadataRecord, MetadataStatus, MetadataStore};
use etl_schema::{detect_drift, SchemaCatalog, Severity};
use etl_security::{FieldsToHash, PhiHasher};

use crate::cleaner;
use crate::discovery::FileTask;
use crate::table::{self, RawTable};

/// Terminal outcome of one `FileTask` (§3.2 counters, §7 error string).
#[derive(Debug, Clone)]
pub struct FileResult {
    pub file_name: String,
    pub table: String,
    pub status: FileTaskStatus,
    pub processed: i64,
    pub loaded: i64,
    pub inserted: i64,
    pub updated: i64,
    pub skipped: i64,
    pub issues: i64,
    pub error: Option<String>,
    pub elapsed_sec: f64,
}

impl FileResult {
    fn skipped(task: &FileTask, reason: &str, started: Instant) -> Self {
        Self {
            file_name: task.file_name.clone(),
            table: task.table.clone(),
            status: FileTaskStatus::Skipped,
            processed: 0,
            loaded: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            issues: 0,
            error: Some(reason.to_string()),
            elapsed_sec: started.elapsed().as_secs_f64(),
        }
    }

    fn failed(task: &FileTask, error: impl Into<String>, started: Instant) -> Self {
        Self {
            file_name: task.file_name.clone(),
            table: task.table.clone(),
            status: FileTaskStatus::Failed,
            processed: 0,
            loaded: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            issues: 0,
            error: Some(error.into()),
            elapsed_sec: started.elapsed().as_secs_f64(),
        }
    }
}

/// Everything one file's processing needs: the warehouse connection, the
/// metadata store, the schema catalog, and optional PHI hashing config.
pub struct FileWorker<'a> {
    pub conn: &'a DbConnection,
    pub metadata: &'a MetadataStore,
    pub catalog: &'a SchemaCatalog,
    pub hasher: Option<(&'a PhiHasher, &'a FieldsToHash)>,
    pub username: String,
    pub trigger_type: &'static str,
}

impl FileWorker<'_> {
    /// Runs the full per-file pipeline described in §4.8. Always returns;
    /// never propagates an error to the caller.
    pub async fn process(&self, task: FileTask) -> FileResult {
        let started = Instant::now();

        // Step 1: mark processing, write a metadata row.
        let record = MetadataRecord {
            file_name: task.file_name.clone(),
            table_name: task.table.clone(),
            file_date: task.file_date.clone(),
            records_processed: 0,
            records_inserted: 0,
            records_updated: 0,
            started_at: now_iso(),
            completed_at: None,
            status: MetadataStatus::Processing.as_str().to_string(),
            error_message: None,
            file_hash: task.content_hash.clone(),
            trigger_type: self.trigger_type.to_string(),
            triggered_by: self.username.clone(),
        };
        if let Err(e) = self.metadata.start_metadata_row(&record).await {
            return FileResult::failed(&task, format!("metadata store unavailable: {e}"), started);
        }

        match self.process_inner(&task).await {
            Ok(mut result) => {
                result.elapsed_sec = started.elapsed().as_secs_f64();
                let status = if result.status == FileTaskStatus::Completed {
                    MetadataStatus::Success
                } else {
                    MetadataStatus::Failed
                };
                if let Err(e) = self
                    .metadata
                    .close_metadata_row(
                        &task.file_name,
                        status,
                        result.processed,
                        result.inserted,
                        result.updated,
                        result.error.as_deref(),
                    )
                    .await
                {
                    tracing::warn!(file = %task.file_name, error = %e, "failed to close metadata row");
                }
                result
            }
            Err(FileStepOutcome::Skip(reason)) => {
                if let Err(e) = self
                    .metadata
                    .close_metadata_row(&task.file_name, MetadataStatus::Success, 0, 0, 0, None)
                    .await
                {
                    tracing::warn!(file = %task.file_name, error = %e, "failed to close metadata row for skipped file");
                }
                FileResult::skipped(&task, &reason, started)
            }
            Err(FileStepOutcome::Fail(error)) => {
                if let Err(e) = self
                    .metadata
                    .close_metadata_row(&task.file_name, MetadataStatus::Failed, 0, 0, 0, Some(&error))
                    .await
                {
                    tracing::warn!(file = %task.file_name, error = %e, "failed to close metadata row for failed file");
                }
                FileResult::failed(&task, error, started)
            }
        }
    }

    async fn process_inner(&self, task: &FileTask) -> Result<FileResult, FileStepOutcome> {
        // Step 2: read the file.
        let raw = table::read_delimited_file(&task.path).map_err(|e| FileStepOutcome::Fail(e.to_string()))?;
        if raw.is_empty() {
            return Err(FileStepOutcome::Skip("Empty file".to_string()));
        }

        // Step 3: schema validation.
        let drifts = detect_drift(self.catalog, self.conn.dialect(), &task.table, &task.file_name, &raw.headers);
        let critical: Vec<_> = drifts.iter().filter(|d| d.severity == Severity::Critical).collect();
        for drift in &drifts {
            if let Err(e) = self.metadata.record_schema_drift(drift).await {
                tracing::warn!(file = %task.file_name, error = %e, "failed to persist schema drift");
            }
        }
        if !critical.is_empty() {
            let message = format!(
                "schema drift for {}: {}",
                task.table,
                critical.iter().map(|d| d.details.as_str()).collect::<Vec<_>>().join("; ")
            );
            return Err(FileStepOutcome::Fail(message));
        }

        // Step 4: clean.
        let (cleaned, issues) = cleaner::clean(raw, &task.table, self.hasher);
        for issue in &issues {
            if let Err(e) = self
                .metadata
                .record_data_quality_issue(&task.table, &task.file_name, issue.kind, &issue.description)
                .await
            {
                tracing::warn!(file = %task.file_name, error = %e, "failed to persist data quality issue");
            }
        }

        let processed = cleaned.row_count() as i64;

        // Step 5: load.
        let pk = self.catalog.primary_key(&task.table);
        let rows = to_repository_rows(&cleaned);
        let repo = Repository::new(self.conn, &task.table);

        let load_result = match pk {
            Some(pk) if cleaned.column_index(pk).is_some() => repo.upsert_by_primary_key(&rows, pk).await,
            _ => repo.insert_batch(&rows).await,
        };

        let insert_result = load_result.map_err(|e| FileStepOutcome::Fail(e.to_string()))?;

        let result = FileResult {
            file_name: task.file_name.clone(),
            table: task.table.clone(),
            status: FileTaskStatus::Completed,
            processed,
            loaded: insert_result.total as i64,
            inserted: insert_result.inserted as i64,
            updated: insert_result.updated as i64,
            skipped: insert_result.skipped as i64,
            issues: issues.len() as i64,
            error: None,
            elapsed_sec: 0.0,
        };

        // Step 6: drop the cleaned table explicitly before returning -
        // it can be tens of thousands of rows for a large file.
        drop(cleaned);

        Ok(result)
    }
}

enum FileStepOutcome {
    Skip(String),
    Fail(String),
}

fn to_repository_rows(table: &RawTable) -> Vec<DbRow> {
    table
        .rows
        .iter()
        .map(|row| {
            table
                .headers
                .iter()
                .zip(row.iter())
                .map(|(col, cell)| {
                    let value = match cell {
                        Some(s) => DbValue::Text(s.clone()),
                        None => DbValue::Null,
                    };
                    (col.clone(), value)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryStatus;
    use etl_schema::{CanonicalType, ColumnSpec, TableSpec};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::io::Write;

    async fn sqlite_with_people_table() -> DbConnection {
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

    fn people_catalog() -> SchemaCatalog {
        SchemaCatalog::new().with_table(TableSpec::new(
            "people",
            vec![
                ColumnSpec::new("person_id", CanonicalType::Text),
                ColumnSpec::new("first_name", CanonicalType::Text),
                ColumnSpec::new("last_name", CanonicalType::Text),
            ],
            Some("person_id"),
        ))
    }

    fn write_task(contents: &str, table: &str) -> (tempfile::NamedTempFile, FileTask) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        let path = f.path().to_path_buf();
        let task = FileTask {
            file_name: path.file_name().unwrap().to_string_lossy().to_string(),
            path,
            table: table.to_string(),
            file_date: "20250828".to_string(),
            content_hash: "deadbeef".to_string(),
            status: DiscoveryStatus::Pending,
        };
        (f, task)
    }

    #[tokio::test]
    async fn happy_path_upsert_inserts_three_rows() {
        // Scenario 1: happy path upsert.
        let conn = sqlite_with_people_table().await;
        let metadata = MetadataStore::connect_in_memory().await.unwrap();
        let catalog = people_catalog();
        let worker = FileWorker {
            conn: &conn,
            metadata: &metadata,
            catalog: &catalog,
            hasher: None,
            username: "svc".to_string(),
            trigger_type: "manual",
        };

        let (_guard, task) = write_task(
            "person_id|first_name|last_name\np1|John|Doe\np2|Jane|Smith\np3|Jos\u{e9}|Garc\u{ed}a\n",
            "people",
        );
        let result = worker.process(task).await;

        assert_eq!(result.status, FileTaskStatus::Completed);
        assert_eq!(result.inserted, 3);
        assert_eq!(result.updated, 0);
        assert_eq!(result.processed, 3);

        let row = metadata.get_metadata_row(&result.file_name).await.unwrap().unwrap();
        assert_eq!(row.status, "success");
        assert_eq!(row.file_hash, "deadbeef");
    }

    #[tokio::test]
    async fn empty_file_is_skipped() {
        let conn = sqlite_with_people_table().await;
        let metadata = MetadataStore::connect_in_memory().await.unwrap();
        let catalog = people_catalog();
        let worker = FileWorker {
            conn: &conn,
            metadata: &metadata,
            catalog: &catalog,
            hasher: None,
            username: "svc".to_string(),
            trigger_type: "manual",
        };

        let (_guard, task) = write_task("person_id|first_name|last_name\n", "people");
        let result = worker.process(task).await;
        assert_eq!(result.status, FileTaskStatus::Skipped);
        assert_eq!(result.loaded, 0);
    }

    #[tokio::test]
    async fn missing_column_fails_the_file_without_writing() {
        // Scenario 4: schema drift, missing column. `preferred_name` is in
        // the file header but the `people` table doesn't declare it, so the
        // table is missing a column the file needs.
        let conn = sqlite_with_people_table().await;
        let metadata = MetadataStore::connect_in_memory().await.unwrap();
        let catalog = people_catalog();
        let worker = FileWorker {
            conn: &conn,
            metadata: &metadata,
            catalog: &catalog,
            hasher: None,
            username: "svc".to_string(),
            trigger_type: "manual",
        };

        let (_guard, task) =
            write_task("person_id|first_name|last_name|preferred_name\np1|John|Doe|Johnny\n", "people");
        let result = worker.process(task).await;

        assert_eq!(result.status, FileTaskStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("preferred_name"));

        let repo = Repository::new(&conn, "people");
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_omitting_an_optional_catalog_column_still_loads() {
        // A file that omits a declared column is a warning, not a failure;
        // the omitted column loads as null.
        let conn = sqlite_with_people_table().await;
        let metadata = MetadataStore::connect_in_memory().await.unwrap();
        let catalog = people_catalog();
        let worker = FileWorker {
            conn: &conn,
            metadata: &metadata,
            catalog: &catalog,
            hasher: None,
            username: "svc".to_string(),
            trigger_type: "manual",
        };

        let (_guard, task) = write_task("person_id|first_name\np1|John\n", "people");
        let result = worker.process(task).await;

        assert_eq!(result.status, FileTaskStatus::Completed);
        assert_eq!(result.inserted, 1);
    }

    #[tokio::test]
    async fn unknown_table_fails_cleanly() {
        let conn = sqlite_with_people_table().await;
        let metadata = MetadataStore::connect_in_memory().await.unwrap();
        let catalog = people_catalog();
        let worker = FileWorker {
            conn: &conn,
            metadata: &metadata,
            catalog: &catalog,
            hasher: None,
            username: "svc".to_string(),
            trigger_type: "manual",
        };

        let (_guard, task) = write_task("a|b\n1|2\n", "unknown_table");
        let result = worker.process(task).await;
        assert_eq!(result.status, FileTaskStatus::Failed);
    }
}
