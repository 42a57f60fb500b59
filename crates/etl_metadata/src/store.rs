//! Durable metadata store (C4, §4.4). Always SQLite, co-located with the
//! process, independent of the dialect the warehouse itself speaks.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::audit::AuditEntry;
use crate::error::Result;
use crate::models::{
    now_iso, DataQualityRecord, JobFileRecord, JobRecord, JobStatus, MetadataRecord, MetadataStatus,
    SchemaErrorRecord,
};
use etl_schema::{DriftKind, SchemaDrift, Severity};

const SCHEMA_DDL: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS etl_jobs (
        job_id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT,
        total_files INTEGER NOT NULL DEFAULT 0,
        completed_files INTEGER NOT NULL DEFAULT 0,
        failed_files INTEGER NOT NULL DEFAULT 0,
        skipped_files INTEGER NOT NULL DEFAULT 0,
        total_records_loaded INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        username TEXT NOT NULL,
        trigger_type TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS etl_job_files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL,
        filename TEXT NOT NULL,
        table_name TEXT NOT NULL,
        status TEXT NOT NULL,
        processed INTEGER NOT NULL DEFAULT 0,
        loaded INTEGER NOT NULL DEFAULT 0,
        inserted INTEGER NOT NULL DEFAULT 0,
        updated INTEGER NOT NULL DEFAULT 0,
        skipped INTEGER NOT NULL DEFAULT 0,
        issues INTEGER NOT NULL DEFAULT 0,
        error TEXT,
        elapsed_sec REAL NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS etl_metadata (
        file_name TEXT UNIQUE NOT NULL,
        table_name TEXT NOT NULL,
        file_date TEXT NOT NULL,
        records_processed INTEGER NOT NULL DEFAULT 0,
        records_inserted INTEGER NOT NULL DEFAULT 0,
        records_updated INTEGER NOT NULL DEFAULT 0,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        status TEXT NOT NULL,
        error_message TEXT,
        file_hash TEXT NOT NULL,
        trigger_type TEXT NOT NULL,
        triggered_by TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS schema_errors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_name TEXT NOT NULL,
        file TEXT NOT NULL,
        kind TEXT NOT NULL,
        details TEXT NOT NULL,
        remediation_ddl TEXT,
        severity TEXT NOT NULL,
        detected_at TEXT NOT NULL,
        resolved_at TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS data_quality_issues (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_name TEXT NOT NULL,
        file TEXT NOT NULL,
        kind TEXT NOT NULL,
        description TEXT NOT NULL,
        detected_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS sys_audit_trail (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        username TEXT NOT NULL,
        action TEXT NOT NULL,
        category TEXT NOT NULL,
        success INTEGER NOT NULL,
        details TEXT,
        target_resource TEXT,
        error_message TEXT,
        duration_ms INTEGER,
        record_count INTEGER,
        file_size INTEGER
    )"#,
];

pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub async fn connect(path: &str) -> Result<Self> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(1).connect(":memory:").await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for ddl in SCHEMA_DDL {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// `Init` startup recovery (§4.4): idempotent rewrite of interrupted
    /// in-flight state left behind by an unclean process exit.
    pub async fn recover_on_startup(&self) -> Result<()> {
        let jobs = sqlx::query(
            "UPDATE etl_jobs SET status = 'failed', end_time = ?, error_message = 'server restarted during job execution' WHERE status = 'running'",
        )
        .bind(now_iso())
        .execute(&self.pool)
        .await?
        .rows_affected();
        if jobs > 0 {
            warn!(count = jobs, "recovered running jobs as failed after restart");
        }

        let files = sqlx::query(
            "UPDATE etl_metadata SET status = 'failed', completed_at = ?, error_message = 'processing interrupted' WHERE status = 'processing'",
        )
        .bind(now_iso())
        .execute(&self.pool)
        .await?
        .rows_affected();
        if files > 0 {
            warn!(count = files, "recovered processing files as failed after restart");
        }

        Ok(())
    }

    // ---- etl_jobs ----------------------------------------------------

    pub async fn insert_job(&self, job: &JobRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO etl_jobs
               (job_id, status, start_time, end_time, total_files, completed_files, failed_files,
                skipped_files, total_records_loaded, error_message, username, trigger_type, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&job.job_id)
        .bind(&job.status)
        .bind(&job.start_time)
        .bind(&job.end_time)
        .bind(job.total_files)
        .bind(job.completed_files)
        .bind(job.failed_files)
        .bind(job.skipped_files)
        .bind(job.total_records_loaded)
        .bind(&job.error_message)
        .bind(&job.username)
        .bind(&job.trigger_type)
        .bind(&job.created_at)
        .execute(&self.pool)
        .await?;
        info!(job_id = %job.job_id, "job persisted");
        Ok(())
    }

    pub async fn finish_job(&self, job: &JobRecord) -> Result<()> {
        sqlx::query(
            r#"UPDATE etl_jobs SET status = ?, end_time = ?, completed_files = ?, failed_files = ?,
               skipped_files = ?, total_records_loaded = ?, error_message = ? WHERE job_id = ?"#,
        )
        .bind(&job.status)
        .bind(&job.end_time)
        .bind(job.completed_files)
        .bind(job.failed_files)
        .bind(job.skipped_files)
        .bind(job.total_records_loaded)
        .bind(&job.error_message)
        .bind(&job.job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRecord>("SELECT * FROM etl_jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_active_jobs(&self) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query_as::<_, JobRecord>("SELECT * FROM etl_jobs WHERE status = 'running' ORDER BY start_time DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_job_history(&self, limit: i64) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query_as::<_, JobRecord>(
            "SELECT * FROM etl_jobs WHERE status != 'running' ORDER BY start_time DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ---- etl_job_files ------------------------------------------------

    pub async fn insert_job_file(&self, record: &JobFileRecord) -> Result<i64> {
        let id = sqlx::query(
            r#"INSERT INTO etl_job_files
               (job_id, filename, table_name, status, processed, loaded, inserted, updated, skipped, issues, error, elapsed_sec)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&record.job_id)
        .bind(&record.filename)
        .bind(&record.table_name)
        .bind(&record.status)
        .bind(record.processed)
        .bind(record.loaded)
        .bind(record.inserted)
        .bind(record.updated)
        .bind(record.skipped)
        .bind(record.issues)
        .bind(&record.error)
        .bind(record.elapsed_sec)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn job_files(&self, job_id: &str) -> Result<Vec<JobFileRecord>> {
        let rows = sqlx::query_as::<_, JobFileRecord>("SELECT * FROM etl_job_files WHERE job_id = ? ORDER BY id")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // ---- etl_metadata (fingerprints) -----------------------------------

    /// `(file_name, content_hash)` membership test used by Discovery's skip
    /// decision (§4.7). Only a `success` row counts as "already processed".
    pub async fn is_processed(&self, file_name: &str, content_hash: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM etl_metadata WHERE file_name = ? AND file_hash = ? AND status = 'success'",
        )
        .bind(file_name)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// A fresh row, or supersede the previous row for this filename (§4.4).
    pub async fn start_metadata_row(&self, record: &MetadataRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO etl_metadata
               (file_name, table_name, file_date, records_processed, records_inserted, records_updated,
                started_at, completed_at, status, error_message, file_hash, trigger_type, triggered_by)
               VALUES (?, ?, ?, 0, 0, 0, ?, NULL, 'processing', NULL, ?, ?, ?)
               ON CONFLICT(file_name) DO UPDATE SET
                 table_name = excluded.table_name,
                 file_date = excluded.file_date,
                 records_processed = 0, records_inserted = 0, records_updated = 0,
                 started_at = excluded.started_at,
                 completed_at = NULL,
                 status = 'processing',
                 error_message = NULL,
                 file_hash = excluded.file_hash,
                 trigger_type = excluded.trigger_type,
                 triggered_by = excluded.triggered_by"#,
        )
        .bind(&record.file_name)
        .bind(&record.table_name)
        .bind(&record.file_date)
        .bind(&record.started_at)
        .bind(&record.file_hash)
        .bind(&record.trigger_type)
        .bind(&record.triggered_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close_metadata_row(
        &self,
        file_name: &str,
        status: MetadataStatus,
        processed: i64,
        inserted: i64,
        updated: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE etl_metadata SET status = ?, completed_at = ?, records_processed = ?,
               records_inserted = ?, records_updated = ?, error_message = ? WHERE file_name = ?"#,
        )
        .bind(status.as_str())
        .bind(now_iso())
        .bind(processed)
        .bind(inserted)
        .bind(updated)
        .bind(error_message)
        .bind(file_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_metadata_row(&self, file_name: &str) -> Result<Option<MetadataRecord>> {
        let row = sqlx::query_as::<_, MetadataRecord>("SELECT * FROM etl_metadata WHERE file_name = ?")
            .bind(file_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    // ---- schema_errors --------------------------------------------------

    pub async fn record_schema_drift(&self, drift: &SchemaDrift) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO schema_errors (table_name, file, kind, details, remediation_ddl, severity, detected_at, resolved_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&drift.table)
        .bind(&drift.file)
        .bind(drift_kind_str(drift.kind))
        .bind(&drift.details)
        .bind(&drift.remediation_ddl)
        .bind(severity_str(drift.severity))
        .bind(drift.detected_at.to_rfc3339())
        .bind(drift.resolved_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn schema_errors_for_table(&self, table: &str) -> Result<Vec<SchemaErrorRecord>> {
        let rows = sqlx::query_as::<_, SchemaErrorRecord>(
            "SELECT * FROM schema_errors WHERE table_name = ? ORDER BY detected_at DESC",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ---- data_quality_issues --------------------------------------------

    pub async fn record_data_quality_issue(&self, table: &str, file: &str, kind: &str, description: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO data_quality_issues (table_name, file, kind, description, detected_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(table)
        .bind(file)
        .bind(kind)
        .bind(description)
        .bind(now_iso())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn data_quality_issues_for_file(&self, file: &str) -> Result<Vec<DataQualityRecord>> {
        let rows = sqlx::query_as::<_, DataQualityRecord>(
            "SELECT * FROM data_quality_issues WHERE file = ? ORDER BY detected_at",
        )
        .bind(file)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ---- sys_audit_trail --------------------------------------------------

    pub async fn log_audit(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO sys_audit_trail
               (timestamp, username, action, category, success, details, target_resource, error_message,
                duration_ms, record_count, file_size)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(now_iso())
        .bind(&entry.username)
        .bind(entry.action.as_str())
        .bind(entry.category.as_str())
        .bind(entry.success as i64)
        .bind(&entry.details)
        .bind(&entry.target_resource)
        .bind(&entry.error_message)
        .bind(entry.duration_ms)
        .bind(entry.record_count)
        .bind(entry.file_size)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn audit_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM sys_audit_trail").fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("c"))
    }
}

fn drift_kind_str(kind: DriftKind) -> &'static str {
    match kind {
        DriftKind::MissingTable => "missing_table",
        DriftKind::MissingColumn => "missing_column",
        DriftKind::ExtraColumn => "extra_column",
    }
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::Warning => "warning",
    }
}

pub fn new_job_id() -> String {
    format!("job-{}", chrono::Utc::now().format("%Y%m%d%H%M%S%6f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now_iso, JobTrigger};

    fn sample_job(job_id: &str) -> JobRecord {
        JobRecord {
            job_id: job_id.to_string(),
            status: JobStatus::Running.as_str().to_string(),
            start_time: now_iso(),
            end_time: None,
            total_files: 20,
            completed_files: 0,
            failed_files: 0,
            skipped_files: 0,
            total_records_loaded: 0,
            error_message: None,
            username: "svc".into(),
            trigger_type: JobTrigger::Manual.as_str().to_string(),
            created_at: now_iso(),
        }
    }

    #[tokio::test]
    async fn startup_recovery_rewrites_running_job_as_failed() {
        let store = MetadataStore::connect_in_memory().await.unwrap();
        store.insert_job(&sample_job("job-1")).await.unwrap();

        store.recover_on_startup().await.unwrap();

        let job = store.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, "failed");
        assert_eq!(job.error_message.as_deref(), Some("server restarted during job execution"));
    }

    #[tokio::test]
    async fn startup_recovery_rewrites_processing_file_as_failed() {
        let store = MetadataStore::connect_in_memory().await.unwrap();
        store
            .start_metadata_row(&MetadataRecord {
                file_name: "people_20250101.txt".into(),
                table_name: "people".into(),
                file_date: "20250101".into(),
                records_processed: 0,
                records_inserted: 0,
                records_updated: 0,
                started_at: now_iso(),
                completed_at: None,
                status: "processing".into(),
                error_message: None,
                file_hash: "deadbeef".into(),
                trigger_type: "manual".into(),
                triggered_by: "svc".into(),
            })
            .await
            .unwrap();

        store.recover_on_startup().await.unwrap();

        let row = store.get_metadata_row("people_20250101.txt").await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_message.as_deref(), Some("processing interrupted"));
    }

    #[tokio::test]
    async fn recovery_is_idempotent() {
        let store = MetadataStore::connect_in_memory().await.unwrap();
        store.insert_job(&sample_job("job-2")).await.unwrap();
        store.recover_on_startup().await.unwrap();
        store.recover_on_startup().await.unwrap();
        let job = store.get_job("job-2").await.unwrap().unwrap();
        assert_eq!(job.status, "failed");
    }

    #[tokio::test]
    async fn is_processed_requires_matching_hash_and_success_status() {
        let store = MetadataStore::connect_in_memory().await.unwrap();
        store
            .start_metadata_row(&MetadataRecord {
                file_name: "people_20250101.txt".into(),
                table_name: "people".into(),
                file_date: "20250101".into(),
                records_processed: 0,
                records_inserted: 0,
                records_updated: 0,
                started_at: now_iso(),
                completed_at: None,
                status: "processing".into(),
                error_message: None,
                file_hash: "abc123".into(),
                trigger_type: "manual".into(),
                triggered_by: "svc".into(),
            })
            .await
            .unwrap();

        assert!(!store.is_processed("people_20250101.txt", "abc123").await.unwrap());

        store
            .close_metadata_row("people_20250101.txt", MetadataStatus::Success, 3, 3, 0, None)
            .await
            .unwrap();

        assert!(store.is_processed("people_20250101.txt", "abc123").await.unwrap());
        assert!(!store.is_processed("people_20250101.txt", "different-hash").await.unwrap());
    }

    #[tokio::test]
    async fn reingesting_same_filename_supersedes_previous_row() {
        let store = MetadataStore::connect_in_memory().await.unwrap();
        let mk = |hash: &str| MetadataRecord {
            file_name: "people_20250101.txt".into(),
            table_name: "people".into(),
            file_date: "20250101".into(),
            records_processed: 0,
            records_inserted: 0,
            records_updated: 0,
            started_at: now_iso(),
            completed_at: None,
            status: "processing".into(),
            error_message: None,
            file_hash: hash.to_string(),
            trigger_type: "manual".into(),
            triggered_by: "svc".into(),
        };

        store.start_metadata_row(&mk("hash-v1")).await.unwrap();
        store.close_metadata_row("people_20250101.txt", MetadataStatus::Success, 3, 3, 0, None).await.unwrap();

        store.start_metadata_row(&mk("hash-v2")).await.unwrap();
        store.close_metadata_row("people_20250101.txt", MetadataStatus::Success, 5, 2, 3, None).await.unwrap();

        let row = store.get_metadata_row("people_20250101.txt").await.unwrap().unwrap();
        assert_eq!(row.file_hash, "hash-v2");
        assert_eq!(row.records_processed, 5);
    }
}
