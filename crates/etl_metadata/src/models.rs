//! Entity types backing the Metadata Store tables (§3.2, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobTrigger {
    Manual,
    Automatic,
}

impl JobTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobTrigger::Manual => "manual",
            JobTrigger::Automatic => "automatic",
        }
    }
}

/// `FileTask.status` (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileTaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl FileTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileTaskStatus::Pending => "pending",
            FileTaskStatus::Processing => "processing",
            FileTaskStatus::Completed => "completed",
            FileTaskStatus::Failed => "failed",
            FileTaskStatus::Skipped => "skipped",
        }
    }
}

/// `etl_metadata.status`: the worker's own three-state lifecycle for a file,
/// distinct from `FileTaskStatus` which the orchestrator tracks (§4.4, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataStatus {
    Processing,
    Success,
    Failed,
}

impl MetadataStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataStatus::Processing => "processing",
            MetadataStatus::Success => "success",
            MetadataStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub total_files: i64,
    pub completed_files: i64,
    pub failed_files: i64,
    pub skipped_files: i64,
    pub total_records_loaded: i64,
    pub error_message: Option<String>,
    pub username: String,
    pub trigger_type: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobFileRecord {
    pub id: i64,
    pub job_id: String,
    pub filename: String,
    pub table_name: String,
    pub status: String,
    pub processed: i64,
    pub loaded: i64,
    pub inserted: i64,
    pub updated: i64,
    pub skipped: i64,
    pub issues: i64,
    pub error: Option<String>,
    pub elapsed_sec: f64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub file_name: String,
    pub table_name: String,
    pub file_date: String,
    pub records_processed: i64,
    pub records_inserted: i64,
    pub records_updated: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub file_hash: String,
    pub trigger_type: String,
    pub triggered_by: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SchemaErrorRecord {
    pub id: i64,
    pub table_name: String,
    pub file: String,
    pub kind: String,
    pub details: String,
    pub remediation_ddl: Option<String>,
    pub severity: String,
    pub detected_at: String,
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DataQualityRecord {
    pub id: i64,
    pub table_name: String,
    pub file: String,
    pub kind: String,
    pub description: String,
    pub detected_at: String,
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
