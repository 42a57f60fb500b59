//! Unified audit trail (`sys_audit_trail`), scoped to the events the core
//! itself raises. Account/session/role audit categories belong to the
//! out-of-scope HTTP surface and are not modeled here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Etl,
    DataImport,
    System,
    Security,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Etl => "etl",
            AuditCategory::DataImport => "data_import",
            AuditCategory::System => "system",
            AuditCategory::Security => "security",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    EtlJobStarted,
    EtlJobCompleted,
    EtlJobFailed,
    EtlJobCancelled,
    FileProcessed,
    FileSkipped,
    FileDownloaded,
    FileFailed,
    SchemaDriftDetected,
    SystemStarted,
    SystemStopped,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::EtlJobStarted => "etl_job_started",
            AuditAction::EtlJobCompleted => "etl_job_completed",
            AuditAction::EtlJobFailed => "etl_job_failed",
            AuditAction::EtlJobCancelled => "etl_job_cancelled",
            AuditAction::FileProcessed => "file_processed",
            AuditAction::FileSkipped => "file_skipped",
            AuditAction::FileDownloaded => "file_downloaded",
            AuditAction::FileFailed => "file_failed",
            AuditAction::SchemaDriftDetected => "schema_drift_detected",
            AuditAction::SystemStarted => "system_started",
            AuditAction::SystemStopped => "system_stopped",
        }
    }
}

/// One `EmitAudit` entry (§6); constructed by callers and persisted verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub username: String,
    pub action: AuditAction,
    pub category: AuditCategory,
    pub success: bool,
    pub details: Option<String>,
    pub target_resource: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub record_count: Option<i64>,
    pub file_size: Option<i64>,
}

impl AuditEntry {
    pub fn new(username: impl Into<String>, action: AuditAction, category: AuditCategory) -> Self {
        Self {
            username: username.into(),
            action,
            category,
            success: true,
            details: None,
            target_resource: None,
            error_message: None,
            duration_ms: None,
            record_count: None,
            file_size: None,
        }
    }

    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error_message.into());
        self
    }

    pub fn on_resource(mut self, target_resource: impl Into<String>) -> Self {
        self.target_resource = Some(target_resource.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_record_count(mut self, n: i64) -> Self {
        self.record_count = Some(n);
        self
    }
}
