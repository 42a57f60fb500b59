//! Metadata Store (C4): durable job history, file fingerprints, schema-drift
//! and data-quality logs, and the unified audit trail. Always SQLite,
//! co-located with the process, independent of the warehouse dialect.

pub mod audit;
pub mod error;
pub mod models;
pub mod store;

pub use audit::{AuditAction, AuditCategory, AuditEntry};
pub use error::{MetadataError, Result};
pub use models::{
    now_iso, now_utc, DataQualityRecord, FileTaskStatus, JobFileRecord, JobRecord, JobStatus, JobTrigger,
    MetadataRecord, MetadataStatus, SchemaErrorRecord,
};
pub use store::{new_job_id, MetadataStore};
