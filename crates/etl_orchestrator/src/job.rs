//! `JobProgress` and the per-file entries inside it (§3.2, §4.9).

use chrono::{DateTime, Utc};
use etl_metadata::{FileTaskStatus, JobStatus, JobTrigger};
use etl_worker::FileResult;

/// `StartJob(opts)` input (§4.9).
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub force_reprocess: bool,
    pub latest_only: bool,
    pub max_workers: usize,
    pub selected_files: Option<Vec<String>>,
    pub username: String,
    pub trigger: JobTrigger,
}

/// One file's current or terminal state inside a `JobProgress` (§3.2
/// `FileTask`, projected onto the orchestrator's view of a job).
#[derive(Debug, Clone)]
pub struct JobFileEntry {
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

impl JobFileEntry {
    pub fn pending(file_name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            table: table.into(),
            status: FileTaskStatus::Pending,
            processed: 0,
            loaded: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            issues: 0,
            error: None,
            elapsed_sec: 0.0,
        }
    }

    pub fn skipped(file_name: impl Into<String>, table: impl Into<String>) -> Self {
        Self { status: FileTaskStatus::Skipped, ..Self::pending(file_name, table) }
    }

    pub fn from_result(result: &FileResult) -> Self {
        let mut entry = Self::pending(result.file_name.clone(), result.table.clone());
        entry.apply_result(result);
        entry
    }

    pub fn apply_result(&mut self, result: &FileResult) {
        self.status = result.status;
        self.processed = result.processed;
        self.loaded = result.loaded;
        self.inserted = result.inserted;
        self.updated = result.updated;
        self.skipped = result.skipped;
        self.issues = result.issues;
        self.error = result.error.clone();
        self.elapsed_sec = result.elapsed_sec;
    }
}

/// One orchestrator run (§3.2). Owned by the `Orchestrator`; a clone is
/// handed to `GetJob`/`GetActiveJobs`/`GetJobHistory` callers and
/// subscribers so they never see a half-updated value.
#[derive(Debug, Clone)]
pub struct JobProgress {
    pub job_id: String,
    pub status: JobStatus,
    pub total_files: i64,
    pub completed_files: i64,
    pub failed_files: i64,
    pub skipped_files: i64,
    pub total_records_loaded: i64,
    pub trigger: JobTrigger,
    pub triggered_by: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
    pub files: Vec<JobFileEntry>,
}

impl JobProgress {
    pub fn new(job_id: String, opts: &JobOptions, total_files: i64) -> Self {
        Self {
            job_id,
            status: JobStatus::Running,
            total_files,
            completed_files: 0,
            failed_files: 0,
            skipped_files: 0,
            total_records_loaded: 0,
            trigger: opts.trigger,
            triggered_by: opts.username.clone(),
            started_at: Utc::now(),
            ended_at: None,
            errors: Vec::new(),
            files: Vec::new(),
        }
    }

    /// I4: `completion% = (completed+failed+skipped)/total*100`.
    pub fn completion_pct(&self) -> f64 {
        if self.total_files == 0 {
            return 100.0;
        }
        let done = self.completed_files + self.failed_files + self.skipped_files;
        (done as f64 / self.total_files as f64) * 100.0
    }

    pub fn record_skip(&mut self, entry: JobFileEntry) {
        self.skipped_files += 1;
        self.files.push(entry);
    }

    pub fn record_pending(&mut self, entry: JobFileEntry) {
        self.files.push(entry);
    }

    /// Merges one worker's terminal `FileResult` into this job's counters
    /// and the matching `files[]` entry (§5: always done under the
    /// orchestrator's registry lock).
    pub fn record_result(&mut self, result: &FileResult) {
        if let Some(entry) = self.files.iter_mut().find(|f| f.file_name == result.file_name) {
            entry.apply_result(result);
        } else {
            let mut entry = JobFileEntry::pending(result.file_name.clone(), result.table.clone());
            entry.apply_result(result);
            self.files.push(entry);
        }

        match result.status {
            FileTaskStatus::Completed => {
                self.completed_files += 1;
                self.total_records_loaded += result.loaded;
            }
            FileTaskStatus::Failed => self.failed_files += 1,
            FileTaskStatus::Skipped => self.skipped_files += 1,
            FileTaskStatus::Pending | FileTaskStatus::Processing => {}
        }
    }

    /// Final status precedence: `cancelled` > `failed` > `completed` (§4.9
    /// step 4). `failed` here means a top-level infrastructure error, not
    /// an ordinary per-file failure (§7).
    pub fn finalize(&mut self, cancelled: bool) {
        self.status = if cancelled {
            JobStatus::Cancelled
        } else if !self.errors.is_empty() {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.ended_at = Some(Utc::now());
    }
}
