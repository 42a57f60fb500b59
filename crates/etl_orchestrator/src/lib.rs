//! Job Orchestrator (C9, §4.9): accepts jobs, runs a bounded worker pool
//! with mandatory per-table serialization (§5), tracks progress, handles
//! cancellation, and persists results.
//!
//! `Orchestrator` is always used behind an `Arc` (`new` returns one
//! directly) so that `start_job` can hand a clone of itself to the
//! `tokio::spawn`ed run without the caller threading it through.

pub mod cancel;
pub mod error;
pub mod job;
pub mod registry;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use etl_config::EtlConfig;
use etl_db::DbConnection;
use etl_metadata::audit::{AuditAction, AuditCategory, AuditEntry};
use etl_metadata::{now_iso, FileTaskStatus, JobFileRecord, JobRecord, JobStatus, MetadataStore};
use etl_schema::SchemaCatalog;
use etl_security::{FieldsToHash, PhiHasher};
use etl_worker::{discover_files, DiscoveryOptions, DiscoveryStatus, FileResult, FileTask, FileWorker};

pub use cancel::CancellationToken;
pub use job::{JobFileEntry, JobOptions, JobProgress};

use registry::Registry;

/// `JobProgress.files` and `JobProgress` transitions invoke every
/// subscriber synchronously (§4.9); callbacks must be cheap or
/// self-buffering, exactly as the EventSink contract requires (§6).
pub type Subscriber = Arc<dyn Fn(&JobEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub enum JobEvent {
    Progress(JobProgress),
    TaskUpdate { job_id: String, entry: JobFileEntry },
}

const DEFAULT_HISTORY_LIMIT: usize = 100;

pub struct Orchestrator {
    conn: Arc<DbConnection>,
    metadata: Arc<MetadataStore>,
    catalog: Arc<SchemaCatalog>,
    hasher: Arc<Option<(PhiHasher, FieldsToHash)>>,
    sftp: Option<Arc<etl_sftp::SftpPuller>>,
    etl: EtlConfig,
    input_directory: PathBuf,
    registry: RwLock<Registry>,
    subscribers: RwLock<Vec<(u64, Subscriber)>>,
    next_subscriber_id: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        conn: DbConnection,
        metadata: MetadataStore,
        catalog: SchemaCatalog,
        hasher: Option<(PhiHasher, FieldsToHash)>,
        sftp: Option<etl_sftp::SftpPuller>,
        etl: EtlConfig,
        input_directory: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            conn: Arc::new(conn),
            metadata: Arc::new(metadata),
            catalog: Arc::new(catalog),
            hasher: Arc::new(hasher),
            sftp: sftp.map(Arc::new),
            etl,
            input_directory,
            registry: RwLock::new(Registry::new(DEFAULT_HISTORY_LIMIT)),
            subscribers: RwLock::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(0),
        })
    }

    /// `StartJob(opts) -> job_id` (§4.9). Generates a microsecond-resolution
    /// `job_id`, registers the job as running, and launches its execution
    /// in the background. Returns immediately.
    pub fn start_job(self: &Arc<Self>, opts: JobOptions) -> String {
        let job_id = etl_metadata::new_job_id();
        let cancel = CancellationToken::new();
        let progress = JobProgress::new(job_id.clone(), &opts, 0);
        self.registry.write().unwrap().insert_active(progress, cancel);

        let orchestrator = Arc::clone(self);
        let run_job_id = job_id.clone();
        tokio::spawn(async move {
            orchestrator.run_job(run_job_id, opts).await;
        });

        job_id
    }

    /// `CancelJob(job_id) -> bool`.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        self.registry.read().unwrap().cancel(job_id)
    }

    pub fn get_active_jobs(&self) -> Vec<JobProgress> {
        self.registry.read().unwrap().active_jobs()
    }

    pub fn get_job(&self, job_id: &str) -> Option<JobProgress> {
        self.registry.read().unwrap().get(job_id)
    }

    pub fn get_job_history(&self, limit: usize) -> Vec<JobProgress> {
        self.registry.read().unwrap().history(limit)
    }

    /// Returns a subscription id to pass back to `unsubscribe`.
    pub fn subscribe(&self, cb: Subscriber) -> u64 {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().unwrap().push((id, cb));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.write().unwrap().retain(|(sid, _)| *sid != id);
    }

    async fn run_job(self: Arc<Self>, job_id: String, opts: JobOptions) {
        let insert = JobRecord {
            job_id: job_id.clone(),
            status: "running".to_string(),
            start_time: now_iso(),
            end_time: None,
            total_files: 0,
            completed_files: 0,
            failed_files: 0,
            skipped_files: 0,
            total_records_loaded: 0,
            error_message: None,
            username: opts.username.clone(),
            trigger_type: opts.trigger.as_str().to_string(),
            created_at: now_iso(),
        };
        if let Err(e) = self.metadata.insert_job(&insert).await {
            tracing::error!(job_id = %job_id, error = %e, "metadata store unavailable, aborting job");
            self.abort_with_infra_error(&job_id, format!("metadata store unavailable: {e}")).await;
            return;
        }
        let audit = AuditEntry::new(opts.username.clone(), AuditAction::EtlJobStarted, AuditCategory::Etl)
            .on_resource(job_id.clone());
        if let Err(e) = self.metadata.log_audit(&audit).await {
            tracing::warn!(job_id = %job_id, error = %e, "failed to write audit entry for job start");
        }

        // Step 1: SFTP pre-discovery, synchronous, never fails the job (§4.9).
        if let Some(puller) = self.sftp.clone() {
            let directory = self.input_directory.clone();
            match tokio::task::spawn_blocking(move || puller.pull(&directory)).await {
                Ok(Ok(result)) => {
                    tracing::info!(job_id = %job_id, ok = result.ok, failed = result.failed, total = result.total, "sftp pre-discovery pull complete");
                }
                Ok(Err(e)) => tracing::warn!(job_id = %job_id, error = %e, "sftp pre-discovery pull failed, continuing with local directory"),
                Err(e) => tracing::warn!(job_id = %job_id, error = %e, "sftp pre-discovery task panicked"),
            }
        }

        // Step 2: discovery.
        let discovery_opts = DiscoveryOptions {
            force_reprocess: opts.force_reprocess,
            selected_files: opts.selected_files.as_deref(),
            latest_only: opts.latest_only,
            file_patterns: &self.etl.file_patterns,
            ignored_prefixes: &self.etl.ignored_filename_prefixes,
            mappings: &[],
        };
        let tasks = match discover_files(&self.input_directory, &self.metadata, &discovery_opts).await {
            Ok(tasks) => tasks,
            Err(e) => {
                self.abort_with_infra_error(&job_id, format!("file discovery failed: {e}")).await;
                return;
            }
        };

        let (pending, skipped): (Vec<FileTask>, Vec<FileTask>) =
            tasks.into_iter().partition(|t| t.status == DiscoveryStatus::Pending);

        {
            let mut registry = self.registry.write().unwrap();
            registry.mutate(&job_id, |progress| {
                progress.total_files = (pending.len() + skipped.len()) as i64;
                for task in &skipped {
                    progress.record_skip(JobFileEntry::skipped(task.file_name.clone(), task.table.clone()));
                }
                for task in &pending {
                    progress.record_pending(JobFileEntry::pending(task.file_name.clone(), task.table.clone()));
                }
            });
        }
        self.notify_progress(&job_id);

        // Scenario 3: a file already processed (same name, same content
        // hash) never mutates the warehouse or rewrites its metadata row
        // (I1), but it still gets an audit event recording the skip.
        for task in &skipped {
            let audit = AuditEntry::new(opts.username.clone(), AuditAction::FileSkipped, AuditCategory::Etl)
                .on_resource(task.file_name.clone())
                .with_details("File already processed");
            if let Err(e) = self.metadata.log_audit(&audit).await {
                tracing::warn!(job_id = %job_id, file = %task.file_name, error = %e, "failed to write audit entry for skipped file");
            }
        }

        // Step 3: dispatch to the bounded, per-table-serialized worker pool.
        self.dispatch(&job_id, pending, opts.max_workers.max(1), &opts.username, opts.trigger.as_str()).await;

        // Step 4/5: finalize, persist, retire.
        self.finish_job(&job_id).await;
    }

    async fn dispatch(
        self: &Arc<Self>,
        job_id: &str,
        tasks: Vec<FileTask>,
        max_workers: usize,
        username: &str,
        trigger_type: &'static str,
    ) {
        let cancel = match self.registry.read().unwrap().cancellation_token(job_id) {
            Some(c) => c,
            None => return,
        };

        // §5: tasks for the same table are serialized by running them
        // sequentially within one chain; different tables' chains proceed
        // concurrently, with a semaphore bounding the total in-flight work
        // to `max_workers` regardless of how many tables are involved.
        let mut by_table: HashMap<String, Vec<FileTask>> = HashMap::new();
        for task in tasks {
            by_table.entry(task.table.clone()).or_default().push(task);
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(max_workers));
        let mut join_set = tokio::task::JoinSet::new();

        for (_table, table_tasks) in by_table {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let conn = Arc::clone(&self.conn);
            let metadata = Arc::clone(&self.metadata);
            let catalog = Arc::clone(&self.catalog);
            let hasher = Arc::clone(&self.hasher);
            let username = username.to_string();
            let orchestrator = Arc::clone(self);
            let job_id = job_id.to_string();

            join_set.spawn(async move {
                for task in table_tasks {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                    let hasher_ref = hasher.as_ref().as_ref().map(|(h, f)| (h, f));
                    let worker = FileWorker {
                        conn: &conn,
                        metadata: &metadata,
                        catalog: &catalog,
                        hasher: hasher_ref,
                        username: username.clone(),
                        trigger_type,
                    };
                    let result = worker.process(task).await;
                    drop(permit);
                    orchestrator.apply_result(&job_id, &username, result).await;
                }
            });
        }

        while join_set.join_next().await.is_some() {}
    }

    /// Merges one worker's terminal result into the job's progress under
    /// the registry lock, notifies subscribers (§4.9, §5 ordering guarantee),
    /// and writes the matching `EmitAudit` entry (§6, §11 audit taxonomy).
    async fn apply_result(&self, job_id: &str, username: &str, result: FileResult) {
        let entry = JobFileEntry::from_result(&result);
        let snapshot = {
            let mut registry = self.registry.write().unwrap();
            registry.mutate(job_id, |progress| {
                progress.record_result(&result);
                progress.clone()
            })
        };
        if let Some(progress) = snapshot {
            self.notify(&JobEvent::TaskUpdate { job_id: job_id.to_string(), entry });
            self.notify(&JobEvent::Progress(progress));
        }

        let action = match result.status {
            FileTaskStatus::Completed => Some(AuditAction::FileProcessed),
            FileTaskStatus::Skipped => Some(AuditAction::FileSkipped),
            FileTaskStatus::Failed => Some(AuditAction::FileFailed),
            FileTaskStatus::Pending | FileTaskStatus::Processing => None,
        };
        if let Some(action) = action {
            let mut audit = AuditEntry::new(username.to_string(), action, AuditCategory::Etl)
                .on_resource(result.file_name.clone())
                .with_record_count(result.loaded);
            if let Some(error) = &result.error {
                audit = audit.failed(error.clone());
            }
            if let Err(e) = self.metadata.log_audit(&audit).await {
                tracing::warn!(job_id = %job_id, file = %result.file_name, error = %e, "failed to write file audit entry");
            }
        }
    }

    fn notify_progress(&self, job_id: &str) {
        if let Some(progress) = self.registry.read().unwrap().get(job_id) {
            self.notify(&JobEvent::Progress(progress));
        }
    }

    fn notify(&self, event: &JobEvent) {
        let subscribers = self.subscribers.read().unwrap();
        for (_, cb) in subscribers.iter() {
            cb(event);
        }
    }

    async fn abort_with_infra_error(&self, job_id: &str, message: String) {
        {
            let mut registry = self.registry.write().unwrap();
            registry.mutate(job_id, |progress| progress.errors.push(message));
        }
        self.finish_job(job_id).await;
    }

    /// §4.9 steps 4-5: determine final status, persist `etl_jobs` and
    /// `etl_job_files`, remove from the active set, keep in history.
    async fn finish_job(&self, job_id: &str) {
        let cancelled =
            self.registry.read().unwrap().cancellation_token(job_id).map(|c| c.is_cancelled()).unwrap_or(false);

        let finished = {
            let mut registry = self.registry.write().unwrap();
            registry.mutate(job_id, |progress| progress.finalize(cancelled));
            registry.retire(job_id)
        };

        let Some(progress) = finished else { return };

        let update = JobRecord {
            job_id: progress.job_id.clone(),
            status: progress.status.as_str().to_string(),
            start_time: progress.started_at.to_rfc3339(),
            end_time: progress.ended_at.map(|t| t.to_rfc3339()),
            total_files: progress.total_files,
            completed_files: progress.completed_files,
            failed_files: progress.failed_files,
            skipped_files: progress.skipped_files,
            total_records_loaded: progress.total_records_loaded,
            error_message: progress.errors.first().cloned(),
            username: progress.triggered_by.clone(),
            trigger_type: progress.trigger.as_str().to_string(),
            created_at: progress.started_at.to_rfc3339(),
        };
        if let Err(e) = self.metadata.finish_job(&update).await {
            tracing::error!(job_id = %progress.job_id, error = %e, "failed to persist job completion");
        }

        let action = match progress.status {
            JobStatus::Completed => AuditAction::EtlJobCompleted,
            JobStatus::Cancelled => AuditAction::EtlJobCancelled,
            _ => AuditAction::EtlJobFailed,
        };
        let mut audit = AuditEntry::new(progress.triggered_by.clone(), action, AuditCategory::Etl)
            .on_resource(progress.job_id.clone())
            .with_record_count(progress.total_records_loaded);
        if let Some(message) = progress.errors.first() {
            audit = audit.failed(message.clone());
        }
        if let Err(e) = self.metadata.log_audit(&audit).await {
            tracing::warn!(job_id = %progress.job_id, error = %e, "failed to record job completion audit entry");
        }

        for file in &progress.files {
            let record = JobFileRecord {
                id: 0,
                job_id: progress.job_id.clone(),
                filename: file.file_name.clone(),
                table_name: file.table.clone(),
                status: file.status.as_str().to_string(),
                processed: file.processed,
                loaded: file.loaded,
                inserted: file.inserted,
                updated: file.updated,
                skipped: file.skipped,
                issues: file.issues,
                error: file.error.clone(),
                elapsed_sec: file.elapsed_sec,
            };
            if let Err(e) = self.metadata.insert_job_file(&record).await {
                tracing::warn!(job_id = %progress.job_id, file = %file.file_name, error = %e, "failed to persist job file");
            }
        }

        self.notify(&JobEvent::Progress(progress));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl_config::EtlConfig;
    use etl_metadata::JobTrigger;
    use etl_schema::{CanonicalType, ColumnSpec, TableSpec};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

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

    async fn orchestrator(dir: &std::path::Path) -> Arc<Orchestrator> {
        let conn = sqlite_with_people_table().await;
        let metadata = MetadataStore::connect_in_memory().await.unwrap();
        let catalog = people_catalog();
        let mut etl = EtlConfig::default();
        etl.ignored_filename_prefixes = vec![];
        Orchestrator::new(conn, metadata, catalog, None, None, etl, dir.to_path_buf())
    }

    fn write_file(dir: &std::path::Path, name: &str, contents: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn start_job_processes_discovered_files_and_persists_completion() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "people_20250101.txt", "person_id|first_name|last_name\np1|John|Doe\n");
        let orchestrator = orchestrator(dir.path()).await;

        let job_id = orchestrator.start_job(JobOptions {
            force_reprocess: false,
            latest_only: false,
            max_workers: 2,
            selected_files: None,
            username: "svc".to_string(),
            trigger: JobTrigger::Manual,
        });

        let mut progress = None;
        for _ in 0..200 {
            if let Some(p) = orchestrator.get_job(&job_id) {
                if p.status != etl_metadata::JobStatus::Running {
                    progress = Some(p);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let progress = progress.expect("job did not finish in time");
        assert_eq!(progress.status, etl_metadata::JobStatus::Completed);
        assert_eq!(progress.completed_files, 1);
        assert_eq!(progress.total_records_loaded, 1);
        assert!(orchestrator.get_active_jobs().is_empty());
        assert_eq!(orchestrator.get_job_history(10).len(), 1);
    }

    #[tokio::test]
    async fn cancel_job_stops_dispatching_new_tasks() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write_file(
                dir.path(),
                &format!("people_2025010{i}.txt"),
                &format!("person_id|first_name|last_name\np{i}|John|Doe\n"),
            );
        }
        let orchestrator = orchestrator(dir.path()).await;

        let job_id = orchestrator.start_job(JobOptions {
            force_reprocess: false,
            latest_only: false,
            max_workers: 1,
            selected_files: None,
            username: "svc".to_string(),
            trigger: JobTrigger::Manual,
        });

        assert!(orchestrator.cancel_job(&job_id));
        assert!(!orchestrator.cancel_job("does-not-exist"));

        let mut progress = None;
        for _ in 0..200 {
            if let Some(p) = orchestrator.get_job(&job_id) {
                if p.status != etl_metadata::JobStatus::Running {
                    progress = Some(p);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let progress = progress.expect("job did not finish in time");
        assert_eq!(progress.status, etl_metadata::JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn subscribers_receive_progress_events() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "people_20250101.txt", "person_id|first_name|last_name\np1|John|Doe\n");
        let orchestrator = orchestrator(dir.path()).await;

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        orchestrator.subscribe(Arc::new(move |_event: &JobEvent| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let job_id = orchestrator.start_job(JobOptions {
            force_reprocess: false,
            latest_only: false,
            max_workers: 1,
            selected_files: None,
            username: "svc".to_string(),
            trigger: JobTrigger::Manual,
        });

        for _ in 0..200 {
            if let Some(p) = orchestrator.get_job(&job_id) {
                if p.status != etl_metadata::JobStatus::Running {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(count.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn rerunning_an_unchanged_file_skips_it_and_logs_an_audit_entry() {
        // Scenario 3: skip unchanged file.
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "people_20250101.txt", "person_id|first_name|last_name\np1|John|Doe\n");
        let orchestrator = orchestrator(dir.path()).await;

        async fn run_to_completion(orchestrator: &Arc<Orchestrator>) -> JobProgress {
            let job_id = orchestrator.start_job(JobOptions {
                force_reprocess: false,
                latest_only: false,
                max_workers: 1,
                selected_files: None,
                username: "svc".to_string(),
                trigger: JobTrigger::Manual,
            });
            for _ in 0..200 {
                if let Some(p) = orchestrator.get_job(&job_id) {
                    if p.status != etl_metadata::JobStatus::Running {
                        return p;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("job did not finish in time");
        }

        let first = run_to_completion(&orchestrator).await;
        assert_eq!(first.completed_files, 1);
        assert_eq!(first.skipped_files, 0);

        let audit_before = orchestrator.metadata.audit_count().await.unwrap();
        let second = run_to_completion(&orchestrator).await;
        let audit_after = orchestrator.metadata.audit_count().await.unwrap();

        assert_eq!(second.completed_files, 0);
        assert_eq!(second.skipped_files, 1);
        // job-started + file-skipped + job-completed.
        assert_eq!(audit_after - audit_before, 3);
    }
}
