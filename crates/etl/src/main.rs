//! ETL Orchestrator launcher: `Init -> Start -> Shutdown` (§6), exercised
//! through a one-shot CLI rather than a resident daemon, since the HTTP/UI
//! layer the core is designed to sit behind is out of scope here.

mod cli;
mod config_loader;
mod schema;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use etl_config::{CoreConfig, DbConfig, SftpAuth};
use etl_db::DbConnection;
use etl_metadata::{JobTrigger, MetadataStore};
use etl_orchestrator::{JobOptions, Orchestrator};
use etl_security::{FieldsToHash, PhiHasher};
use etl_sftp::SftpPuller;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, warn};

use cli::{Cli, Commands};

const SHUTDOWN_GRACE_SECS: u64 = 10;

async fn connect_warehouse(db: &DbConfig) -> Result<DbConnection> {
    match db {
        DbConfig::Sqlite { path } => {
            let url = format!("sqlite://{}?mode=rwc", path.display());
            let pool = SqlitePoolOptions::new()
                .max_connections(DbConfig::max_connections_default())
                .connect(&url)
                .await
                .context("failed to open sqlite warehouse")?;
            Ok(DbConnection::Sqlite(pool))
        }
        DbConfig::Postgres { host, port, database, user, password } => {
            let url = format!("postgres://{user}:{password}@{host}:{port}/{database}");
            let pool = PgPoolOptions::new()
                .max_connections(DbConfig::max_connections_default())
                .connect(&url)
                .await
                .context("failed to open postgres warehouse")?;
            Ok(DbConnection::Postgres(pool))
        }
        DbConfig::MySql { host, port, database, user, password } => {
            let url = format!("mysql://{user}:{password}@{host}:{port}/{database}");
            let pool = MySqlPoolOptions::new()
                .max_connections(DbConfig::max_connections_default())
                .connect(&url)
                .await
                .context("failed to open mysql warehouse")?;
            Ok(DbConnection::MySql(pool))
        }
        DbConfig::Mssql { server, port, database, trusted, user, password } => {
            let params = etl_db::mssql::MssqlParams {
                server: server.clone(),
                port: *port,
                database: database.clone(),
                trusted_connection: *trusted,
                user: user.clone(),
                password: password.clone(),
            };
            let handle = etl_db::mssql::MssqlHandle::connect(params, DbConfig::max_connections_default() as usize)
                .await
                .context("failed to open mssql warehouse")?;
            Ok(DbConnection::Mssql(handle))
        }
    }
}

/// `Init(config)` (§6): validate, connect, recover. Returns the assembled
/// `Orchestrator` ready for `Start()`.
async fn init(config: &CoreConfig) -> Result<Arc<Orchestrator>> {
    config.validate().context("config failed validation")?;

    let conn = connect_warehouse(&config.db).await?;

    let metadata_path = config.directories.database.to_string_lossy().into_owned();
    let metadata = MetadataStore::connect(&metadata_path).await.context("failed to open metadata store")?;
    metadata.recover_on_startup().await.context("startup recovery failed")?;

    let catalog = schema::default_catalog();

    let hasher = if config.security.hashing_enabled() {
        let salt = config.security.validated_salt().context("invalid phi hash salt")?;
        Some((PhiHasher::new(salt), FieldsToHash::new(config.security.fields_to_hash.clone())))
    } else {
        None
    };

    let sftp = config.sftp.clone().map(|sftp_config| {
        if let SftpAuth::Password { .. } = &sftp_config.auth {
            info!("sftp pull configured with password authentication");
        }
        SftpPuller::new(sftp_config)
    });

    Ok(Orchestrator::new(conn, metadata, catalog, hasher, sftp, config.etl.clone(), config.directories.input.clone()))
}

fn install_shutdown_handler() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));

    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let handler_flag = flag.clone();
        let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
        std::thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!(signal = sig, "received shutdown signal");
                handler_flag.store(true, Ordering::SeqCst);
            }
        });
    }

    #[cfg(windows)]
    {
        let handler_flag = flag.clone();
        ctrlc::set_handler(move || {
            info!("received ctrl-c");
            handler_flag.store(true, Ordering::SeqCst);
        })
        .context("failed to install ctrl-c handler")?;
    }

    Ok(flag)
}

async fn run_start_job(
    orchestrator: Arc<Orchestrator>,
    force_reprocess: bool,
    latest_only: bool,
    workers: usize,
    files: Option<Vec<String>>,
    username: String,
    automatic: bool,
) -> Result<()> {
    let shutdown = install_shutdown_handler()?;

    let opts = JobOptions {
        force_reprocess,
        latest_only,
        max_workers: workers.max(1),
        selected_files: files,
        username,
        trigger: if automatic { JobTrigger::Automatic } else { JobTrigger::Manual },
    };

    let job_id = orchestrator.start_job(opts);
    println!("started job {job_id}");

    let mut already_cancelled = false;
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;

        if shutdown.load(Ordering::SeqCst) && !already_cancelled {
            info!(job_id = %job_id, "shutdown requested, cancelling job");
            orchestrator.cancel_job(&job_id);
            already_cancelled = true;
        }

        let Some(progress) = orchestrator.get_job(&job_id) else {
            anyhow::bail!("job {job_id} disappeared from the registry before completing");
        };

        if progress.status.is_terminal() {
            println!(
                "job {job_id} finished: status={:?} total={} completed={} failed={} skipped={} records_loaded={}",
                progress.status,
                progress.total_files,
                progress.completed_files,
                progress.failed_files,
                progress.skipped_files,
                progress.total_records_loaded,
            );
            for error in &progress.errors {
                println!("  error: {error}");
            }
            break;
        }
    }

    Ok(())
}

fn print_history(orchestrator: &Orchestrator, limit: usize) {
    let history = orchestrator.get_job_history(limit);
    if history.is_empty() {
        println!("no jobs recorded yet");
        return;
    }
    for job in history {
        println!(
            "{} [{:?}] started_by={} trigger={:?} total={} completed={} failed={} skipped={} records_loaded={}",
            job.job_id,
            job.status,
            job.triggered_by,
            job.trigger,
            job.total_files,
            job.completed_files,
            job.failed_files,
            job.skipped_files,
            job.total_records_loaded,
        );
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config_loader::load(&cli.config)?;
    let orchestrator = init(&config).await?;

    match cli.command {
        Commands::StartJob { force_reprocess, latest_only, workers, files, username, automatic } => {
            run_start_job(orchestrator.clone(), force_reprocess, latest_only, workers, files, username, automatic)
                .await?;
        }
        Commands::History { limit } => {
            print_history(&orchestrator, limit);
        }
    }

    // `Shutdown()` (§6): any job still active at this point was already
    // cancelled by `run_start_job`'s signal handler; give it a grace period
    // to persist its terminal state before the process drops the pools.
    for job in orchestrator.get_active_jobs() {
        orchestrator.cancel_job(&job.job_id);
    }
    tokio::time::sleep(Duration::from_millis(200.min(SHUTDOWN_GRACE_SECS * 1000))).await;

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = etl_logging::LogConfig { app_name: "etl", verbose: cli.verbose, tui_mode: false };
    if let Err(e) = etl_logging::init_logging(log_config) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            warn!(error = %err, "etl command failed");
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
