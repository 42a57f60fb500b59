//! CLI surface (§6 process lifecycle exercised by hand, in lieu of the
//! out-of-scope HTTP/UI layer the core is designed to sit behind).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "etl", about = "ETL Orchestrator: Init -> Start -> Shutdown lifecycle, job control")]
pub struct Cli {
    /// Path to the TOML config file (maps onto `CoreConfig`).
    #[arg(short, long, global = true, default_value = "etl.toml")]
    pub config: PathBuf,

    /// Enable verbose (debug-level) console logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Init + Start, run one job to completion (or until Ctrl-C cancels it), then Shutdown.
    StartJob {
        #[arg(long)]
        force_reprocess: bool,
        #[arg(long)]
        latest_only: bool,
        #[arg(long, default_value_t = 4)]
        workers: usize,
        #[arg(long, value_delimiter = ',')]
        files: Option<Vec<String>>,
        #[arg(long, default_value = "cli")]
        username: String,
        #[arg(long)]
        automatic: bool,
    },
    /// Init only, print the most recent job history.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}
