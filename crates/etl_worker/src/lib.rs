//! File Discovery (C7), the Row Cleaner (C6), and the File Worker (C8):
//! everything needed to turn one directory of delimited files into
//! warehouse rows and a metadata trail.

pub mod cleaner;
pub mod discovery;
pub mod error;
pub mod file;
pub mod table;

pub use cleaner::{clean, CleaningIssue};
pub use discovery::{discover_files, DiscoveryOptions, DiscoveryStatus, FileTableMapping, FileTask};
pub use error::{Result, WorkerError};
pub use file::{FileResult, FileWorker};
pub use table::{read_delimited_file, RawTable};
