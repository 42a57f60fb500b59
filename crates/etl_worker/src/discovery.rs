//! File Discovery (C7, §4.7): directory scan, table-name and date
//! inference, content hashing, and the skip decision.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use md5::{Digest, Md5};

use etl_metadata::MetadataStore;

/// `FileTask.status` as produced by discovery; the orchestrator and worker
/// advance it further through `processing`/`completed`/`failed` (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStatus {
    Pending,
    Skipped,
}

/// One discovered file, not yet claimed by a worker (§3.2 `FileTask`).
#[derive(Debug, Clone)]
pub struct FileTask {
    pub path: PathBuf,
    pub file_name: String,
    pub table: String,
    pub file_date: String,
    pub content_hash: String,
    pub status: DiscoveryStatus,
}

/// A file → table mapping consulted before falling back to filename
/// parsing (§4.7): exact filename first, then glob.
pub struct FileTableMapping {
    pub file_pattern: String,
    pub table_name: String,
}

pub struct DiscoveryOptions<'a> {
    pub force_reprocess: bool,
    pub selected_files: Option<&'a [String]>,
    pub latest_only: bool,
    pub file_patterns: &'a [String],
    pub ignored_prefixes: &'a [String],
    pub mappings: &'a [FileTableMapping],
}

/// Scan `directory` for candidate files and build `FileTask`s (§4.7).
pub async fn discover_files(
    directory: &Path,
    store: &MetadataStore,
    opts: &DiscoveryOptions<'_>,
) -> std::io::Result<Vec<FileTask>> {
    if !directory.exists() {
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    for pattern in opts.file_patterns {
        let full_pattern = directory.join(pattern);
        let glob_pattern = full_pattern.to_string_lossy().to_string();
        if let Ok(paths) = glob::glob(&glob_pattern) {
            for entry in paths.flatten() {
                if entry.is_file() {
                    candidates.push(entry);
                }
            }
        }
    }
    candidates.sort();
    candidates.dedup();

    if let Some(selected) = opts.selected_files {
        let selected: std::collections::HashSet<&str> = selected.iter().map(|s| s.as_str()).collect();
        candidates.retain(|p| p.file_name().and_then(|n| n.to_str()).map(|n| selected.contains(n)).unwrap_or(false));
    }

    let mut tasks = Vec::with_capacity(candidates.len());
    for path in candidates {
        let file_name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
        let table = resolve_table_name(&file_name, opts.ignored_prefixes, opts.mappings);
        let file_date = resolve_file_date(&path, &file_name);
        let content_hash = hash_file(&path)?;

        let status = if opts.force_reprocess {
            DiscoveryStatus::Pending
        } else if store.is_processed(&file_name, &content_hash).await.unwrap_or(false) {
            DiscoveryStatus::Skipped
        } else {
            DiscoveryStatus::Pending
        };

        tasks.push(FileTask { path, file_name, table, file_date, content_hash, status });
    }

    if opts.latest_only {
        tasks = keep_latest_per_table(tasks);
    }

    Ok(tasks)
}

/// Exact filename match first, then glob, then filename parsing; `unknown_table`
/// if neither resolves (§4.7).
fn resolve_table_name(file_name: &str, ignored_prefixes: &[String], mappings: &[FileTableMapping]) -> String {
    if let Some(m) = mappings.iter().find(|m| m.file_pattern == file_name) {
        return m.table_name.clone();
    }
    for m in mappings {
        if glob::Pattern::new(&m.file_pattern).map(|p| p.matches(file_name)).unwrap_or(false) {
            return m.table_name.clone();
        }
    }

    let ignored: Vec<String> = ignored_prefixes.iter().map(|p| p.to_ascii_uppercase()).collect();
    let stem = strip_extension(file_name);
    let mut parts = Vec::new();
    for part in stem.split('_') {
        if ignored.contains(&part.to_ascii_uppercase()) {
            continue;
        }
        if part.len() == 8 && part.chars().all(|c| c.is_ascii_digit()) {
            break;
        }
        parts.push(part);
    }

    if parts.is_empty() {
        "unknown_table".to_string()
    } else {
        parts.join("_")
    }
}

fn strip_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) => &file_name[..idx],
        None => file_name,
    }
}

/// First valid `YYYYMMDD` token in the filename, else the file's modified
/// time (§4.7; §9 design note: same-day collisions across undateable files
/// are harmless since dedup is by content hash, not by date).
fn resolve_file_date(path: &Path, file_name: &str) -> String {
    for part in file_name.split('_') {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.len() == 8 && digits == *part.split('.').next().unwrap_or(part) {
            if NaiveDate::parse_from_str(&digits, "%Y%m%d").is_ok() {
                return digits;
            }
        }
    }

    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| {
            let datetime: chrono::DateTime<chrono::Utc> = t.into();
            datetime.format("%Y%m%d").to_string()
        })
        .unwrap_or_else(|_| chrono::Utc::now().format("%Y%m%d").to_string())
}

/// Streaming MD5 over 4 KiB chunks (§4.7).
fn hash_file(path: &Path) -> std::io::Result<String> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Option `latest_only`: per target table, keep only the lexicographically
/// greatest `file_date` (§4.7).
fn keep_latest_per_table(tasks: Vec<FileTask>) -> Vec<FileTask> {
    let mut latest: HashMap<String, FileTask> = HashMap::new();
    for task in tasks {
        match latest.get(&task.table) {
            Some(existing) if existing.file_date >= task.file_date => {}
            _ => {
                latest.insert(task.table.clone(), task);
            }
        }
    }
    let mut out: Vec<FileTask> = latest.into_values().collect();
    out.sort_by(|a, b| a.table.cmp(&b.table));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_table_name_skipping_ignored_prefixes_and_date() {
        let ignored = vec!["SAMPLE".to_string(), "TEST".to_string(), "CHHSCA".to_string()];
        let table = resolve_table_name("SAMPLE_chhsca_people_20250828.txt", &ignored, &[]);
        assert_eq!(table, "people");
    }

    #[test]
    fn resolves_table_name_without_prefix() {
        let ignored = vec!["SAMPLE".to_string()];
        assert_eq!(resolve_table_name("people_20250828.txt", &ignored, &[]), "people");
        assert_eq!(resolve_table_name("people.txt", &ignored, &[]), "people");
    }

    #[test]
    fn falls_back_to_unknown_table_when_nothing_survives() {
        let ignored = vec!["SAMPLE".to_string()];
        assert_eq!(resolve_table_name("SAMPLE_20250828.txt", &ignored, &[]), "unknown_table");
    }

    #[test]
    fn exact_filename_mapping_wins_over_parsing() {
        let mappings = vec![FileTableMapping { file_pattern: "odd_name.txt".to_string(), table_name: "referrals".to_string() }];
        assert_eq!(resolve_table_name("odd_name.txt", &[], &mappings), "referrals");
    }

    #[test]
    fn glob_mapping_matches_when_exact_misses() {
        let mappings = vec![FileTableMapping { file_pattern: "*cases*".to_string(), table_name: "cases".to_string() }];
        assert_eq!(resolve_table_name("weekly_cases_20250101.txt", &[], &mappings), "cases");
    }

    #[test]
    fn date_token_must_be_a_valid_calendar_date() {
        let name = "people_20259999.txt"; // invalid month/day
        let ignored = vec![];
        let _ = resolve_table_name(name, &ignored, &[]);
        // 99th month/day is not a real date; resolve_file_date should fall back
        // to mtime rather than accepting the malformed token. We can't easily
        // assert mtime here without a real file, so just check it doesn't panic
        // and returns 8 digits.
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let date = resolve_file_date(tmp.path(), name);
        assert_eq!(date.len(), 8);
        assert_ne!(date, "20259999");
    }

    #[test]
    fn latest_only_keeps_greatest_date_per_table() {
        let mk = |table: &str, date: &str| FileTask {
            path: PathBuf::from(format!("{table}_{date}.txt")),
            file_name: format!("{table}_{date}.txt"),
            table: table.to_string(),
            file_date: date.to_string(),
            content_hash: "h".to_string(),
            status: DiscoveryStatus::Pending,
        };
        let tasks = vec![mk("people", "20250101"), mk("people", "20250828"), mk("cases", "20250301")];
        let kept = keep_latest_per_table(tasks);
        assert_eq!(kept.len(), 2);
        let people = kept.iter().find(|t| t.table == "people").unwrap();
        assert_eq!(people.file_date, "20250828");
    }
}
