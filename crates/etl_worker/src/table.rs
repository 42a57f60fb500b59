//! Column-oriented table of strings, the shared currency between the
//! delimited-file reader, the Row Cleaner (C6), and the Repository (C3):
//! "keep the wire representation as strings ... let the Repository bind as
//! strings and rely on dialect implicit conversions" (§9).

use std::path::Path;

use crate::error::{Result, WorkerError};

/// Null markers recognized on read (§6): empty, `NULL`, `null`, `None`.
fn is_null_marker(raw: &str) -> bool {
    matches!(raw, "" | "NULL" | "null" | "None")
}

/// A file's rows, read as `|`-delimited/`"`-quoted text with a header row.
/// Every cell is `None` for a null marker, `Some(text)` otherwise.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

const CANDIDATE_ENCODINGS: &[&str] = &["utf-8", "latin-1", "cp1252"];

/// Worker step 2 (§4.8): try `utf-8, latin-1, cp1252` in order; the first
/// encoding whose bytes decode cleanly wins.
pub fn read_delimited_file(path: &Path) -> Result<RawTable> {
    let bytes = std::fs::read(path).map_err(|source| WorkerError::FileRead {
        path: path.display().to_string(),
        source,
    })?;

    for encoding in CANDIDATE_ENCODINGS {
        if let Some(text) = decode(&bytes, encoding) {
            return parse_table(path, &text);
        }
    }

    Err(WorkerError::Undecodable { path: path.display().to_string() })
}

/// `utf-8` is decoded strictly; `latin-1`/`cp1252` are single-byte codepages
/// that never fail to decode, so they are the terminal fallback (matching
/// the source's `encodings[-1]` behavior of always returning on the last one).
fn decode(bytes: &[u8], encoding: &str) -> Option<String> {
    match encoding {
        "utf-8" => std::str::from_utf8(bytes).ok().map(|s| s.to_string()),
        "latin-1" | "cp1252" => Some(bytes.iter().map(|&b| b as char).collect()),
        _ => None,
    }
}

fn parse_table(path: &Path, text: &str) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .quote(b'"')
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|source| WorkerError::Malformed { path: path.display().to_string(), source })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| WorkerError::Malformed { path: path.display().to_string(), source })?;
        let row: Vec<Option<String>> = record
            .iter()
            .map(|cell| if is_null_marker(cell) { None } else { Some(cell.to_string()) })
            .collect();
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parses_pipe_delimited_quoted_header() {
        // Scenario 1: happy path upsert input shape.
        let f = write_file("person_id|first_name|last_name\np1|John|Doe\np2|Jane|Smith\n");
        let table = read_delimited_file(f.path()).unwrap();
        assert_eq!(table.headers, vec!["person_id", "first_name", "last_name"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0][1], Some("John".to_string()));
    }

    #[test]
    fn recognizes_null_markers() {
        let f = write_file("person_id|first_name\np1|NULL\np2|null\np3|None\np4|\n");
        let table = read_delimited_file(f.path()).unwrap();
        assert!(table.rows.iter().all(|r| r[1].is_none()));
    }

    #[test]
    fn empty_file_parses_to_zero_rows() {
        let f = write_file("person_id|first_name\n");
        let table = read_delimited_file(f.path()).unwrap();
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn latin1_bytes_decode_via_fallback() {
        // 0xE9 is 'é' in Latin-1 but not valid standalone UTF-8.
        let mut bytes = b"person_id|first_name\np1|".to_vec();
        bytes.push(0xE9);
        bytes.push(b'\n');
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        let table = read_delimited_file(f.path()).unwrap();
        assert_eq!(table.row_count(), 1);
    }
}
