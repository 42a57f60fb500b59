//! Row Cleaner (C6, §4.6): whitespace trim, mojibake fixes, empty-row
//! removal, PHI hashing, and `DataQualityIssue` accounting.
//!
//! Deterministic and column-level only: row count may decrease (step 1)
//! but never increase, and no row is rejected for a bad value — typing is
//! the warehouse's concern (§9).

use etl_security::{FieldsToHash, PhiHasher};

use crate::table::RawTable;

/// One `DataQualityIssue` (§3.2), prior to being handed to the Metadata
/// Store for persistence (table/file are filled in by the caller).
#[derive(Debug, Clone)]
pub struct CleaningIssue {
    pub kind: &'static str,
    pub description: String,
}

/// Mojibake substitutions applied to every text cell, in order (§4.6 step 3).
const MOJIBAKE_FIXES: &[(&str, &str)] = &[("â€™", "'"), ("â€œ", "\""), ("â€", "\"")];

/// Runs the full cleaning pipeline and returns the cleaned table plus the
/// issues raised along the way.
pub fn clean(mut table: RawTable, table_name: &str, hasher: Option<(&PhiHasher, &FieldsToHash)>) -> (RawTable, Vec<CleaningIssue>) {
    let mut issues = Vec::new();

    // 1. Drop rows where every cell is empty/null.
    let before = table.rows.len();
    table.rows.retain(|row| row.iter().any(|c| c.is_some()));
    let removed = before - table.rows.len();
    if removed > 0 {
        issues.push(CleaningIssue {
            kind: "empty_rows",
            description: format!("Removed {removed} empty rows"),
        });
    }

    // 2 & 3. Trim whitespace, then normalize mojibake / literal "nan".
    for row in table.rows.iter_mut() {
        for cell in row.iter_mut() {
            if let Some(text) = cell {
                let trimmed = text.trim();
                let mut normalized = trimmed.to_string();
                for (bad, good) in MOJIBAKE_FIXES {
                    normalized = normalized.replace(bad, good);
                }
                if normalized == "nan" {
                    *cell = None;
                } else {
                    *cell = Some(normalized);
                }
            }
        }
    }

    // 4. PHI hashing.
    if let Some((hasher, fields)) = hasher {
        let hashed_columns: Vec<(usize, &str)> = table
            .headers
            .iter()
            .enumerate()
            .filter(|(_, col)| fields.should_hash(table_name, col))
            .map(|(i, col)| (i, col.as_str()))
            .collect();

        if !hashed_columns.is_empty() {
            for row in table.rows.iter_mut() {
                for (idx, _) in &hashed_columns {
                    if let Some(cell) = row.get_mut(*idx) {
                        if let Some(value) = cell {
                            *value = hasher.hash(value);
                        }
                    }
                }
            }
            let names: Vec<&str> = hashed_columns.iter().map(|(_, c)| *c).collect();
            issues.push(CleaningIssue {
                kind: "phi_hashing",
                description: format!("Hashed {} PHI field(s): {}", names.len(), names.join(", ")),
            });
        }
    }

    (table, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn table(headers: &[&str], rows: Vec<Vec<Option<&str>>>) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| c.map(|s| s.to_string())).collect())
                .collect(),
        }
    }

    #[test]
    fn drops_fully_empty_rows_only() {
        let t = table(
            "a;b".split(';').collect::<Vec<_>>().as_slice(),
            vec![vec![None, None], vec![Some("x"), None], vec![Some(" y "), Some("z")]],
        );
        let (cleaned, issues) = clean(t, "t", None);
        assert_eq!(cleaned.row_count(), 2);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, "empty_rows");
    }

    #[test]
    fn trims_whitespace_and_fixes_mojibake() {
        let t = RawTable {
            headers: vec!["name".to_string()],
            rows: vec![
                vec![Some("  John\u{e2}\u{20ac}\u{2122}s  ".to_string())],
                vec![Some("nan".to_string())],
                vec![Some("  padded  ".to_string())],
            ],
        };
        let (cleaned, _issues) = clean(t, "t", None);
        assert_eq!(cleaned.rows[0][0].as_deref(), Some("John's"));
        assert_eq!(cleaned.rows[1][0], None);
        assert_eq!(cleaned.rows[2][0].as_deref(), Some("padded"));
    }

    #[test]
    fn never_increases_row_count() {
        let t = table(&["a"], vec![vec![Some("1")], vec![Some("2")], vec![None]]);
        let (cleaned, _) = clean(t, "t", None);
        assert!(cleaned.row_count() <= 3);
    }

    #[test]
    fn hashes_only_configured_columns() {
        let t = table(&["person_id", "first_name"], vec![vec![Some("p1"), Some("John")]]);
        let salt = etl_security::Salt::parse(&"a".repeat(64)).unwrap();
        let hasher = PhiHasher::new(salt);
        let mut map = HashMap::new();
        map.insert("people".to_string(), HashSet::from(["person_id".to_string()]));
        let fields = FieldsToHash::new(map);

        let (cleaned, issues) = clean(t, "people", Some((&hasher, &fields)));
        let hashed = cleaned.rows[0][0].as_ref().unwrap();
        assert_eq!(hashed.len(), 64);
        assert_eq!(cleaned.rows[0][1].as_deref(), Some("John"));
        assert_eq!(issues.last().unwrap().kind, "phi_hashing");
    }

    #[test]
    fn missing_configured_column_is_silently_ignored() {
        let t = table(&["first_name"], vec![vec![Some("John")]]);
        let salt = etl_security::Salt::parse(&"a".repeat(64)).unwrap();
        let hasher = PhiHasher::new(salt);
        let mut map = HashMap::new();
        map.insert("people".to_string(), HashSet::from(["person_id".to_string()]));
        let fields = FieldsToHash::new(map);

        let (cleaned, issues) = clean(t, "people", Some((&hasher, &fields)));
        assert_eq!(cleaned.rows[0][0].as_deref(), Some("John"));
        assert!(issues.is_empty());
    }
}
