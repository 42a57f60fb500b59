//! Drift detection and remediation DDL (§3.2 `SchemaDrift`, §4.2, §8 scenario 4).

use chrono::{DateTime, Utc};
use etl_db::Dialect;
use serde::{Deserialize, Serialize};

use crate::catalog::{CanonicalType, SchemaCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftKind {
    MissingTable,
    MissingColumn,
    ExtraColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDrift {
    pub kind: DriftKind,
    pub table: String,
    pub file: String,
    pub details: String,
    pub remediation_ddl: Option<String>,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SchemaDrift {
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Given `(table, observed columns)`, returns the minimal set of
/// `SchemaDrift` events needed so that a subsequent import would succeed.
pub fn detect_drift(
    catalog: &SchemaCatalog,
    dialect: Dialect,
    table: &str,
    file: &str,
    observed_columns: &[String],
) -> Vec<SchemaDrift> {
    let Some(table_spec) = catalog.table(table) else {
        let ddl = dialect.normalize(&missing_table_ddl(table, observed_columns));
        return vec![SchemaDrift {
            kind: DriftKind::MissingTable,
            table: table.to_string(),
            file: file.to_string(),
            details: format!("table {table} is not declared in the schema catalog"),
            remediation_ddl: Some(ddl),
            severity: Severity::Critical,
            detected_at: Utc::now(),
            resolved_at: None,
        }];
    };

    // A column present in the file but not declared in the catalog/table is
    // the critical `missing_column` case (§3.2, §4.2, original
    // `schema_validator.py`'s `missing_in_table = set(file_columns) - actual_columns`):
    // the table is missing a column the file needs, so the load would fail
    // with an opaque "no such column" error unless the operator runs the
    // remediation DDL first. A catalog column the file simply omits is not
    // an error — it loads as null — so it is reported as a warning only.
    let required = table_spec.required_columns();
    let missing_in_table: Vec<&String> = observed_columns
        .iter()
        .filter(|oc| !required.iter().any(|c| c == oc.as_str()))
        .collect();
    let missing_in_file: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| !observed_columns.iter().any(|oc| oc == c))
        .collect();

    let mut events = Vec::new();

    if !missing_in_table.is_empty() {
        let ddl = missing_in_table
            .iter()
            .map(|col| {
                let ty = CanonicalType::infer_from_column_name(col);
                dialect.normalize(&format!("ALTER TABLE {table} ADD COLUMN {col} {};", ty.ddl_token()))
            })
            .collect::<Vec<_>>()
            .join("\n");
        events.push(SchemaDrift {
            kind: DriftKind::MissingColumn,
            table: table.to_string(),
            file: file.to_string(),
            details: format!(
                "missing column(s): {}",
                missing_in_table.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ),
            remediation_ddl: Some(ddl),
            severity: Severity::Critical,
            detected_at: Utc::now(),
            resolved_at: None,
        });
    }

    if !missing_in_file.is_empty() {
        events.push(SchemaDrift {
            kind: DriftKind::ExtraColumn,
            table: table.to_string(),
            file: file.to_string(),
            details: format!(
                "catalog column(s) not present in this file (will load as null): {}",
                missing_in_file.join(", ")
            ),
            remediation_ddl: None,
            severity: Severity::Warning,
            detected_at: Utc::now(),
            resolved_at: None,
        });
    }

    events
}

fn missing_table_ddl(table: &str, observed_columns: &[String]) -> String {
    let cols = observed_columns
        .iter()
        .map(|c| format!("{c} {}", CanonicalType::infer_from_column_name(c).ddl_token()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS {table} ({cols}, etl_loaded_at TIMESTAMP_TYPE, etl_updated_at TIMESTAMP_TYPE)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnSpec, TableSpec};

    fn catalog() -> SchemaCatalog {
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

    #[test]
    fn file_column_absent_from_table_is_critical_with_alter_ddl() {
        // Scenario 4: schema drift, missing column. `preferred_name` is in
        // the file but not declared on the `people` table, so the table is
        // missing a column the file needs.
        let drifts = detect_drift(
            &catalog(),
            Dialect::Sqlite,
            "people",
            "chhsca_people_20250828.txt",
            &["person_id".into(), "first_name".into(), "last_name".into(), "preferred_name".into()],
        );
        let missing = drifts.iter().find(|d| d.kind == DriftKind::MissingColumn).unwrap();
        assert!(missing.is_critical());
        assert!(missing.details.contains("preferred_name"));
        assert!(missing.remediation_ddl.as_ref().unwrap().contains("ADD COLUMN preferred_name"));
    }

    #[test]
    fn file_omitting_an_optional_catalog_column_is_a_warning_only() {
        // A file that legitimately omits a declared column (it will load as
        // null) must not fail at validation.
        let drifts = detect_drift(
            &catalog(),
            Dialect::Mssql,
            "people",
            "chhsca_people_20250828.txt",
            &["person_id".into(), "first_name".into()],
        );
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].kind, DriftKind::ExtraColumn);
        assert_eq!(drifts[0].severity, Severity::Warning);
        assert!(drifts[0].details.contains("last_name"));
        assert!(drifts[0].remediation_ddl.is_none());
    }

    #[test]
    fn unknown_table_is_missing_table_drift() {
        let drifts = detect_drift(&catalog(), Dialect::Sqlite, "unknown_table", "f.txt", &["a".into()]);
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].kind, DriftKind::MissingTable);
        assert!(drifts[0].remediation_ddl.as_ref().unwrap().starts_with("CREATE TABLE"));
    }

    #[test]
    fn column_in_file_but_not_in_catalog_is_critical() {
        let drifts = detect_drift(
            &catalog(),
            Dialect::Sqlite,
            "people",
            "f.txt",
            &["person_id".into(), "first_name".into(), "last_name".into(), "middle_name".into()],
        );
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].kind, DriftKind::MissingColumn);
        assert_eq!(drifts[0].severity, Severity::Critical);
        assert!(drifts[0].remediation_ddl.as_ref().unwrap().contains("ADD COLUMN middle_name"));
    }
}
