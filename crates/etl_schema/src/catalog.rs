//! Canonical table/column definitions (§3.1, §4.2).
//!
//! The catalog is the one source of truth for warehouse schema. It never
//! talks to a live connection: it emits dialect-neutral DDL that is piped
//! through `Dialect::normalize` (C1) by the caller, per the §9 design note
//! preferring a small typed IR over textual regex translation.

use std::collections::HashMap;

use etl_db::Dialect;

/// Dialect-neutral column type (glossary: `TEXT, INT, REAL, TIMESTAMP, DATE, BOOL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalType {
    Text,
    Int,
    Real,
    Timestamp,
    Date,
    Bool,
}

impl CanonicalType {
    /// Column-name-convention inference used for remediation DDL when a
    /// type cannot be read from an existing warehouse column (§4.2).
    pub fn infer_from_column_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with("_id") {
            CanonicalType::Text
        } else if lower.ends_with("_at") || lower.starts_with("date") || lower.contains("date") {
            CanonicalType::Timestamp
        } else if lower.ends_with("_count") || lower.ends_with("size") {
            CanonicalType::Int
        } else if lower.contains("income") || lower.contains("amount") || lower.contains("price") {
            CanonicalType::Real
        } else {
            CanonicalType::Text
        }
    }

    /// Canonical DDL token; dialect-specific mapping happens in `Dialect::normalize`.
    pub fn ddl_token(&self) -> &'static str {
        match self {
            CanonicalType::Text => "TEXT_TYPE",
            CanonicalType::Int => "INTEGER",
            CanonicalType::Real => "REAL",
            CanonicalType::Timestamp => "TIMESTAMP_TYPE",
            CanonicalType::Date => "DATE",
            CanonicalType::Bool => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: CanonicalType,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, ty: CanonicalType) -> Self {
        Self { name: name.into(), ty, nullable: true }
    }
}

/// A canonical table definition. The two audit columns are appended by the
/// Repository (C3), not declared here — they are not part of the file-facing
/// schema a drift check validates against.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Option<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>, primary_key: Option<&str>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: primary_key.map(|s| s.to_string()),
        }
    }

    pub fn required_columns(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Canonical `CREATE TABLE`, dialect-neutral. Audit columns are included
    /// here since any fresh `CREATE TABLE` (e.g. for `missing_table` drift)
    /// must declare them up front.
    pub fn canonical_create_ddl(&self) -> String {
        let mut cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let pk = self.primary_key.as_deref() == Some(c.name.as_str());
                if pk {
                    format!("{} {} PRIMARY KEY", c.name, c.ty.ddl_token())
                } else {
                    format!("{} {}", c.name, c.ty.ddl_token())
                }
            })
            .collect();
        cols.push("etl_loaded_at TIMESTAMP_TYPE".to_string());
        cols.push("etl_updated_at TIMESTAMP_TYPE".to_string());
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.name, cols.join(", "))
    }
}

/// The full canonical DDL document: all tables and indexes.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: HashMap<String, TableSpec>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableSpec) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.get(name)
    }

    /// `RequiredColumns(table) -> [name]`.
    pub fn required_columns(&self, table: &str) -> Option<Vec<&str>> {
        self.tables.get(table).map(|t| t.required_columns())
    }

    /// `PrimaryKey(table) -> name?`.
    pub fn primary_key(&self, table: &str) -> Option<&str> {
        self.tables.get(table).and_then(|t| t.primary_key.as_deref())
    }

    /// Produce the full canonical DDL document, normalized for one dialect.
    pub fn dialect_ddl(&self, dialect: Dialect) -> Vec<String> {
        self.tables
            .values()
            .map(|t| dialect.normalize(&t.canonical_create_ddl()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_type_from_column_name_convention() {
        assert_eq!(CanonicalType::infer_from_column_name("person_id"), CanonicalType::Text);
        assert_eq!(CanonicalType::infer_from_column_name("created_at"), CanonicalType::Timestamp);
        assert_eq!(CanonicalType::infer_from_column_name("file_date"), CanonicalType::Timestamp);
        assert_eq!(CanonicalType::infer_from_column_name("row_count"), CanonicalType::Int);
        assert_eq!(CanonicalType::infer_from_column_name("file_size"), CanonicalType::Int);
        assert_eq!(CanonicalType::infer_from_column_name("household_income"), CanonicalType::Real);
        assert_eq!(CanonicalType::infer_from_column_name("unit_price"), CanonicalType::Real);
        assert_eq!(CanonicalType::infer_from_column_name("notes"), CanonicalType::Text);
    }

    #[test]
    fn canonical_create_ddl_includes_audit_columns() {
        let table = TableSpec::new(
            "people",
            vec![ColumnSpec::new("person_id", CanonicalType::Text), ColumnSpec::new("first_name", CanonicalType::Text)],
            Some("person_id"),
        );
        let ddl = table.canonical_create_ddl();
        assert!(ddl.contains("person_id TEXT_TYPE PRIMARY KEY"));
        assert!(ddl.contains("etl_loaded_at TIMESTAMP_TYPE"));
        assert!(ddl.contains("etl_updated_at TIMESTAMP_TYPE"));
    }
}
