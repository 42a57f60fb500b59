//! Schema Catalog (C2): canonical table/column definitions, dialect DDL
//! emission, and schema-drift detection with remediation DDL.

pub mod catalog;
pub mod drift;

pub use catalog::{CanonicalType, ColumnSpec, SchemaCatalog, TableSpec};
pub use drift::{detect_drift, DriftKind, SchemaDrift, Severity};
