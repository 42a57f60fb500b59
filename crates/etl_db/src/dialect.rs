//! Dialect Adapter (C1): dialect identity and canonical-DDL/SQL normalization.
//!
//! `Normalize` is the single translation point the Schema Catalog (C2) and
//! Repository (C3) both go through to turn dialect-neutral DDL/SQL fragments
//! into dialect-correct text. Token substitutions are grounded on the
//! original `core/database_adapter.py::normalize_sql` implementations, one
//! per dialect.

use std::fmt;

/// One of the four supported warehouse backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Dialect {
    Sqlite,
    Mssql,
    Postgres,
    MySql,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Mssql => "mssql",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
        }
    }

    /// Whether an autoincrement primary key uses `IDENTITY(1,1)`-style DDL
    /// rather than the canonical `AUTOINCREMENT` token.
    pub fn autoincrement_token(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "AUTOINCREMENT",
            Dialect::Mssql => "IDENTITY(1,1)",
            Dialect::Postgres => "",
            Dialect::MySql => "AUTO_INCREMENT",
        }
    }

    /// Parameter placeholder style used when building parameterized SQL.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
            Dialect::Mssql => format!("@P{index}"),
            Dialect::Postgres => format!("${index}"),
        }
    }

    /// `Normalize(ddl)`: convert one canonical DDL/SQL fragment to this
    /// dialect's text. Applies the token substitutions in §4.1, in order.
    pub fn normalize(&self, canonical: &str) -> String {
        let mut sql = canonical.to_string();

        sql = sql.replace("AUTOINCREMENT_TOKEN", self.autoincrement_token());

        match self {
            Dialect::Sqlite => {
                sql = sql.replace("TEXT_TYPE", "TEXT");
                sql = sql.replace("TIMESTAMP_TYPE", "TIMESTAMP");
            }
            Dialect::Mssql => {
                sql = sql.replace("TEXT_TYPE", "NVARCHAR(MAX)");
                sql = sql.replace("TIMESTAMP_TYPE", "DATETIME2");
                sql = sql.replace("INTEGER", "INT");
                sql = sql.replace("||", " + ");
                sql = normalize_mssql_datediff(&sql);
                // MS SQL's CREATE TABLE has no IF NOT EXISTS; callers must
                // guard with an existence check instead.
                sql = sql.replace("IF NOT EXISTS ", "");
            }
            Dialect::Postgres => {
                sql = sql.replace("TEXT_TYPE", "TEXT");
                sql = sql.replace("TIMESTAMP_TYPE", "TIMESTAMP");
            }
            Dialect::MySql => {
                sql = sql.replace("TEXT_TYPE", "TEXT");
                sql = sql.replace("TIMESTAMP_TYPE", "DATETIME");
            }
        }

        sql
    }

    /// Azure SQL is auto-detected by the host name suffix.
    pub fn is_azure_sql(server: &str) -> bool {
        server.ends_with(".database.windows.net")
    }

    /// SQLite connection pragmas applied on every new connection.
    pub const SQLITE_PRAGMAS: &'static [&'static str] = &[
        "PRAGMA foreign_keys = ON",
        "PRAGMA journal_mode = WAL",
        "PRAGMA synchronous = NORMAL",
        "PRAGMA cache_size = 10000",
        "PRAGMA temp_store = MEMORY",
    ];
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// `julianday('now')-julianday(col) -> DATEDIFF(day, col, GETDATE())` (MS SQL).
fn normalize_mssql_datediff(sql: &str) -> String {
    // The canonical form always appears as `julianday('now')-julianday(<col>)`;
    // a small state-machine avoids pulling in a regex dependency for one shape.
    const NEEDLE: &str = "julianday('now')-julianday(";
    let Some(start) = sql.find(NEEDLE) else {
        return sql.to_string();
    };
    let after = &sql[start + NEEDLE.len()..];
    let Some(close) = after.find(')') else {
        return sql.to_string();
    };
    let column = &after[..close];
    let replacement = format!("DATEDIFF(day, {column}, GETDATE())");
    format!(
        "{}{}{}",
        &sql[..start],
        replacement,
        &after[close + 1..]
    )
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown database dialect: {0}")]
pub struct UnknownDialect(pub String);

impl std::str::FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "mssql" | "sqlserver" | "azuresql" => Ok(Dialect::Mssql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            other => Err(UnknownDialect(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_text_and_identity_tokens() {
        let ddl = "CREATE TABLE IF NOT EXISTS t (id INTEGER AUTOINCREMENT_TOKEN, name TEXT_TYPE)";
        assert_eq!(
            Dialect::Sqlite.normalize(ddl),
            "CREATE TABLE IF NOT EXISTS t (id INTEGER AUTOINCREMENT, name TEXT)"
        );
        assert_eq!(
            Dialect::MySql.normalize(ddl),
            "CREATE TABLE IF NOT EXISTS t (id INTEGER AUTO_INCREMENT, name TEXT)"
        );
    }

    #[test]
    fn mssql_drops_if_not_exists_and_maps_types() {
        let ddl = "CREATE TABLE IF NOT EXISTS t (id INTEGER AUTOINCREMENT_TOKEN, name TEXT_TYPE)";
        let out = Dialect::Mssql.normalize(ddl);
        assert!(!out.contains("IF NOT EXISTS"));
        assert!(out.contains("INT"));
        assert!(out.contains("IDENTITY(1,1)"));
        assert!(out.contains("NVARCHAR(MAX)"));
    }

    #[test]
    fn mssql_rewrites_concatenation() {
        assert_eq!(Dialect::Mssql.normalize("a || b"), "a  +  b");
    }

    #[test]
    fn mssql_rewrites_datediff() {
        let out = Dialect::Mssql.normalize("julianday('now')-julianday(loaded_at) > 30");
        assert_eq!(out, "DATEDIFF(day, loaded_at, GETDATE()) > 30");
    }

    #[test]
    fn azure_sql_detected_by_host_suffix() {
        assert!(Dialect::is_azure_sql("myserver.database.windows.net"));
        assert!(!Dialect::is_azure_sql("localhost"));
    }

    #[test]
    fn parses_from_str_case_insensitively() {
        assert_eq!("SQLite".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert_eq!("AzureSQL".parse::<Dialect>().unwrap(), Dialect::Mssql);
        assert!("oracle".parse::<Dialect>().is_err());
    }
}
