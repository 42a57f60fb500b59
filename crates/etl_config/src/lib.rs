//! `CoreConfig` (§6): a fully-resolved configuration value injected into the
//! core at `Init`. The core never reads disk or environment itself — that is
//! explicitly out of scope (§1) — but the value it receives is still a
//! validated, strongly-typed Rust struct, not a loose bag of strings, the
//! way the original `core/config.py` built nested dataclasses
//! (`DatabaseConfig`, `SFTPConfig`, `SecurityConfig`, `ETLConfig`).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use etl_db::Dialect;
use etl_security::Salt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `ErrConfig`: the core refuses to start on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown database dialect: {0}")]
    UnknownDialect(String),
    #[error("sqlite database requires a file path")]
    MissingSqlitePath,
    #[error("{dialect} database requires host/server connection parameters")]
    MissingNetworkParams { dialect: &'static str },
    #[error("mssql trusted connection requires no user/password; non-trusted requires both")]
    InconsistentMssqlAuth,
    #[error("phi hashing is enabled (fields_to_hash is non-empty) but the salt is invalid: {0}")]
    InvalidSalt(#[from] etl_security::SaltError),
    #[error("etl.max_workers must be >= 1")]
    MaxWorkersZero,
    #[error("directories.input must be set")]
    MissingInputDirectory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "dialect", rename_all = "lowercase")]
pub enum DbConfig {
    Sqlite {
        path: PathBuf,
    },
    Mssql {
        server: String,
        port: u16,
        database: String,
        trusted: bool,
        user: Option<String>,
        password: Option<String>,
    },
    Postgres {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: String,
    },
    MySql {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: String,
    },
}

impl DbConfig {
    pub fn dialect(&self) -> Dialect {
        match self {
            DbConfig::Sqlite { .. } => Dialect::Sqlite,
            DbConfig::Mssql { .. } => Dialect::Mssql,
            DbConfig::Postgres { .. } => Dialect::Postgres,
            DbConfig::MySql { .. } => Dialect::MySql,
        }
    }

    /// Whether this MS SQL target is Azure SQL by host-suffix detection (§4.1).
    pub fn is_azure_sql(&self) -> bool {
        matches!(self, DbConfig::Mssql { server, .. } if Dialect::is_azure_sql(server))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            DbConfig::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::MissingSqlitePath);
                }
            }
            DbConfig::Mssql { server, database, trusted, user, password, .. } => {
                if server.is_empty() || database.is_empty() {
                    return Err(ConfigError::MissingNetworkParams { dialect: "mssql" });
                }
                let azure = Dialect::is_azure_sql(server);
                if azure && *trusted {
                    return Err(ConfigError::InconsistentMssqlAuth);
                }
                if *trusted && (user.is_some() || password.is_some()) {
                    return Err(ConfigError::InconsistentMssqlAuth);
                }
                if !trusted && user.is_none() {
                    return Err(ConfigError::InconsistentMssqlAuth);
                }
            }
            DbConfig::Postgres { host, database, .. } | DbConfig::MySql { host, database, .. } => {
                if host.is_empty() || database.is_empty() {
                    return Err(ConfigError::MissingNetworkParams {
                        dialect: if matches!(self, DbConfig::Postgres { .. }) { "postgres" } else { "mysql" },
                    });
                }
            }
        }
        Ok(())
    }

    pub fn connection_timeout_secs_default() -> u64 {
        30
    }

    pub fn max_connections_default() -> u32 {
        10
    }
}

/// SSH key material accepted by the SFTP Puller (C10, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SftpAuth {
    Password { username: String, password: String },
    PrivateKey { username: String, key_path: PathBuf, passphrase: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub auth: SftpAuth,
    pub known_hosts_path: PathBuf,
    pub remote_directory: String,
    pub globs: Vec<String>,
    pub delete_after_download: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            auth: SftpAuth::Password { username: String::new(), password: String::new() },
            known_hosts_path: PathBuf::from("known_hosts"),
            remote_directory: "/".to_string(),
            globs: vec!["*.txt".to_string(), "*.csv".to_string(), "*.tsv".to_string()],
            delete_after_download: false,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    pub retry_attempts: u32,
    pub skip_processed: bool,
    pub force_reprocess: bool,
    pub latest_only: bool,
    pub ignored_filename_prefixes: Vec<String>,
    pub file_patterns: Vec<String>,
    pub recognized_extensions: Vec<String>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_workers: 4,
            retry_attempts: 3,
            skip_processed: true,
            force_reprocess: false,
            latest_only: false,
            ignored_filename_prefixes: vec!["SAMPLE".into(), "TEST".into(), "CHHSCA".into()],
            file_patterns: vec!["*.txt".into(), "*.csv".into(), "*.tsv".into()],
            recognized_extensions: vec!["txt".into(), "csv".into(), "tsv".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub phi_salt: String,
    /// `table -> columns to hash` (§4.5 closed set).
    pub fields_to_hash: HashMap<String, HashSet<String>>,
}

impl SecurityConfig {
    pub fn hashing_enabled(&self) -> bool {
        !self.fields_to_hash.is_empty()
    }

    pub fn validated_salt(&self) -> Result<Salt, etl_security::SaltError> {
        Salt::parse(&self.phi_salt)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoriesConfig {
    pub input: PathBuf,
    pub database: PathBuf,
    pub backup: Option<PathBuf>,
}

/// The single configuration value the host passes to `Init` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub db: DbConfig,
    pub sftp: Option<SftpConfig>,
    pub etl: EtlConfig,
    pub security: SecurityConfig,
    pub directories: DirectoriesConfig,
}

impl CoreConfig {
    /// Performed once at `Init` (§6, §10); surfaces `ErrConfig` and aborts
    /// startup on any failure (§7).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.db.validate()?;

        if self.etl.max_workers == 0 {
            return Err(ConfigError::MaxWorkersZero);
        }

        if self.directories.input.as_os_str().is_empty() {
            return Err(ConfigError::MissingInputDirectory);
        }

        if self.security.hashing_enabled() {
            self.security.validated_salt()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> CoreConfig {
        CoreConfig {
            db: DbConfig::Sqlite { path: PathBuf::from("warehouse.db") },
            sftp: None,
            etl: EtlConfig::default(),
            security: SecurityConfig { phi_salt: String::new(), fields_to_hash: HashMap::new() },
            directories: DirectoriesConfig {
                input: PathBuf::from("/data/in"),
                database: PathBuf::from("/data/internal.db"),
                backup: None,
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut cfg = base_config();
        cfg.etl.max_workers = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::MaxWorkersZero)));
    }

    #[test]
    fn hashing_enabled_without_salt_is_rejected() {
        let mut cfg = base_config();
        cfg.security.fields_to_hash.insert("people".into(), HashSet::from(["person_id".into()]));
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidSalt(_))));
    }

    #[test]
    fn hashing_enabled_with_valid_salt_passes() {
        let mut cfg = base_config();
        cfg.security.phi_salt = "a".repeat(64);
        cfg.security.fields_to_hash.insert("people".into(), HashSet::from(["person_id".into()]));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn azure_sql_with_trusted_connection_is_rejected() {
        let mut cfg = base_config();
        cfg.db = DbConfig::Mssql {
            server: "myserver.database.windows.net".into(),
            port: 1433,
            database: "warehouse".into(),
            trusted: true,
            user: None,
            password: None,
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InconsistentMssqlAuth)));
    }

    #[test]
    fn mssql_non_trusted_requires_user() {
        let mut cfg = base_config();
        cfg.db = DbConfig::Mssql {
            server: "localhost".into(),
            port: 1433,
            database: "warehouse".into(),
            trusted: false,
            user: None,
            password: None,
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InconsistentMssqlAuth)));
    }
}
