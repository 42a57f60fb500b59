//! SFTP Puller (C10, §4.10): authenticated listing/download over `ssh2`,
//! TOFU host-key verification, glob filtering, and optional post-download
//! delete. `ssh2` (libssh2) is synchronous; the orchestrator is expected to
//! run `pull()` via `tokio::task::spawn_blocking`.

use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use etl_config::{SftpAuth, SftpConfig};
use ssh2::{Session, Sftp};

use crate::error::{Result, SftpError};
use crate::known_hosts;

/// One file's download/delete outcome.
#[derive(Debug, Clone)]
pub struct PerFileResult {
    pub remote_path: String,
    pub local_path: Option<PathBuf>,
    pub ok: bool,
    pub error: Option<String>,
}

/// `{total, ok, failed, per_file_results}` (§4.10).
#[derive(Debug, Clone)]
pub struct PullResult {
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
    pub per_file_results: Vec<PerFileResult>,
}

pub struct SftpPuller {
    config: SftpConfig,
}

impl SftpPuller {
    pub fn new(config: SftpConfig) -> Self {
        Self { config }
    }

    /// Connects, authenticates, lists `remote_directory` once, downloads
    /// every entry matching any configured glob into `local_directory`.
    /// Per-file errors never abort the run (§7: `ErrAuthSFTP`/`ErrKeyFormat`/
    /// `ErrHost` stop the whole pull since they mean the connection itself
    /// failed; download/delete failures for one file are recorded and the
    /// pull continues with the next).
    pub fn pull(&self, local_directory: &Path) -> Result<PullResult> {
        let session = self.connect_and_authenticate()?;
        let sftp = session.sftp().map_err(SftpError::Ssh2)?;

        let entries = sftp
            .readdir(Path::new(&self.config.remote_directory))
            .map_err(SftpError::Ssh2)?;

        let mut per_file_results = Vec::new();
        for (remote_path, stat) in entries {
            if stat.is_dir() {
                continue;
            }
            let file_name = match remote_path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if !self.matches_any_glob(file_name) {
                continue;
            }

            let local_path = local_directory.join(file_name);
            per_file_results.push(self.download_one(&sftp, &remote_path, &local_path));
        }

        let ok = per_file_results.iter().filter(|r| r.ok).count();
        let failed = per_file_results.len() - ok;
        Ok(PullResult { total: per_file_results.len(), ok, failed, per_file_results })
    }

    fn matches_any_glob(&self, file_name: &str) -> bool {
        self.config
            .globs
            .iter()
            .any(|pattern| glob::Pattern::new(pattern).map(|p| p.matches(file_name)).unwrap_or(false))
    }

    fn connect_and_authenticate(&self) -> Result<Session> {
        let tcp = TcpStream::connect((self.config.host.as_str(), self.config.port)).map_err(|e| {
            SftpError::Connect { host: self.config.host.clone(), port: self.config.port, source: e }
        })?;
        tcp.set_read_timeout(Some(Duration::from_secs(self.config.timeout_secs))).ok();

        let mut session = Session::new().map_err(SftpError::Ssh2)?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(SftpError::Ssh2)?;

        known_hosts::verify_or_trust(&session, &self.config.host, self.config.port, &self.config.known_hosts_path)?;

        self.authenticate(&session)?;
        Ok(session)
    }

    fn authenticate(&self, session: &Session) -> Result<()> {
        match &self.config.auth {
            SftpAuth::Password { username, password } => session.userauth_password(username, password).map_err(|e| {
                SftpError::Auth { host: self.config.host.clone(), username: username.clone(), reason: e.to_string() }
            }),
            SftpAuth::PrivateKey { username, key_path, passphrase } => {
                let is_ppk = key_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("ppk"))
                    .unwrap_or(false);

                if is_ppk {
                    let contents = std::fs::read_to_string(key_path).map_err(SftpError::Io)?;
                    let converted = crate::ppk::convert_ppk(&contents)?;
                    session.userauth_pubkey_memory(username, None, &converted.pem, passphrase.as_deref()).map_err(
                        |e| SftpError::Auth { host: self.config.host.clone(), username: username.clone(), reason: e.to_string() },
                    )
                } else {
                    session.userauth_pubkey_file(username, None, key_path, passphrase.as_deref()).map_err(|e| {
                        SftpError::Auth { host: self.config.host.clone(), username: username.clone(), reason: e.to_string() }
                    })
                }
            }
        }
    }

    fn download_one(&self, sftp: &Sftp, remote_path: &Path, local_path: &Path) -> PerFileResult {
        let remote_str = remote_path.to_string_lossy().to_string();
        match self.download_inner(sftp, remote_path, local_path) {
            Ok(()) => {
                if self.config.delete_after_download {
                    if let Err(e) = sftp.unlink(remote_path) {
                        tracing::warn!(remote = %remote_str, error = %e, "downloaded file but failed to delete remote copy");
                    }
                }
                PerFileResult { remote_path: remote_str, local_path: Some(local_path.to_path_buf()), ok: true, error: None }
            }
            Err(e) => {
                tracing::warn!(remote = %remote_str, error = %e, "sftp download failed");
                PerFileResult { remote_path: remote_str, local_path: None, ok: false, error: Some(e.to_string()) }
            }
        }
    }

    fn download_inner(&self, sftp: &Sftp, remote_path: &Path, local_path: &Path) -> Result<()> {
        let mut remote_file = sftp.open(remote_path).map_err(SftpError::Ssh2)?;
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent).map_err(SftpError::Io)?;
        }
        let mut local_file = std::fs::File::create(local_path).map_err(SftpError::Io)?;
        std::io::copy(&mut remote_file, &mut local_file).map_err(SftpError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(globs: &[&str]) -> SftpConfig {
        let mut cfg = SftpConfig::default();
        cfg.host = "sftp.example.org".to_string();
        cfg.globs = globs.iter().map(|s| s.to_string()).collect();
        cfg
    }

    #[test]
    fn matches_any_glob_checks_every_configured_pattern() {
        let puller = SftpPuller::new(config(&["*.txt", "*cases*"]));
        assert!(puller.matches_any_glob("people_20250101.txt"));
        assert!(puller.matches_any_glob("weekly_cases.csv"));
        assert!(!puller.matches_any_glob("readme.md"));
    }
}
