//! TOFU host-key verification against a persisted `known_hosts` file
//! (§4.10): on first contact the host key is accepted and saved; every
//! later connection to the same host is checked against the saved entry.

use ssh2::{CheckResult, HostKeyType, KnownHostFileKind, KnownHostKeyFormat, Session};

use crate::error::{Result, SftpError};

/// Verifies (and, on first contact, records) the host key `session`
/// presented after `handshake()`.
pub fn verify_or_trust(session: &Session, host: &str, port: u16, known_hosts_path: &std::path::Path) -> Result<()> {
    let (key, key_type) = session
        .host_key()
        .ok_or_else(|| SftpError::Host { host: host.to_string(), reason: "server presented no host key".to_string() })?;

    let mut known_hosts = session.known_hosts().map_err(SftpError::Ssh2)?;
    if known_hosts_path.exists() {
        known_hosts
            .read_file(known_hosts_path, KnownHostFileKind::OpenSSH)
            .map_err(|e| SftpError::Host { host: host.to_string(), reason: format!("could not read known_hosts: {e}") })?;
    }

    let check_host = if port == 22 { host.to_string() } else { format!("[{host}]:{port}") };

    match known_hosts.check(&check_host, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => {
            let format = known_host_format(key_type);
            known_hosts
                .add(&check_host, key, "added by etl_sftp (TOFU)", format)
                .map_err(|e| SftpError::Host { host: host.to_string(), reason: format!("could not record host key: {e}") })?;
            if let Some(parent) = known_hosts_path.parent() {
                std::fs::create_dir_all(parent).map_err(SftpError::Io)?;
            }
            known_hosts
                .write_file(known_hosts_path, KnownHostFileKind::OpenSSH)
                .map_err(|e| SftpError::Host { host: host.to_string(), reason: format!("could not persist known_hosts: {e}") })?;
            Ok(())
        }
        CheckResult::Mismatch => Err(SftpError::Host {
            host: host.to_string(),
            reason: "host key changed since last connection; possible man-in-the-middle".to_string(),
        }),
        CheckResult::Failure => {
            Err(SftpError::Host { host: host.to_string(), reason: "host key check failed".to_string() })
        }
    }
}

fn known_host_format(key_type: HostKeyType) -> KnownHostKeyFormat {
    match key_type {
        HostKeyType::Rsa => KnownHostKeyFormat::SshRsa,
        HostKeyType::Dss => KnownHostKeyFormat::SshDss,
        _ => KnownHostKeyFormat::SshRsa,
    }
}
