use thiserror::Error;

/// `ErrAuthSFTP`, `ErrKeyFormat`, `ErrHost` (§7): reported per file or per
/// connection attempt; the puller continues with the next file/glob.
#[derive(Debug, Error)]
pub enum SftpError {
    #[error("sftp authentication failed for {username}@{host}: {reason}")]
    Auth { host: String, username: String, reason: String },

    #[error("unsupported or malformed private key: {0}")]
    KeyFormat(String),

    #[error("host key verification failed for {host}: {reason}")]
    Host { host: String, reason: String },

    #[error("tcp connect to {host}:{port} failed: {source}")]
    Connect { host: String, port: u16, source: std::io::Error },

    #[error("ssh2 session error: {0}")]
    Ssh2(#[from] ssh2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SftpError>;
