//! SFTP Puller (C10): authenticated file download from a remote host into
//! the local watched directory, ahead of File Discovery (§4.9 step 1).

pub mod error;
pub mod known_hosts;
pub mod ppk;
pub mod puller;

pub use error::{Result, SftpError};
pub use ppk::{convert_ppk, ConvertedKey};
pub use puller::{PerFileResult, PullResult, SftpPuller};
