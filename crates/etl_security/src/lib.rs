//! PHI/PII hashing for the ETL core.
//!
//! - **hasher**: salted SHA-256 field hashing (C5 PHI Hasher)

pub mod hasher;

pub use hasher::{FieldsToHash, PhiHasher, Salt, SaltError};
