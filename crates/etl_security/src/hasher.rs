//! Deterministic salted SHA-256 hashing of PHI/PII fields.
//!
//! A value is hashed as `SHA-256(salt || value || salt)`, lowercase hex.
//! Empty values and the sentinel strings `nan`/`none`/`null` (any case) pass
//! through unchanged so that warehouse null-handling is unaffected by hashing.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};
use thiserror::Error;

const SALT_HEX_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum SaltError {
    #[error("phi hash salt is missing but hashing is enabled")]
    Missing,
    #[error("phi hash salt must be {SALT_HEX_LEN} hex characters, got {0}")]
    WrongLength(usize),
    #[error("phi hash salt must be hex-encoded: {0}")]
    NotHex(String),
}

/// A validated salt value. Construction is the only way to obtain one, so a
/// `PhiHasher` can never be built with a malformed salt.
#[derive(Debug, Clone)]
pub struct Salt(String);

impl Salt {
    pub fn parse(raw: &str) -> Result<Self, SaltError> {
        if raw.is_empty() {
            return Err(SaltError::Missing);
        }
        if raw.len() != SALT_HEX_LEN {
            return Err(SaltError::WrongLength(raw.len()));
        }
        if !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SaltError::NotHex(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }
}

fn is_sentinel(value: &str) -> bool {
    value.is_empty() || matches!(value.to_ascii_lowercase().as_str(), "nan" | "none" | "null")
}

/// `table -> set of columns to hash`. A closed set enumerated by configuration.
#[derive(Debug, Clone, Default)]
pub struct FieldsToHash(HashMap<String, HashSet<String>>);

impl FieldsToHash {
    pub fn new(map: HashMap<String, HashSet<String>>) -> Self {
        Self(map)
    }

    /// `ShouldHash(table, column)`.
    pub fn should_hash(&self, table: &str, column: &str) -> bool {
        self.0
            .get(table)
            .map(|cols| cols.contains(column))
            .unwrap_or(false)
    }

    pub fn columns_for(&self, table: &str) -> impl Iterator<Item = &str> {
        self.0
            .get(table)
            .into_iter()
            .flat_map(|cols| cols.iter().map(|c| c.as_str()))
    }
}

/// Pure function `Hash(v)` plus the closed-set field-selection policy.
pub struct PhiHasher {
    salt: Salt,
}

impl PhiHasher {
    pub fn new(salt: Salt) -> Self {
        Self { salt }
    }

    /// `Hash(v)`: deterministic, a pure function of `(salt, value)`.
    pub fn hash(&self, value: &str) -> String {
        if is_sentinel(value) {
            return value.to_string();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.salt.0.as_bytes());
        hasher.update(value.as_bytes());
        hasher.update(self.salt.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salt() -> Salt {
        Salt::parse(&"a".repeat(64)).unwrap()
    }

    #[test]
    fn rejects_missing_salt() {
        assert!(matches!(Salt::parse(""), Err(SaltError::Missing)));
    }

    #[test]
    fn rejects_wrong_length_salt() {
        assert!(matches!(
            Salt::parse("abc"),
            Err(SaltError::WrongLength(3))
        ));
    }

    #[test]
    fn rejects_non_hex_salt() {
        assert!(matches!(Salt::parse(&"z".repeat(64)), Err(SaltError::NotHex(_))));
    }

    #[test]
    fn hash_is_deterministic_and_well_formed() {
        let hasher = PhiHasher::new(salt());
        let h1 = hasher.hash("p1");
        let h2 = hasher.hash("p1");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sentinels_pass_through() {
        let hasher = PhiHasher::new(salt());
        assert_eq!(hasher.hash(""), "");
        assert_eq!(hasher.hash("nan"), "nan");
        assert_eq!(hasher.hash("NaN"), "NaN");
        assert_eq!(hasher.hash("None"), "None");
        assert_eq!(hasher.hash("NULL"), "NULL");
    }

    #[test]
    fn distinct_values_hash_distinctly() {
        let hasher = PhiHasher::new(salt());
        assert_ne!(hasher.hash("p1"), hasher.hash("p2"));
    }

    #[test]
    fn same_value_same_hash_across_tables() {
        // Scenario 5: PHI hashing determinism across tables.
        let hasher = PhiHasher::new(salt());
        assert_eq!(hasher.hash("p1"), hasher.hash("p1"));
    }

    #[test]
    fn should_hash_is_a_closed_set() {
        let mut map = HashMap::new();
        map.insert("people".to_string(), HashSet::from(["person_id".to_string()]));
        let fields = FieldsToHash::new(map);
        assert!(fields.should_hash("people", "person_id"));
        assert!(!fields.should_hash("people", "first_name"));
        assert!(!fields.should_hash("cases", "person_id"));
    }
}
