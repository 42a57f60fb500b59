//! Dialect-agnostic value representation.
//!
//! The Row Cleaner and Repository exchange `DbValue`s rather than
//! driver-native types so that a single code path binds parameters and reads
//! rows across SQLite, PostgreSQL, MySQL, and MS SQL (§9: "keep the wire
//! representation as strings ... let the Repository bind as strings and rely
//! on dialect implicit conversions").

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// A UTC timestamp with the RFC3339 / Unix-millis conversions the
/// metadata store and audit trail both need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DbTimestamp(DateTime<Utc>);

impl DbTimestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_rfc3339(s: &str) -> Result<Self, DbError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| DbError::TypeConversion(format!("invalid RFC3339 timestamp {s:?}: {e}")))
    }

    pub fn from_unix_millis(millis: i64) -> Self {
        Self(Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now))
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    pub fn unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    pub fn from_chrono(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn as_chrono(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Serialize for DbTimestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for DbTimestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_rfc3339(&s).map_err(serde::de::Error::custom)
    }
}

/// One bound value or one returned cell.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    Timestamp(DbTimestamp),
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Integer(v as i64)
    }
}
impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Integer(v)
    }
}
impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Real(v)
    }
}
impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}
impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}
impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Boolean(v)
    }
}
impl From<DbTimestamp> for DbValue {
    fn from(v: DbTimestamp) -> Self {
        DbValue::Timestamp(v)
    }
}
impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        DbValue::Blob(v)
    }
}
impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => DbValue::Null,
        }
    }
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// The string form used for cleaning/hashing; every cell round-trips
    /// through `TEXT` in the Row Cleaner regardless of its warehouse type.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DbValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// One returned row: ordered columns plus their values.
#[derive(Debug, Clone, Default)]
pub struct DbRow {
    pub columns: Vec<String>,
    pub values: Vec<DbValue>,
}

impl DbRow {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn get_raw(&self, idx: usize) -> Option<&DbValue> {
        self.values.get(idx)
    }

    pub fn get<T: FromDbValue>(&self, idx: usize) -> Result<T, DbError> {
        let value = self
            .values
            .get(idx)
            .ok_or_else(|| DbError::TypeConversion(format!("column index {idx} out of range")))?;
        T::from_db_value(value)
    }

    pub fn get_by_name<T: FromDbValue>(&self, name: &str) -> Result<T, DbError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DbError::TypeConversion(format!("no column named {name:?}")))?;
        self.get(idx)
    }
}

pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self, DbError>;
}

impl FromDbValue for i64 {
    fn from_db_value(value: &DbValue) -> Result<Self, DbError> {
        match value {
            DbValue::Integer(v) => Ok(*v),
            DbValue::Real(v) => Ok(*v as i64),
            DbValue::Null => Err(DbError::TypeConversion(
                "unexpected NULL for i64 column; use Option<i64> for nullable columns".into(),
            )),
            other => Err(DbError::TypeConversion(format!("cannot convert {other:?} to i64"))),
        }
    }
}

impl FromDbValue for i32 {
    fn from_db_value(value: &DbValue) -> Result<Self, DbError> {
        i64::from_db_value(value).map(|v| v as i32)
    }
}

impl FromDbValue for f64 {
    fn from_db_value(value: &DbValue) -> Result<Self, DbError> {
        match value {
            DbValue::Real(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v as f64),
            DbValue::Null => Err(DbError::TypeConversion(
                "unexpected NULL for f64 column; use Option<f64> for nullable columns".into(),
            )),
            other => Err(DbError::TypeConversion(format!("cannot convert {other:?} to f64"))),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self, DbError> {
        match value {
            DbValue::Text(v) => Ok(v.clone()),
            DbValue::Null => Err(DbError::TypeConversion(
                "unexpected NULL for text column; use Option<String> for nullable columns".into(),
            )),
            other => Err(DbError::TypeConversion(format!("cannot convert {other:?} to String"))),
        }
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: &DbValue) -> Result<Self, DbError> {
        match value {
            DbValue::Boolean(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v != 0),
            DbValue::Null => Err(DbError::TypeConversion(
                "unexpected NULL for bool column; use Option<bool> for nullable columns".into(),
            )),
            other => Err(DbError::TypeConversion(format!("cannot convert {other:?} to bool"))),
        }
    }
}

impl FromDbValue for DbTimestamp {
    fn from_db_value(value: &DbValue) -> Result<Self, DbError> {
        match value {
            DbValue::Timestamp(v) => Ok(*v),
            DbValue::Text(s) => DbTimestamp::from_rfc3339(s),
            DbValue::Integer(v) => Ok(DbTimestamp::from_unix_millis(*v)),
            DbValue::Null => Err(DbError::TypeConversion(
                "unexpected NULL for timestamp column; use Option<DbTimestamp> for nullable columns".into(),
            )),
            other => Err(DbError::TypeConversion(format!("cannot convert {other:?} to DbTimestamp"))),
        }
    }
}

impl FromDbValue for Vec<u8> {
    fn from_db_value(value: &DbValue) -> Result<Self, DbError> {
        match value {
            DbValue::Blob(v) => Ok(v.clone()),
            DbValue::Null => Err(DbError::TypeConversion(
                "unexpected NULL for blob column; use Option<Vec<u8>> for nullable columns".into(),
            )),
            other => Err(DbError::TypeConversion(format!("cannot convert {other:?} to Vec<u8>"))),
        }
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self, DbError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_db_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_conversion_requires_option() {
        let err = i64::from_db_value(&DbValue::Null).unwrap_err();
        assert!(matches!(err, DbError::TypeConversion(_)));
        assert_eq!(Option::<i64>::from_db_value(&DbValue::Null).unwrap(), None);
    }

    #[test]
    fn timestamp_round_trips_rfc3339() {
        let ts = DbTimestamp::now();
        let rt = DbTimestamp::from_rfc3339(&ts.to_rfc3339()).unwrap();
        assert_eq!(ts.unix_millis(), rt.unix_millis());
    }
}
