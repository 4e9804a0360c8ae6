//! Core data types for the strata storage engine
//!
//! This module defines the types shared across the write and read paths:
//! - `Value`: a typed tag or field value as supplied by clients
//! - `ValueType`: the schema-declared type of a tag or field
//! - `NameValue` / `NameValues`: canonically encoded cells and column groups
//! - `TimeRange`: a half-open time interval in nanoseconds
//!
//! Encoding is canonical and byte-ordered: integers and floats encode
//! big-endian so encoded values sort the same way the typed values do.

use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Schema-declared type of a tag or field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int64,
    Float64,
    Str,
    BinaryData,
    Int64Arr,
    StrArr,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValueType::Int64 => "int64",
            ValueType::Float64 => "float64",
            ValueType::Str => "str",
            ValueType::BinaryData => "binary_data",
            ValueType::Int64Arr => "int64_arr",
            ValueType::StrArr => "str_arr",
        };
        write!(f, "{}", s)
    }
}

/// A typed tag or field value as it arrives at the engine boundary.
///
/// `Null` stands in for absent cells; short writes are padded with it so
/// column vectors stay aligned with the schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Int64(i64),
    Float64(f64),
    Str(String),
    Binary(Vec<u8>),
    Int64Arr(Vec<i64>),
    StrArr(Vec<String>),
    Null,
}

impl Value {
    /// The value type this variant encodes as, or `None` for `Null`.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Int64(_) => Some(ValueType::Int64),
            Value::Float64(_) => Some(ValueType::Float64),
            Value::Str(_) => Some(ValueType::Str),
            Value::Binary(_) => Some(ValueType::BinaryData),
            Value::Int64Arr(_) => Some(ValueType::Int64Arr),
            Value::StrArr(_) => Some(ValueType::StrArr),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// One canonically encoded cell: a named value with its declared type.
///
/// Scalars live in `value`; array types keep one byte slice per element in
/// `value_arr`. A null cell has neither.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NameValue {
    pub name: String,
    pub value_type: ValueType,
    pub value: Option<Vec<u8>>,
    pub value_arr: Option<Vec<Vec<u8>>>,
}

impl NameValue {
    /// A null cell for the given name and declared type.
    pub fn null(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            value: None,
            value_arr: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none() && self.value_arr.is_none()
    }
}

/// One encoded column group for one row: a tag family, or the field set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NameValues {
    pub name: String,
    pub values: Vec<NameValue>,
}

/// Encode a typed value against its schema-declared type.
///
/// Canonical forms: Int64 is 8-byte big-endian two's-complement, Float64 is
/// 8-byte IEEE-754 big-endian, Str is UTF-8 as-is, BinaryData is a cloned
/// copy of the input bytes. Arrays encode per-element into `value_arr`.
/// A `Null` input produces a null cell of the declared type; any other
/// variant mismatch fails with `SchemaMismatch`.
pub fn encode_value(name: &str, declared: ValueType, value: &Value) -> StorageResult<NameValue> {
    let mut nv = NameValue::null(name, declared);
    match (declared, value) {
        (_, Value::Null) => {}
        (ValueType::Int64, Value::Int64(v)) => nv.value = Some(v.to_be_bytes().to_vec()),
        (ValueType::Float64, Value::Float64(v)) => nv.value = Some(v.to_be_bytes().to_vec()),
        (ValueType::Str, Value::Str(v)) => nv.value = Some(v.as_bytes().to_vec()),
        (ValueType::BinaryData, Value::Binary(v)) => nv.value = Some(v.clone()),
        (ValueType::Int64Arr, Value::Int64Arr(vs)) => {
            nv.value_arr = Some(vs.iter().map(|v| v.to_be_bytes().to_vec()).collect());
        }
        (ValueType::StrArr, Value::StrArr(vs)) => {
            nv.value_arr = Some(vs.iter().map(|v| v.as_bytes().to_vec()).collect());
        }
        (declared, value) => {
            return Err(StorageError::SchemaMismatch(format!(
                "cannot encode {:?} as {} for \"{}\"",
                value.value_type(),
                declared,
                name
            )));
        }
    }
    Ok(nv)
}

/// Decode a cell back into its typed value. Inverse of [`encode_value`].
pub fn decode_value(nv: &NameValue) -> StorageResult<Value> {
    if nv.is_null() {
        return Ok(Value::Null);
    }
    let scalar = |nv: &NameValue| -> StorageResult<Vec<u8>> {
        nv.value.clone().ok_or_else(|| {
            StorageError::SchemaMismatch(format!("scalar cell \"{}\" has no value", nv.name))
        })
    };
    match nv.value_type {
        ValueType::Int64 => {
            let b = scalar(nv)?;
            Ok(Value::Int64(i64::from_be_bytes(fixed8(&nv.name, &b)?)))
        }
        ValueType::Float64 => {
            let b = scalar(nv)?;
            Ok(Value::Float64(f64::from_be_bytes(fixed8(&nv.name, &b)?)))
        }
        ValueType::Str => {
            let b = scalar(nv)?;
            let s = String::from_utf8(b).map_err(|e| {
                StorageError::SchemaMismatch(format!("cell \"{}\" is not UTF-8: {}", nv.name, e))
            })?;
            Ok(Value::Str(s))
        }
        ValueType::BinaryData => Ok(Value::Binary(scalar(nv)?)),
        ValueType::Int64Arr => {
            let arr = nv.value_arr.as_deref().unwrap_or(&[]);
            let mut out = Vec::with_capacity(arr.len());
            for b in arr {
                out.push(i64::from_be_bytes(fixed8(&nv.name, b)?));
            }
            Ok(Value::Int64Arr(out))
        }
        ValueType::StrArr => {
            let arr = nv.value_arr.as_deref().unwrap_or(&[]);
            let mut out = Vec::with_capacity(arr.len());
            for b in arr {
                out.push(String::from_utf8(b.clone()).map_err(|e| {
                    StorageError::SchemaMismatch(format!(
                        "cell \"{}\" element is not UTF-8: {}",
                        nv.name, e
                    ))
                })?);
            }
            Ok(Value::StrArr(out))
        }
    }
}

fn fixed8(name: &str, b: &[u8]) -> StorageResult<[u8; 8]> {
    b.try_into().map_err(|_| {
        StorageError::SchemaMismatch(format!(
            "cell \"{}\" has {} bytes, expected 8",
            name,
            b.len()
        ))
    })
}

/// Validate a write timestamp against the engine's accepted window.
///
/// The extremes of `i64` are reserved as sentinels for open-ended range
/// arithmetic and never accepted as row timestamps.
pub fn check_timestamp(ts: i64) -> StorageResult<()> {
    if ts == i64::MIN || ts == i64::MAX {
        return Err(StorageError::BadTimestamp(ts));
    }
    Ok(())
}

/// Half-open time interval `[start, end)` in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive), nanoseconds.
    pub start: i64,
    /// End timestamp (exclusive), nanoseconds.
    pub end: i64,
}

impl TimeRange {
    /// Create a new time range, returning `None` if `start >= end`.
    pub fn try_new(start: i64, end: i64) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Create a new time range.
    ///
    /// # Panics
    /// Panics if `start >= end`.
    pub fn new(start: i64, end: i64) -> Self {
        assert!(start < end, "TimeRange: start must be less than end");
        Self { start, end }
    }

    /// The widest representable range.
    pub fn all() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Overlap check against inclusive bounds, as stored in block metadata.
    pub fn overlaps_bounds(&self, min: i64, max: i64) -> bool {
        min < self.end && max >= self.start
    }

    pub fn intersection(&self, other: &TimeRange) -> Option<Self> {
        Self::try_new(self.start.max(other.start), self.end.min(other.end))
    }

    pub fn duration_nanos(&self) -> i64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let cases = vec![
            (ValueType::Int64, Value::Int64(-42)),
            (ValueType::Int64, Value::Int64(i64::MAX)),
            (ValueType::Float64, Value::Float64(3.5)),
            (ValueType::Str, Value::Str("svc1".to_string())),
            (ValueType::BinaryData, Value::Binary(vec![0, 1, 2, 255])),
            (ValueType::Int64Arr, Value::Int64Arr(vec![1, -2, 3])),
            (
                ValueType::StrArr,
                Value::StrArr(vec!["a".to_string(), "b".to_string()]),
            ),
            (ValueType::Str, Value::Null),
            (ValueType::Int64Arr, Value::Null),
        ];

        for (ty, value) in cases {
            let nv = encode_value("t", ty, &value).unwrap();
            assert_eq!(decode_value(&nv).unwrap(), value, "type {:?}", ty);
        }
    }

    #[test]
    fn test_int64_encoding_is_big_endian() {
        let nv = encode_value("n", ValueType::Int64, &Value::Int64(1)).unwrap();
        assert_eq!(nv.value.unwrap(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_encode_type_mismatch() {
        let err = encode_value("n", ValueType::Int64, &Value::Str("x".into())).unwrap_err();
        assert!(matches!(err, StorageError::SchemaMismatch(_)));

        let err = encode_value("n", ValueType::StrArr, &Value::Int64(1)).unwrap_err();
        assert!(matches!(err, StorageError::SchemaMismatch(_)));
    }

    #[test]
    fn test_binary_encode_clones() {
        let input = vec![1u8, 2, 3];
        let nv = encode_value("b", ValueType::BinaryData, &Value::Binary(input.clone())).unwrap();
        assert_eq!(nv.value.as_deref(), Some(input.as_slice()));
    }

    #[test]
    fn test_null_cell() {
        let nv = NameValue::null("n", ValueType::Str);
        assert!(nv.is_null());
        assert_eq!(decode_value(&nv).unwrap(), Value::Null);
    }

    #[test]
    fn test_check_timestamp() {
        assert!(check_timestamp(0).is_ok());
        assert!(check_timestamp(-1).is_ok());
        assert!(check_timestamp(i64::MIN).is_err());
        assert!(check_timestamp(i64::MAX).is_err());
    }

    #[test]
    fn test_time_range_contains() {
        let range = TimeRange::new(1000, 2000);
        assert!(!range.contains(999));
        assert!(range.contains(1000));
        assert!(range.contains(1999));
        assert!(!range.contains(2000));
    }

    #[test]
    fn test_time_range_overlaps() {
        let range = TimeRange::new(1000, 2000);
        assert!(range.overlaps(&TimeRange::new(1500, 2500)));
        assert!(!range.overlaps(&TimeRange::new(2000, 3000)));
        assert!(range.overlaps(&TimeRange::new(500, 1500)));
        assert!(range.overlaps_bounds(1999, 2100));
        assert!(!range.overlaps_bounds(2000, 2100));
    }

    #[test]
    fn test_time_range_intersection() {
        let a = TimeRange::new(0, 100);
        let b = TimeRange::new(50, 200);
        assert_eq!(a.intersection(&b), Some(TimeRange::new(50, 100)));
        assert_eq!(a.intersection(&TimeRange::new(100, 200)), None);
    }
}
