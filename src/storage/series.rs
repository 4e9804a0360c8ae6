//! Series identity
//!
//! A series names one logical entity: `(subject, entityValues)`. The binder
//! marshals the pair into a canonical length-prefixed buffer and hashes it to
//! a stable 64-bit `SeriesId`. Equal inputs always bind to the same id; the
//! id is used for co-location only, so readers re-check the entity values
//! carried in the buffer rather than trusting the hash.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::Value;
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

/// Seed for the series identity hash. Changing it invalidates stored data.
const SERIES_HASH_SEED: u64 = 0x5354_5241_5441_0001;

const ENTRY_STR: u8 = 0x01;
const ENTRY_INT64: u8 = 0x02;
const ENTRY_FLOAT64: u8 = 0x03;
const ENTRY_BINARY: u8 = 0x04;

/// Stable 64-bit series identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct SeriesId(pub u64);

impl std::fmt::Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A bound series: subject, entity values, canonical buffer, and id.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    subject: String,
    entity_values: Vec<Value>,
    buffer: Vec<u8>,
    id: SeriesId,
}

impl Series {
    /// Bind `(subject, entity_values)` to a series identity.
    ///
    /// Entity values must be concrete scalars; `Null` and array values
    /// cannot name an entity and fail with `BadSeries`.
    pub fn bind(subject: impl Into<String>, entity_values: Vec<Value>) -> StorageResult<Self> {
        let subject = subject.into();
        let buffer = marshal(&subject, &entity_values)?;
        let id = SeriesId(XxHash64::oneshot(SERIES_HASH_SEED, &buffer));
        Ok(Self {
            subject,
            entity_values,
            buffer,
            id,
        })
    }

    pub fn id(&self) -> SeriesId {
        self.id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn entity_values(&self) -> &[Value] {
        &self.entity_values
    }

    /// The canonical marshalling, reused as `IndexDocument.entity_values`.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Invert a canonical buffer back into `(subject, entity_values)`.
    pub fn unmarshal(buffer: &[u8]) -> StorageResult<(String, Vec<Value>)> {
        let mut cursor = 0usize;
        let (tag, bytes) = read_entry(buffer, &mut cursor)?;
        if tag != ENTRY_STR {
            return Err(StorageError::BadSeries(
                "series buffer does not start with a subject".to_string(),
            ));
        }
        let subject = String::from_utf8(bytes.to_vec())
            .map_err(|e| StorageError::BadSeries(format!("subject is not UTF-8: {}", e)))?;

        let mut values = Vec::new();
        while cursor < buffer.len() {
            let (tag, bytes) = read_entry(buffer, &mut cursor)?;
            let value = match tag {
                ENTRY_STR => Value::Str(String::from_utf8(bytes.to_vec()).map_err(|e| {
                    StorageError::BadSeries(format!("entity value is not UTF-8: {}", e))
                })?),
                ENTRY_INT64 => Value::Int64(i64::from_be_bytes(bytes.try_into().map_err(
                    |_| StorageError::BadSeries("entity int64 is not 8 bytes".to_string()),
                )?)),
                ENTRY_FLOAT64 => Value::Float64(f64::from_be_bytes(bytes.try_into().map_err(
                    |_| StorageError::BadSeries("entity float64 is not 8 bytes".to_string()),
                )?)),
                ENTRY_BINARY => Value::Binary(bytes.to_vec()),
                other => {
                    return Err(StorageError::BadSeries(format!(
                        "unknown entity entry tag {:#04x}",
                        other
                    )));
                }
            };
            values.push(value);
        }
        Ok((subject, values))
    }
}

/// Length-prefixed concatenation: subject entry first, then one entry per
/// entity value. Entry layout: type byte, u32-LE length, payload bytes.
fn marshal(subject: &str, entity_values: &[Value]) -> StorageResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(16 + subject.len() + entity_values.len() * 16);
    write_entry(&mut buf, ENTRY_STR, subject.as_bytes());
    for value in entity_values {
        match value {
            Value::Str(s) => write_entry(&mut buf, ENTRY_STR, s.as_bytes()),
            Value::Int64(v) => write_entry(&mut buf, ENTRY_INT64, &v.to_be_bytes()),
            Value::Float64(v) => write_entry(&mut buf, ENTRY_FLOAT64, &v.to_be_bytes()),
            Value::Binary(b) => write_entry(&mut buf, ENTRY_BINARY, b),
            Value::Int64Arr(_) | Value::StrArr(_) => {
                return Err(StorageError::BadSeries(
                    "array values cannot name an entity".to_string(),
                ));
            }
            Value::Null => {
                return Err(StorageError::BadSeries(
                    "null values cannot name an entity".to_string(),
                ));
            }
        }
    }
    Ok(buf)
}

fn write_entry(buf: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
    buf.push(tag);
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_entry<'a>(buf: &'a [u8], cursor: &mut usize) -> StorageResult<(u8, &'a [u8])> {
    if *cursor + 5 > buf.len() {
        return Err(StorageError::BadSeries(
            "truncated series buffer".to_string(),
        ));
    }
    let tag = buf[*cursor];
    let len = u32::from_le_bytes(buf[*cursor + 1..*cursor + 5].try_into().unwrap()) as usize;
    *cursor += 5;
    if *cursor + len > buf.len() {
        return Err(StorageError::BadSeries(
            "truncated series entry".to_string(),
        ));
    }
    let bytes = &buf[*cursor..*cursor + len];
    *cursor += len;
    Ok((tag, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_is_deterministic() {
        let a = Series::bind(
            "cpu_usage",
            vec![Value::Str("svc1".into()), Value::Str("host1".into())],
        )
        .unwrap();
        let b = Series::bind(
            "cpu_usage",
            vec![Value::Str("svc1".into()), Value::Str("host1".into())],
        )
        .unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.buffer(), b.buffer());
    }

    #[test]
    fn test_distinct_entities_bind_distinct_ids() {
        let a = Series::bind("cpu_usage", vec![Value::Str("svc1".into())]).unwrap();
        let b = Series::bind("cpu_usage", vec![Value::Str("svc2".into())]).unwrap();
        let c = Series::bind("mem_usage", vec![Value::Str("svc1".into())]).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_length_prefix_prevents_concatenation_ambiguity() {
        let a = Series::bind("m", vec![Value::Str("ab".into()), Value::Str("c".into())]).unwrap();
        let b = Series::bind("m", vec![Value::Str("a".into()), Value::Str("bc".into())]).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_unmarshal_round_trip() {
        let values = vec![
            Value::Str("svc1".into()),
            Value::Int64(7),
            Value::Binary(vec![0xde, 0xad]),
        ];
        let series = Series::bind("latency", values.clone()).unwrap();
        let (subject, restored) = Series::unmarshal(series.buffer()).unwrap();
        assert_eq!(subject, "latency");
        assert_eq!(restored, values);
    }

    #[test]
    fn test_bind_rejects_null_and_arrays() {
        let err = Series::bind("m", vec![Value::Null]).unwrap_err();
        assert!(matches!(err, StorageError::BadSeries(_)));

        let err = Series::bind("m", vec![Value::Int64Arr(vec![1])]).unwrap_err();
        assert!(matches!(err, StorageError::BadSeries(_)));
    }

    #[test]
    fn test_unmarshal_rejects_truncated_buffer() {
        let series = Series::bind("m", vec![Value::Str("x".into())]).unwrap();
        let buf = &series.buffer()[..series.buffer().len() - 1];
        assert!(Series::unmarshal(buf).is_err());
    }
}
