//! Per-type value codecs.
//!
//! A [`Codec`] is the validate / `to_storage` / `from_storage` triple for one
//! declared field type. Codecs are stateless apart from their configuration
//! flags and never see `Null`-handling policy: the field descriptor applies
//! choices, required and custom-validator checks around them.
//!
//! Round-trip law: for every value `v` accepted by [`Codec::validate`],
//! `from_storage(to_storage(v)) == v`. Temporal codecs normalize through a
//! full timestamp (dates anchor to midnight, times to 1970-01-01) and still
//! round-trip to the same date or time.

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::error::{MapperError, MapperResult};
use crate::types::{StorageValue, Value};

/// zstd level used for compressed blob-family fields.
const COMPRESSION_LEVEL: i32 = 3;

/// Declared type of a field, with its codec-level options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Boolean,
    Integer,
    Float,
    /// Opaque bytes, optionally stored zstd-compressed.
    Blob { compressed: bool },
    /// UTF-8 text; accepts raw bytes and decodes them.
    Text,
    /// Arbitrary [`Value`] graph encoded as `MsgPack`, layered on the blob codec.
    Pickle { compressed: bool },
    /// JSON document, layered on the blob codec.
    Json { compressed: bool },
    /// Auto-generated string or integer key identifier.
    Identifier,
    DateTime,
    Date,
    Time,
}

impl Codec {
    /// Type name used in error messages and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Boolean => "Boolean",
            Codec::Integer => "Integer",
            Codec::Float => "Float",
            Codec::Blob { .. } => "Blob",
            Codec::Text => "Text",
            Codec::Pickle { .. } => "Pickle",
            Codec::Json { .. } => "Json",
            Codec::Identifier => "Identifier",
            Codec::DateTime => "DateTime",
            Codec::Date => "Date",
            Codec::Time => "Time",
        }
    }

    /// Whether a field of this type may contribute the key identifier.
    #[must_use]
    pub fn is_identifier_eligible(&self) -> bool {
        matches!(self, Codec::Identifier | Codec::Integer | Codec::Text)
    }

    /// Whether this codec belongs to the timestamp family.
    #[must_use]
    pub fn is_temporal(&self) -> bool {
        matches!(self, Codec::DateTime | Codec::Date | Codec::Time)
    }

    /// Whether values are stored compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        matches!(
            self,
            Codec::Blob { compressed: true }
                | Codec::Pickle { compressed: true }
                | Codec::Json { compressed: true }
        )
    }

    /// Type-specific validation of a non-null value.
    ///
    /// Returns the value coerced to its canonical rich form (integers widened
    /// to floats, UTF-8 bytes decoded to text, JSON values reduced to the
    /// variants a JSON document can hold).
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::TypeConstraint`] when the value has the wrong
    /// variant, or when text bytes are not valid UTF-8, and
    /// [`MapperError::Serialization`] when a Json field is given a value with
    /// no JSON form.
    pub fn validate(&self, field: &str, value: Value) -> MapperResult<Value> {
        match (self, value) {
            (Codec::Boolean, v @ Value::Bool(_))
            | (Codec::Integer, v @ Value::Int(_))
            | (Codec::Float, v @ Value::Float(_))
            | (Codec::Blob { .. }, v @ Value::Bytes(_))
            | (Codec::Text, v @ Value::String(_))
            | (Codec::Identifier, v @ (Value::String(_) | Value::Int(_)))
            | (Codec::DateTime, v @ Value::DateTime(_))
            | (Codec::Date, v @ Value::Date(_))
            | (Codec::Time, v @ Value::Time(_))
            | (Codec::Pickle { .. }, v) => Ok(v),
            (Codec::Json { .. }, v) => to_json(field, &v).map(Value::from),
            #[allow(clippy::cast_precision_loss)]
            (Codec::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (Codec::Text, Value::Bytes(bytes)) => String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|_| MapperError::type_constraint(field, "utf-8 text", "invalid utf-8 bytes")),
            (codec, other) => Err(MapperError::type_constraint(
                field,
                codec.expected(),
                other.type_name(),
            )),
        }
    }

    /// Converts a validated rich value into its storage form.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::Serialization`] when a structured value cannot be
    /// encoded, [`MapperError::Compression`] when compression fails, and
    /// [`MapperError::TypeConstraint`] when handed a value `validate` would reject.
    pub fn to_storage(&self, field: &str, value: &Value) -> MapperResult<StorageValue> {
        if value.is_null() {
            return Ok(StorageValue::Null);
        }
        match (self, value) {
            (Codec::Boolean, Value::Bool(b)) => Ok(StorageValue::Bool(*b)),
            (Codec::Integer | Codec::Identifier, Value::Int(i)) => Ok(StorageValue::Int(*i)),
            (Codec::Float, Value::Float(f)) => Ok(StorageValue::Float(*f)),
            (Codec::Text | Codec::Identifier, Value::String(s)) => {
                Ok(StorageValue::String(s.clone()))
            }
            (Codec::Blob { compressed }, Value::Bytes(bytes)) => {
                blob_to_storage(field, *compressed, bytes.clone())
            }
            (Codec::Pickle { compressed }, v) => {
                let encoded = rmp_serde::to_vec_named(v).map_err(|e| MapperError::Serialization {
                    field: field.to_string(),
                    reason: e.to_string(),
                })?;
                blob_to_storage(field, *compressed, encoded)
            }
            (Codec::Json { compressed }, v) => {
                let document = to_json(field, v)?;
                let encoded =
                    serde_json::to_vec(&document).map_err(|e| MapperError::Serialization {
                        field: field.to_string(),
                        reason: e.to_string(),
                    })?;
                blob_to_storage(field, *compressed, encoded)
            }
            (Codec::DateTime, Value::DateTime(dt)) => Ok(StorageValue::Timestamp(*dt)),
            (Codec::Date, Value::Date(d)) => Ok(StorageValue::Timestamp(d.and_time(NaiveTime::MIN))),
            (Codec::Time, Value::Time(t)) => Ok(StorageValue::Timestamp(
                DateTime::<Utc>::UNIX_EPOCH.date_naive().and_time(*t),
            )),
            (codec, other) => Err(MapperError::type_constraint(
                field,
                codec.expected(),
                other.type_name(),
            )),
        }
    }

    /// Converts a stored value back into its rich form.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::Deserialization`] when stored bytes do not parse,
    /// [`MapperError::Compression`] when decompression fails, and
    /// [`MapperError::TypeConstraint`] when the stored variant does not belong
    /// to this codec.
    pub fn from_storage(&self, field: &str, stored: &StorageValue) -> MapperResult<Value> {
        if stored.is_null() {
            return Ok(Value::Null);
        }
        match (self, stored) {
            (Codec::Boolean, StorageValue::Bool(b)) => Ok(Value::Bool(*b)),
            (Codec::Integer | Codec::Identifier, StorageValue::Int(i)) => Ok(Value::Int(*i)),
            (Codec::Float, StorageValue::Float(f)) => Ok(Value::Float(*f)),
            #[allow(clippy::cast_precision_loss)]
            (Codec::Float, StorageValue::Int(i)) => Ok(Value::Float(*i as f64)),
            (Codec::Text | Codec::Identifier, StorageValue::String(s)) => {
                Ok(Value::String(s.clone()))
            }
            (Codec::Text, StorageValue::Bytes(bytes)) => String::from_utf8(bytes.clone())
                .map(Value::String)
                .map_err(|e| MapperError::Deserialization {
                    field: field.to_string(),
                    reason: e.to_string(),
                }),
            (Codec::Blob { compressed }, StorageValue::Bytes(bytes)) => {
                blob_from_storage(field, *compressed, bytes).map(Value::Bytes)
            }
            (Codec::Pickle { compressed }, StorageValue::Bytes(bytes)) => {
                let raw = blob_from_storage(field, *compressed, bytes)?;
                rmp_serde::from_slice(&raw).map_err(|e| MapperError::Deserialization {
                    field: field.to_string(),
                    reason: e.to_string(),
                })
            }
            (Codec::Json { compressed }, StorageValue::Bytes(bytes)) => {
                let raw = blob_from_storage(field, *compressed, bytes)?;
                serde_json::from_slice::<serde_json::Value>(&raw)
                    .map(Value::from)
                    .map_err(|e| MapperError::Deserialization {
                        field: field.to_string(),
                        reason: e.to_string(),
                    })
            }
            (Codec::DateTime, StorageValue::Timestamp(ts)) => Ok(Value::DateTime(*ts)),
            (Codec::Date, StorageValue::Timestamp(ts)) => Ok(Value::Date(ts.date())),
            (Codec::Time, StorageValue::Timestamp(ts)) => Ok(Value::Time(ts.time())),
            (codec, other) => Err(MapperError::type_constraint(
                field,
                format!("stored {}", codec.expected()),
                other.type_name(),
            )),
        }
    }

    /// The rich value an auto-now field takes at instant `now`.
    ///
    /// Returns `None` for codecs outside the timestamp family.
    #[must_use]
    pub fn now_value(&self, now: NaiveDateTime) -> Option<Value> {
        match self {
            Codec::DateTime => Some(Value::DateTime(now)),
            Codec::Date => Some(Value::Date(now.date())),
            Codec::Time => Some(Value::Time(now.time())),
            _ => None,
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            Codec::Boolean => "bool",
            Codec::Integer => "int",
            Codec::Float => "int or float",
            Codec::Blob { .. } | Codec::Pickle { .. } | Codec::Json { .. } => "bytes",
            Codec::Text => "string or utf-8 bytes",
            Codec::Identifier => "string or int",
            Codec::DateTime => "datetime",
            Codec::Date => "date",
            Codec::Time => "time",
        }
    }
}

/// Generates a fresh identifier: a random 128-bit value as 32 lowercase hex chars.
#[must_use]
pub fn generate_identifier() -> String {
    Uuid::new_v4().simple().to_string()
}

fn blob_to_storage(field: &str, compressed: bool, bytes: Vec<u8>) -> MapperResult<StorageValue> {
    if !compressed {
        return Ok(StorageValue::Bytes(bytes));
    }
    zstd::stream::encode_all(bytes.as_slice(), COMPRESSION_LEVEL)
        .map(StorageValue::Bytes)
        .map_err(|e| MapperError::Compression {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

fn blob_from_storage(field: &str, compressed: bool, bytes: &[u8]) -> MapperResult<Vec<u8>> {
    if !compressed {
        return Ok(bytes.to_vec());
    }
    zstd::stream::decode_all(bytes).map_err(|e| MapperError::Compression {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// Renders a rich value as a JSON document.
fn to_json(field: &str, value: &Value) -> MapperResult<serde_json::Value> {
    let unsupported = |kind: &str| MapperError::Serialization {
        field: field.to_string(),
        reason: format!("{kind} values have no JSON representation"),
    };
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| unsupported("non-finite float"))?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| to_json(field, item))
                .collect::<MapperResult<_>>()?,
        ),
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| -> MapperResult<(String, serde_json::Value)> {
                    Ok((k.clone(), to_json(field, v)?))
                })
                .collect::<MapperResult<_>>()?,
        ),
        other @ (Value::Bytes(_) | Value::DateTime(_) | Value::Date(_) | Value::Time(_)) => {
            return Err(unsupported(other.type_name()));
        }
    })
}
