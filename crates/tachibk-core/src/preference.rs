//! Preference value codec.
//!
//! Backups store every preference as a `PreferenceValue { type, payload }`
//! pair where `payload` is itself the encoding of a single-field message
//! (field 1) whose type depends on `type`. The protobuf runtime only sees an
//! opaque `bytes` field, so this module reads and writes those payloads by
//! hand and translates them to and from readable JSON values.
//!
//! ```
//! use tachibk_core::preference::{PreferenceData, PreferenceKind};
//!
//! let payload = PreferenceData::String("hi".into()).encode();
//! assert_eq!(payload, [0x0A, 0x02, b'h', b'i']);
//!
//! let value = PreferenceData::decode(PreferenceKind::String, &payload)?;
//! assert_eq!(value, Some(PreferenceData::String("hi".into())));
//! # Ok::<(), tachibk_core::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::wire::{
    decode_varint, put_varint, split_tag, WireType, I32_FIELD_ONE, LEN_FIELD_ONE,
    VARINT_FIELD_ONE,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::{Buf, BufMut};
use serde_json::Value;
use std::fmt;
use tracing::trace;

/// JSON key of the dotted type name inside a preference record
pub const TYPE_KEY: &str = "type";

/// JSON key of the payload inside a preference record
pub const PAYLOAD_KEY: &str = "payload";

/// JSON strings standing in for floats that JSON numbers cannot hold
const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// Suffix shared by every preference value class name
const TYPE_SUFFIX: &str = "PreferenceValue";

/// Kind of value carried by a preference record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKind {
    /// `bool`
    Boolean,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Single precision float
    Float,
    /// UTF-8 string
    String,
    /// Ordered set of strings
    StringSet,
    /// Anything else; never converted
    Unknown,
}

impl PreferenceKind {
    /// Resolves a dotted type name such as
    /// `eu.kanade.tachiyomi.data.backup.models.IntPreferenceValue`.
    pub fn from_type_name(type_name: &str) -> Self {
        let last = type_name.rsplit('.').next().unwrap_or(type_name);
        let short = last.strip_suffix(TYPE_SUFFIX).unwrap_or(last);
        match short {
            "Boolean" => Self::Boolean,
            "Int" => Self::Int,
            "Long" => Self::Long,
            "Float" => Self::Float,
            "String" => Self::String,
            "StringSet" => Self::StringSet,
            _ => Self::Unknown,
        }
    }

    /// Short name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::Int => "Int",
            Self::Long => "Long",
            Self::Float => "Float",
            Self::String => "String",
            Self::StringSet => "StringSet",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PreferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded preference value
#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceData {
    /// Boolean value
    Boolean(bool),
    /// Int value
    Int(i32),
    /// Long value
    Long(i64),
    /// Float value
    Float(f32),
    /// String value
    String(String),
    /// String set, in stored order
    StringSet(Vec<String>),
}

impl PreferenceData {
    /// Kind of this value
    pub fn kind(&self) -> PreferenceKind {
        match self {
            Self::Boolean(_) => PreferenceKind::Boolean,
            Self::Int(_) => PreferenceKind::Int,
            Self::Long(_) => PreferenceKind::Long,
            Self::Float(_) => PreferenceKind::Float,
            Self::String(_) => PreferenceKind::String,
            Self::StringSet(_) => PreferenceKind::StringSet,
        }
    }

    /// Value protobuf assumes when the field is absent from the payload
    pub fn default_for(kind: PreferenceKind) -> Option<Self> {
        match kind {
            PreferenceKind::Boolean => Some(Self::Boolean(false)),
            PreferenceKind::Int => Some(Self::Int(0)),
            PreferenceKind::Long => Some(Self::Long(0)),
            PreferenceKind::Float => Some(Self::Float(0.0)),
            PreferenceKind::String => Some(Self::String(String::new())),
            PreferenceKind::StringSet => Some(Self::StringSet(Vec::new())),
            PreferenceKind::Unknown => None,
        }
    }

    /// Encodes the value as the body of a single-field message.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Boolean(value) => {
                buf.put_u8(VARINT_FIELD_ONE);
                put_varint(&mut buf, u64::from(*value));
            }
            // Negative values sign-extend to ten bytes, as protobuf int32/int64 do
            Self::Int(value) => {
                buf.put_u8(VARINT_FIELD_ONE);
                put_varint(&mut buf, i64::from(*value) as u64);
            }
            Self::Long(value) => {
                buf.put_u8(VARINT_FIELD_ONE);
                put_varint(&mut buf, *value as u64);
            }
            Self::Float(value) => {
                buf.put_u8(I32_FIELD_ONE);
                buf.put_f32_le(*value);
            }
            Self::String(value) => put_len_delimited(&mut buf, value),
            Self::StringSet(values) => {
                for value in values {
                    put_len_delimited(&mut buf, value);
                }
            }
        }
        buf
    }

    /// Decodes a payload of the given kind.
    ///
    /// Returns `Ok(None)` for [`PreferenceKind::Unknown`]. An empty payload
    /// decodes to the kind's default value.
    pub fn decode(kind: PreferenceKind, payload: &[u8]) -> Result<Option<Self>> {
        if payload.is_empty() {
            return Ok(Self::default_for(kind));
        }

        let value = match kind {
            PreferenceKind::Boolean => Self::Boolean(read_varint_field(payload)? != 0),
            PreferenceKind::Int => Self::Int(read_varint_field(payload)? as i32),
            PreferenceKind::Long => Self::Long(read_varint_field(payload)? as i64),
            PreferenceKind::Float => {
                let mut rest = expect_field(payload, WireType::I32)?;
                if rest.remaining() < 4 {
                    return Err(Error::invalid_wire_format(
                        1,
                        format!("float needs 4 bytes, have {}", rest.remaining()),
                    ));
                }
                Self::Float(rest.get_f32_le())
            }
            PreferenceKind::String => {
                let (value, _) = read_len_delimited(payload, 0)?;
                Self::String(value)
            }
            PreferenceKind::StringSet => {
                let mut values = Vec::new();
                let mut offset = 0;
                while offset < payload.len() {
                    let (value, consumed) = read_len_delimited(&payload[offset..], offset)?;
                    values.push(value);
                    offset += consumed;
                }
                Self::StringSet(values)
            }
            PreferenceKind::Unknown => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Reads a readable JSON value of the given kind.
    ///
    /// Returns `Ok(None)` for [`PreferenceKind::Unknown`].
    pub fn from_json(kind: PreferenceKind, value: &Value) -> Result<Option<Self>> {
        let mismatch = |expected: &str| {
            Error::invalid_preference(
                kind.as_str(),
                format!("expected {expected}, got {value}"),
            )
        };

        let data = match kind {
            PreferenceKind::Boolean => {
                Self::Boolean(value.as_bool().ok_or_else(|| mismatch("a boolean"))?)
            }
            PreferenceKind::Int => {
                let wide = json_integer(value).ok_or_else(|| mismatch("an integer"))?;
                let narrow = i32::try_from(wide).map_err(|_| mismatch("a 32-bit integer"))?;
                Self::Int(narrow)
            }
            PreferenceKind::Long => {
                Self::Long(json_integer(value).ok_or_else(|| mismatch("an integer"))?)
            }
            PreferenceKind::Float => {
                let float = match value {
                    Value::String(text) => non_finite_float(text),
                    _ => value.as_f64().map(|number| number as f32),
                };
                Self::Float(float.ok_or_else(|| mismatch("a number"))?)
            }
            PreferenceKind::String => {
                let text = value.as_str().ok_or_else(|| mismatch("a string"))?;
                Self::String(text.to_owned())
            }
            PreferenceKind::StringSet => {
                let items = value
                    .as_array()
                    .ok_or_else(|| mismatch("an array of strings"))?;
                let values = items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_owned)
                            .ok_or_else(|| mismatch("an array of strings"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::StringSet(values)
            }
            PreferenceKind::Unknown => return Ok(None),
        };
        Ok(Some(data))
    }

    /// Readable JSON form of the value
    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean(value) => Value::from(*value),
            Self::Int(value) => Value::from(*value),
            Self::Long(value) => Value::from(*value),
            Self::Float(value) if value.is_nan() => Value::from(NAN),
            Self::Float(value) if value.is_infinite() => {
                Value::from(if *value > 0.0 { INFINITY } else { NEG_INFINITY })
            }
            Self::Float(value) => Value::from(f64::from(*value)),
            Self::String(value) => Value::from(value.as_str()),
            Self::StringSet(values) => Value::from(values.clone()),
        }
    }
}

/// Encodes a readable JSON value of the given kind into payload bytes.
///
/// Unknown kinds yield an empty payload, which callers must treat as
/// "not convertible" rather than as a valid encoding.
pub fn encode_value(kind: PreferenceKind, value: &Value) -> Result<Vec<u8>> {
    Ok(PreferenceData::from_json(kind, value)?
        .map(|data| data.encode())
        .unwrap_or_default())
}

/// Decodes payload bytes into a readable JSON value; `None` for unknown kinds.
pub fn decode_value(kind: PreferenceKind, payload: &[u8]) -> Result<Option<Value>> {
    Ok(PreferenceData::decode(kind, payload)?.map(|data| data.to_json()))
}

/// Replaces the base64 payload of a `{type, payload}` record with its readable value.
///
/// Returns `Ok(false)` when the record's kind is unknown and it was left untouched.
pub fn make_readable(record: &mut Value) -> Result<bool> {
    let kind = record_kind(record)?;
    if kind == PreferenceKind::Unknown {
        return Ok(false);
    }

    let payload = match record.get(PAYLOAD_KEY) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(encoded)) => BASE64.decode(encoded)?,
        Some(other) => {
            return Err(Error::invalid_preference(
                kind.as_str(),
                format!("payload is not base64 text: {other}"),
            ))
        }
    };

    let readable = decode_value(kind, &payload)?.unwrap_or(Value::Null);
    trace!(%kind, %readable, "decoded preference payload");
    record[PAYLOAD_KEY] = readable;
    Ok(true)
}

/// Replaces the readable payload of a `{type, payload}` record with base64 bytes.
///
/// Returns `Ok(false)` when the record's kind is unknown and it was left untouched.
pub fn make_encoded(record: &mut Value) -> Result<bool> {
    let kind = record_kind(record)?;
    if kind == PreferenceKind::Unknown {
        return Ok(false);
    }

    let readable = record.get(PAYLOAD_KEY).cloned().unwrap_or(Value::Null);
    let payload = encode_value(kind, &readable)?;
    trace!(%kind, bytes = payload.len(), "encoded preference payload");
    record[PAYLOAD_KEY] = Value::from(BASE64.encode(payload));
    Ok(true)
}

fn record_kind(record: &Value) -> Result<PreferenceKind> {
    let type_name = record
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_preference("Unknown", "record has no type name"))?;
    Ok(PreferenceKind::from_type_name(type_name))
}

fn json_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        // int64 values are strings in the canonical protobuf JSON mapping
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

/// Protobuf JSON spelling of a non-finite float
fn non_finite_float(text: &str) -> Option<f32> {
    match text {
        NAN => Some(f32::NAN),
        INFINITY => Some(f32::INFINITY),
        NEG_INFINITY => Some(f32::NEG_INFINITY),
        _ => None,
    }
}

fn put_len_delimited(buf: &mut Vec<u8>, value: &str) {
    buf.put_u8(LEN_FIELD_ONE);
    put_varint(buf, value.len() as u64);
    buf.put_slice(value.as_bytes());
}

fn expect_field(payload: &[u8], expected: WireType) -> Result<&[u8]> {
    let (wire_type, rest) = split_tag(payload)?;
    if wire_type != expected {
        return Err(Error::invalid_wire_format(
            0,
            format!("expected {expected:?} field, found {wire_type:?}"),
        ));
    }
    Ok(rest)
}

fn read_varint_field(payload: &[u8]) -> Result<u64> {
    let rest = expect_field(payload, WireType::Varint)?;
    let (value, _) = decode_varint(rest).map_err(|_| Error::varint_decode(1))?;
    Ok(value)
}

/// Reads one `tag, length, bytes` record; `base` is only used for error offsets.
fn read_len_delimited(data: &[u8], base: usize) -> Result<(String, usize)> {
    let rest = expect_field(data, WireType::Len)
        .map_err(|_| Error::invalid_wire_format(base, "expected length-delimited field"))?;
    let (length, length_len) =
        decode_varint(rest).map_err(|_| Error::varint_decode(base + 1))?;

    let start = 1 + length_len;
    let available = data.len() - start;
    let end = match usize::try_from(length) {
        Ok(length) if length <= available => start + length,
        _ => {
            return Err(Error::invalid_wire_format(
                base,
                format!(
                    "not enough bytes for LEN field (need {}, have {})",
                    length, available
                ),
            ))
        }
    };

    let value = std::str::from_utf8(&data[start..end])
        .map_err(|e| Error::invalid_wire_format(base + start, format!("invalid UTF-8: {e}")))?;
    Ok((value.to_owned(), end))
}
