//! The handful of protobuf wire primitives preference payloads need.
//!
//! A payload is a single-field message: one tag byte for field 1 followed by
//! a varint, four little-endian bytes, or a length-prefixed byte run.
//! Everything else about the format is handled by `prost-reflect`.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Wire types a preference payload can use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Base-128 integer
    Varint = 0,
    /// Eight little-endian bytes
    I64 = 1,
    /// Varint length followed by that many bytes
    Len = 2,
    /// Four little-endian bytes
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        Ok(match bits {
            0 => Self::Varint,
            1 => Self::I64,
            2 => Self::Len,
            5 => Self::I32,
            // 3 and 4 are the deprecated group markers
            other => {
                return Err(Error::invalid_wire_format(
                    0,
                    format!("unsupported wire type {}", other),
                ))
            }
        })
    }
}

/// A 64-bit value never needs more than ten 7-bit groups
const MAX_VARINT_LEN: usize = 10;

/// Builds a single-byte tag for small field numbers.
pub const fn tag(field_number: u8, wire_type: WireType) -> u8 {
    (field_number << 3) | wire_type as u8
}

/// Tag of field 1 carrying a varint (`0x08`)
pub const VARINT_FIELD_ONE: u8 = tag(1, WireType::Varint);

/// Tag of field 1 carrying a 32-bit fixed value (`0x0D`)
pub const I32_FIELD_ONE: u8 = tag(1, WireType::I32);

/// Tag of field 1 carrying a length-delimited value (`0x0A`)
pub const LEN_FIELD_ONE: u8 = tag(1, WireType::Len);

/// Appends `value` as a varint, low group first.
pub fn put_varint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Varint encoding of `value` in a new buffer
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_LEN);
    put_varint(&mut buf, value);
    buf
}

/// Reads one varint from the front of `data`.
///
/// Returns the value and how many bytes it occupied. Input that ends before
/// a byte with a clear high bit, or runs past ten bytes, is rejected.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let end = data
        .iter()
        .take(MAX_VARINT_LEN)
        .position(|byte| byte & 0x80 == 0)
        .ok_or_else(|| Error::varint_decode(data.len().min(MAX_VARINT_LEN)))?;

    let value = data[..=end]
        .iter()
        .rev()
        .fold(0u64, |acc, byte| (acc << 7) | u64::from(byte & 0x7F));
    Ok((value, end + 1))
}

/// Splits the tag byte off a payload, returning its wire type and the rest.
pub fn split_tag(data: &[u8]) -> Result<(WireType, &[u8])> {
    let (&first, rest) = data
        .split_first()
        .ok_or_else(|| Error::invalid_wire_format(0, "empty payload"))?;
    let wire_type = WireType::try_from(first & 0x07)?;
    Ok((wire_type, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_max_takes_ten_bytes() {
        let encoded = encode_varint(u64::MAX);
        assert_eq!(encoded, [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert_eq!(decode_varint(&encoded).unwrap(), (u64::MAX, 10));
    }

    #[test]
    fn test_varint_round_trip() {
        for value in [0, 1, 127, 128, 300, u32::MAX as u64, i64::MAX as u64] {
            let encoded = encode_varint(value);
            assert_eq!(decode_varint(&encoded).unwrap(), (value, encoded.len()));
        }
    }

    #[test]
    fn test_encode_varint_layout() {
        assert_eq!(encode_varint(0), [0x00]);
        assert_eq!(encode_varint(127), [0x7F]);
        assert_eq!(encode_varint(128), [0x80, 0x01]);
        assert_eq!(encode_varint(300), [0xAC, 0x02]);
    }

    #[test]
    fn test_decode_varint_stops_at_terminator() {
        let data = [0x96, 0x01, 0xFF];
        assert_eq!(decode_varint(&data).unwrap(), (150, 2));
    }

    #[test]
    fn test_decode_varint_truncated() {
        assert!(matches!(
            decode_varint(&[0x80, 0x80]),
            Err(Error::VarintDecode { offset: 2 })
        ));
        assert!(matches!(
            decode_varint(&[]),
            Err(Error::VarintDecode { offset: 0 })
        ));
    }

    #[test]
    fn test_decode_varint_too_long() {
        let data = [0xFF; 11];
        assert!(matches!(
            decode_varint(&data),
            Err(Error::VarintDecode { offset: 10 })
        ));
    }

    #[test]
    fn test_field_one_tags() {
        assert_eq!(VARINT_FIELD_ONE, 0x08);
        assert_eq!(I32_FIELD_ONE, 0x0D);
        assert_eq!(LEN_FIELD_ONE, 0x0A);
    }

    #[test]
    fn test_group_wire_types_rejected() {
        assert_eq!(WireType::try_from(2).unwrap(), WireType::Len);
        assert!(WireType::try_from(3).is_err());
        assert!(WireType::try_from(4).is_err());
        assert!(WireType::try_from(6).is_err());
    }

    #[test]
    fn test_split_tag() {
        let (wire_type, rest) = split_tag(&[0x0D, 1, 2, 3, 4]).unwrap();
        assert_eq!(wire_type, WireType::I32);
        assert_eq!(rest, [1, 2, 3, 4]);
        assert!(split_tag(&[]).is_err());
    }
}
