//! TIFF tag value reading.
//!
//! Values are stored either inline in the IFD entry or at an offset in the
//! file. Offset values are fetched with a single range request per entry, so
//! long arrays like TileOffsets cost one read regardless of their length.

use bytes::Bytes;
use serde_json::Value;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// TagValue
// =============================================================================

/// A decoded tag value, widened to one representation per numeric family.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// BYTE, SHORT, LONG, LONG8, IFD and IFD8 values
    Unsigned(Vec<u64>),
    /// SBYTE, SSHORT, SLONG and SLONG8 values
    Signed(Vec<i64>),
    /// FLOAT, DOUBLE and the two rational types
    Float(Vec<f64>),
    /// ASCII text with the trailing NUL removed
    Ascii(String),
    /// UNDEFINED bytes
    Bytes(Vec<u8>),
}

impl TagValue {
    /// Whether the value holds nothing at all.
    pub fn is_empty(&self) -> bool {
        match self {
            TagValue::Unsigned(v) => v.is_empty(),
            TagValue::Signed(v) => v.is_empty(),
            TagValue::Float(v) => v.is_empty(),
            TagValue::Ascii(s) => s.is_empty(),
            TagValue::Bytes(b) => b.is_empty(),
        }
    }

    /// The first unsigned value, if this is a non-negative integer tag.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TagValue::Unsigned(v) => v.first().copied(),
            TagValue::Signed(v) => v.first().and_then(|x| u64::try_from(*x).ok()),
            _ => None,
        }
    }

    /// All values as unsigned integers.
    pub fn as_u64_vec(&self) -> Option<Vec<u64>> {
        match self {
            TagValue::Unsigned(v) => Some(v.clone()),
            TagValue::Signed(v) => v.iter().map(|x| u64::try_from(*x).ok()).collect(),
            _ => None,
        }
    }

    /// All values as u16, failing if any is out of range.
    pub fn as_u16_vec(&self) -> Option<Vec<u16>> {
        self.as_u64_vec()?
            .into_iter()
            .map(|x| u16::try_from(x).ok())
            .collect()
    }

    /// All values as floats. Integers are converted.
    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            TagValue::Float(v) => Some(v.clone()),
            TagValue::Unsigned(v) => Some(v.iter().map(|x| *x as f64).collect()),
            TagValue::Signed(v) => Some(v.iter().map(|x| *x as f64).collect()),
            _ => None,
        }
    }

    /// The text of an ASCII tag.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering for attributes: single values collapse to a scalar.
    pub fn to_json(&self) -> Value {
        fn collapse<T: Into<Value> + Copy>(values: &[T]) -> Value {
            match values {
                [single] => (*single).into(),
                many => Value::Array(many.iter().map(|v| (*v).into()).collect()),
            }
        }

        match self {
            TagValue::Unsigned(v) => collapse(v),
            TagValue::Signed(v) => collapse(v),
            TagValue::Float(v) => collapse(v),
            TagValue::Ascii(s) => Value::String(s.clone()),
            TagValue::Bytes(b) => collapse(b),
        }
    }
}

/// Decode `count` values of `field_type` from raw bytes.
///
/// `bytes` must hold at least `count * field_type.size_in_bytes()` bytes.
pub fn decode_value(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Result<TagValue, TiffError> {
    let needed = count
        .checked_mul(field_type.size_in_bytes())
        .filter(|needed| *needed <= bytes.len())
        .ok_or_else(|| TiffError::FileTooSmall {
            required: (count as u64).saturating_mul(field_type.size_in_bytes() as u64),
            actual: bytes.len() as u64,
        })?;

    let chunks = bytes[..needed].chunks_exact(field_type.size_in_bytes().max(1));

    let value = match field_type {
        FieldType::Byte => TagValue::Unsigned(bytes[..count].iter().map(|b| *b as u64).collect()),
        FieldType::Short => {
            TagValue::Unsigned(chunks.map(|c| byte_order.read_u16(c) as u64).collect())
        }
        FieldType::Long | FieldType::Ifd => {
            TagValue::Unsigned(chunks.map(|c| byte_order.read_u32(c) as u64).collect())
        }
        FieldType::Long8 | FieldType::Ifd8 => {
            TagValue::Unsigned(chunks.map(|c| byte_order.read_u64(c)).collect())
        }
        FieldType::SByte => TagValue::Signed(bytes[..count].iter().map(|b| *b as i8 as i64).collect()),
        FieldType::SShort => {
            TagValue::Signed(chunks.map(|c| byte_order.read_u16(c) as i16 as i64).collect())
        }
        FieldType::SLong => {
            TagValue::Signed(chunks.map(|c| byte_order.read_u32(c) as i32 as i64).collect())
        }
        FieldType::SLong8 => TagValue::Signed(chunks.map(|c| byte_order.read_u64(c) as i64).collect()),
        FieldType::Float => TagValue::Float(
            chunks
                .map(|c| f32::from_bits(byte_order.read_u32(c)) as f64)
                .collect(),
        ),
        FieldType::Double => {
            TagValue::Float(chunks.map(|c| f64::from_bits(byte_order.read_u64(c))).collect())
        }
        FieldType::Rational => TagValue::Float(
            chunks
                .map(|c| {
                    let num = byte_order.read_u32(&c[..4]) as f64;
                    let den = byte_order.read_u32(&c[4..]) as f64;
                    num / den
                })
                .collect(),
        ),
        FieldType::SRational => TagValue::Float(
            chunks
                .map(|c| {
                    let num = byte_order.read_u32(&c[..4]) as i32 as f64;
                    let den = byte_order.read_u32(&c[4..]) as i32 as f64;
                    num / den
                })
                .collect(),
        ),
        FieldType::Ascii => {
            let raw = &bytes[..count];
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            TagValue::Ascii(String::from_utf8_lossy(&raw[..end]).into_owned())
        }
        FieldType::Undefined => TagValue::Bytes(bytes[..count].to_vec()),
    };

    Ok(value)
}

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values from a TIFF file.
///
/// Combines a RangeReader with the parsed header so values are fetched from the
/// right place and decoded with the file's byte order.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    /// Create a new ValueReader.
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Get the byte order from the header.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Read the raw bytes of an entry's value, inline or from the file.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry.value_byte_size()?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            let bytes = self.reader.read_exact_at(offset, size as usize).await?;
            Ok(bytes)
        }
    }

    /// Read and decode an entry's full value.
    pub async fn read_value(&self, entry: &IfdEntry) -> Result<TagValue, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.count == 0 {
            return decode_value(&[], 0, field_type, self.header.byte_order);
        }

        let bytes = self.read_bytes(entry).await?;
        decode_value(&bytes, entry.count as usize, field_type, self.header.byte_order)
    }

    /// Read a single unsigned integer, taking the inline fast path when possible.
    pub async fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }

        self.read_value(entry)
            .await?
            .as_u64()
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!(
                    "tag {} is not an unsigned integer (type {})",
                    entry.tag_id, entry.field_type_raw
                ),
            })
    }
}

// =============================================================================
// Tests
// =============================================================================
