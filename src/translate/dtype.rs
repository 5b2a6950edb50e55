//! Scalar data type resolution from SampleFormat and BitsPerSample.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TranslateError;
use crate::tiff::ByteOrder;

/// Byte order of multi-byte values in a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub const fn as_str(self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }

    /// NumPy byte order prefix.
    pub const fn numpy_prefix(self) -> char {
        match self {
            Endianness::Little => '<',
            Endianness::Big => '>',
        }
    }
}

impl From<ByteOrder> for Endianness {
    fn from(order: ByteOrder) -> Self {
        match order {
            ByteOrder::LittleEndian => Endianness::Little,
            ByteOrder::BigEndian => Endianness::Big,
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric family of a scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Unsigned,
    Signed,
    Float,
}

/// A concrete array element type.
///
/// `endian` is `None` exactly when the type is a single byte wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalarType {
    pub kind: ScalarKind,
    pub bits: u16,
    pub endian: Option<Endianness>,
}

impl ScalarType {
    /// Resolve the element type of an IFD.
    ///
    /// Every sample must share one SampleFormat and one BitsPerSample, since
    /// an array carries a single element type.
    pub fn resolve(
        sample_format: &[u16],
        bits_per_sample: &[u16],
        byte_order: ByteOrder,
    ) -> Result<Self, TranslateError> {
        let format = uniform(sample_format, "sample formats")?;
        let bits = uniform(bits_per_sample, "bits per sample")?;

        let kind = match (format, bits) {
            (1, 8 | 16 | 32) => ScalarKind::Unsigned,
            (2, 8 | 16 | 32) => ScalarKind::Signed,
            (3, 16 | 32 | 64) => ScalarKind::Float,
            (1 | 2, 64) => {
                return Err(TranslateError::unsupported(
                    "64-bit integer samples are not yet supported.",
                ))
            }
            _ => {
                return Err(TranslateError::UnrecognizedDataType {
                    sample_format: sample_format.to_vec(),
                    bits_per_sample: bits_per_sample.to_vec(),
                })
            }
        };

        let endian = (bits > 8).then(|| Endianness::from(byte_order));
        Ok(Self { kind, bits, endian })
    }

    /// Size of one element in bytes.
    pub const fn item_size(&self) -> usize {
        (self.bits / 8) as usize
    }

    /// Data type name in array metadata, e.g. `uint16`.
    pub fn data_type_name(&self) -> &'static str {
        match (self.kind, self.bits) {
            (ScalarKind::Unsigned, 8) => "uint8",
            (ScalarKind::Unsigned, 16) => "uint16",
            (ScalarKind::Unsigned, 32) => "uint32",
            (ScalarKind::Signed, 8) => "int8",
            (ScalarKind::Signed, 16) => "int16",
            (ScalarKind::Signed, 32) => "int32",
            (ScalarKind::Float, 16) => "float16",
            (ScalarKind::Float, 32) => "float32",
            (ScalarKind::Float, 64) => "float64",
            // resolve() never builds other combinations
            _ => "unknown",
        }
    }

    /// NumPy type string, e.g. `<u2` or `|u1`.
    pub fn numpy_str(&self) -> String {
        let order = self.endian.map_or('|', Endianness::numpy_prefix);
        let code = match self.kind {
            ScalarKind::Unsigned => 'u',
            ScalarKind::Signed => 'i',
            ScalarKind::Float => 'f',
        };
        format!("{}{}{}", order, code, self.item_size())
    }

    /// The zero value of this type, used as the array fill value.
    pub fn zero(&self) -> Value {
        match self.kind {
            ScalarKind::Float => Value::from(0.0),
            _ => Value::from(0),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.numpy_str())
    }
}

fn uniform(values: &[u16], what: &str) -> Result<u16, TranslateError> {
    let first = *values.first().ok_or_else(|| {
        TranslateError::invariant(format!("The TIFF directory lists no {}.", what))
    })?;
    if values.iter().any(|v| *v != first) {
        return Err(TranslateError::invariant(format!(
            "Arrays allow a single data type, but the TIFF had multiple {} in a single IFD: {:?}",
            what, values
        )));
    }
    Ok(first)
}
