//! TIFF directory reading.
//!
//! This module turns the first few kilobytes of a TIFF, BigTIFF or GeoTIFF
//! file into typed [`ImageFileDirectory`] values. Pixel data is never read.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian,
//!   MM = big-endian) in the header. All multi-byte values are read with it.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets, BigTIFF
//!   64-bit. The parser handles both transparently.
//!
//! - **IFD chain**: each IFD ends with the offset of the next one; a GeoTIFF
//!   COG typically stores the full resolution image first, then overviews.
//!
//! - **Inline vs offset values**: values that fit in the entry's 4 (or 8)
//!   byte value field are stored inline, larger ones at an offset.

mod directory;
mod geokeys;
mod parser;
mod tags;
mod values;

pub use directory::{DirectoryReader, ImageFileDirectory, TiffDirectoryReader, MAX_IFDS};
pub use geokeys::{geo_key_name, GeoKeyDirectory, GeoKeyValue, GEO_KEY_NAMES};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{FieldType, PhotometricInterpretation, TiffTag, ZSTD_LEVEL_TAG};
pub use values::{decode_value, TagValue, ValueReader};
