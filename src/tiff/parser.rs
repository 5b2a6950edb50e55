//! TIFF header and IFD structure parsing.
//!
//! Everything here is synchronous and works on bytes already fetched by the
//! directory reader: the file header, the raw IFD block, and its entries.
//!
//! # TIFF Header Structure
//!
//! ## Classic TIFF (8 bytes)
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (42 = 0x002A)
//! Bytes 4-7: Offset to first IFD (4 bytes)
//! ```
//!
//! ## BigTIFF (16 bytes)
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (43 = 0x002B)
//! Bytes 4-5: Offset byte size (must be 8)
//! Bytes 6-7: Reserved (must be 0)
//! Bytes 8-15: Offset to first IFD (8 bytes)
//! ```

use crate::error::TiffError;

use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

/// "II": little-endian
const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;

/// "MM": big-endian
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

/// Header length of classic TIFF and of BigTIFF, in bytes
pub const TIFF_HEADER_SIZE: usize = 8;
pub const BIGTIFF_HEADER_SIZE: usize = 16;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a TIFF file, declared by its first two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian ("II" = Intel)
    LittleEndian,
    /// Big-endian ("MM" = Motorola)
    BigEndian,
}

impl ByteOrder {
    /// Detect the byte order from the two magic bytes at the start of a file.
    ///
    /// `II` is little-endian and `MM` is big-endian; anything else is not a TIFF.
    pub fn from_magic(magic: [u8; 2]) -> Result<Self, TiffError> {
        match u16::from_le_bytes(magic) {
            BYTE_ORDER_LITTLE_ENDIAN => Ok(ByteOrder::LittleEndian),
            BYTE_ORDER_BIG_ENDIAN => Ok(ByteOrder::BigEndian),
            other => Err(TiffError::InvalidMagic(other)),
        }
    }

    /// Read a u16 from the start of `bytes` using this byte order.
    ///
    /// # Panics
    /// Panics if `bytes` has fewer than 2 bytes.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let raw = leading::<2>(bytes);
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        }
    }

    /// Read a u32 from the start of `bytes` using this byte order.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = leading::<4>(bytes);
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }

    /// Read a u64 from the start of `bytes` using this byte order.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let raw = leading::<8>(bytes);
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
        }
    }
}

/// Copy the first `N` bytes of a slice into an array.
#[inline]
fn leading<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut raw = [0u8; N];
    raw.copy_from_slice(&bytes[..N]);
    raw
}

/// Fail with `FileTooSmall` unless `bytes` holds at least `required` bytes.
fn require(bytes: &[u8], required: usize) -> Result<(), TiffError> {
    if bytes.len() < required {
        return Err(TiffError::FileTooSmall {
            required: required as u64,
            actual: bytes.len() as u64,
        });
    }
    Ok(())
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header: byte order, classic vs BigTIFF, and where the IFD
/// chain starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    /// Version 43: 64-bit offsets and counts
    pub is_bigtiff: bool,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF header from the first bytes of a file.
    ///
    /// `bytes` needs 8 bytes for classic TIFF and 16 for BigTIFF. `file_size` is
    /// used to reject a first IFD offset that points past the end of the file.
    ///
    /// # Errors
    /// - `InvalidMagic` if byte order bytes are not II or MM
    /// - `InvalidVersion` if version is not 42 or 43
    /// - `InvalidBigTiffOffsetSize` if BigTIFF offset size is not 8
    /// - `FileTooSmall` if there aren't enough bytes for the header
    /// - `InvalidIfdOffset` if the first IFD offset is outside the file
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        require(bytes, TIFF_HEADER_SIZE)?;
        let byte_order = ByteOrder::from_magic([bytes[0], bytes[1]])?;

        let (is_bigtiff, first_ifd_offset) = match byte_order.read_u16(&bytes[2..4]) {
            VERSION_TIFF => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIGTIFF => {
                require(bytes, BIGTIFF_HEADER_SIZE)?;
                match byte_order.read_u16(&bytes[4..6]) {
                    // Bytes 6-7 are reserved and not checked
                    8 => (true, byte_order.read_u64(&bytes[8..16])),
                    other => return Err(TiffError::InvalidBigTiffOffsetSize(other)),
                }
            }
            other => return Err(TiffError::InvalidVersion(other)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Size of one IFD entry: 12 bytes classic, 20 bytes BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry count that opens an IFD: u16 classic, u64 BigTIFF.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of the next-IFD pointer that closes an IFD: u32 classic, u64 BigTIFF.
    #[inline]
    pub const fn ifd_next_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Size of the value/offset field in an entry, which is also the inline
    /// threshold: 4 bytes classic, 8 bytes BigTIFF.
    #[inline]
    pub const fn value_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Read an unsigned count or offset field of the width this variant uses.
    #[inline]
    pub fn read_offset(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.read_u64(bytes)
        } else {
            self.byte_order.read_u32(bytes) as u64
        }
    }
}


// =============================================================================
// IfdEntry
// =============================================================================

/// A single 12-byte (classic) or 20-byte (BigTIFF) IFD entry.
///
/// The value/offset field is kept as raw bytes; whether it holds the value
/// itself or a pointer to it depends on the field type and count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    /// Numeric tag id
    pub tag_id: u16,

    /// Decoded field type, `None` if the type code is unknown
    pub field_type: Option<FieldType>,

    /// Field type code as stored in the file
    pub field_type_raw: u16,

    /// Number of values (not bytes)
    pub count: u64,

    /// Raw value/offset field, 4 or 8 bytes
    pub value_offset_bytes: Vec<u8>,

    /// Whether the value fits in `value_offset_bytes`
    pub is_inline: bool,
}

impl IfdEntry {
    /// Parse one entry from exactly `header.ifd_entry_size()` bytes.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Self {
        let byte_order = header.byte_order;
        let tag_id = byte_order.read_u16(&bytes[0..2]);
        let field_type_raw = byte_order.read_u16(&bytes[2..4]);
        let field_type = FieldType::from_u16(field_type_raw);

        let (count, value_start) = if header.is_bigtiff {
            (byte_order.read_u64(&bytes[4..12]), 12)
        } else {
            (byte_order.read_u32(&bytes[4..8]) as u64, 8)
        };
        let value_offset_bytes = bytes[value_start..value_start + header.value_offset_size()].to_vec();

        // Unknown types are never dereferenced, treat them as inline
        let is_inline = field_type
            .map(|ft| ft.fits_inline(count, header.is_bigtiff))
            .unwrap_or(true);

        Self {
            tag_id,
            field_type,
            field_type_raw,
            count,
            value_offset_bytes,
            is_inline,
        }
    }

    /// The tag this entry describes, if it is one we know by name.
    pub fn tag(&self) -> Option<TiffTag> {
        TiffTag::from_u16(self.tag_id)
    }

    /// Total size of the value in bytes.
    ///
    /// Fails for unknown field types and for counts whose size overflows.
    pub fn value_byte_size(&self) -> Result<u64, TiffError> {
        let field_type = self
            .field_type
            .ok_or(TiffError::UnknownFieldType(self.field_type_raw))?;
        (field_type.size_in_bytes() as u64)
            .checked_mul(self.count)
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: "count",
                message: format!("tag {} declares {} values", self.tag_id, self.count),
            })
    }

    /// Interpret the value/offset field as a file offset.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_offset_bytes.len() >= 8 {
            byte_order.read_u64(&self.value_offset_bytes)
        } else {
            byte_order.read_u32(&self.value_offset_bytes) as u64
        }
    }

    /// Read a single inline unsigned integer without touching the file.
    ///
    /// Returns `None` when the entry is not a single SHORT, LONG or LONG8
    /// stored inline.
    pub fn inline_u64(&self, byte_order: ByteOrder) -> Option<u64> {
        if !self.is_inline || self.count != 1 {
            return None;
        }
        match self.field_type? {
            FieldType::Short => Some(byte_order.read_u16(&self.value_offset_bytes) as u64),
            FieldType::Long | FieldType::Ifd => {
                Some(byte_order.read_u32(&self.value_offset_bytes) as u64)
            }
            FieldType::Long8 | FieldType::Ifd8 => Some(byte_order.read_u64(&self.value_offset_bytes)),
            _ => None,
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// One raw Image File Directory: its entries and the pointer to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    /// File offset this IFD was read from
    pub offset: u64,

    /// Entries in file order (TIFF requires ascending tag order, not enforced)
    pub entries: Vec<IfdEntry>,

    /// Offset of the next IFD, 0 at the end of the chain
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Size of a full IFD block holding `entry_count` entries, including the
    /// leading count and trailing next-IFD pointer.
    ///
    /// `None` when a corrupt count overflows the size.
    pub fn calculate_size(entry_count: u64, header: &TiffHeader) -> Option<u64> {
        entry_count
            .checked_mul(header.ifd_entry_size() as u64)?
            .checked_add(header.ifd_count_size() as u64)?
            .checked_add(header.ifd_next_offset_size() as u64)
    }

    /// Read the entry count at the start of an IFD block.
    pub fn entry_count(bytes: &[u8], header: &TiffHeader) -> Result<u64, TiffError> {
        require(bytes, header.ifd_count_size())?;
        Ok(if header.is_bigtiff {
            header.byte_order.read_u64(&bytes[..8])
        } else {
            header.byte_order.read_u16(&bytes[..2]) as u64
        })
    }

    /// Parse a complete IFD block that was read from `offset`.
    pub fn parse(offset: u64, bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let entry_count = Self::entry_count(bytes, header)?;
        let total = Self::calculate_size(entry_count, header).unwrap_or(u64::MAX);
        if (bytes.len() as u64) < total {
            return Err(TiffError::FileTooSmall {
                required: total,
                actual: bytes.len() as u64,
            });
        }

        let entry_size = header.ifd_entry_size();
        let mut pos = header.ifd_count_size();
        let mut entries = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            entries.push(IfdEntry::parse(&bytes[pos..pos + entry_size], header));
            pos += entry_size;
        }

        let next_ifd_offset = header.read_offset(&bytes[pos..]);

        Ok(Self {
            offset,
            entries,
            next_ifd_offset,
        })
    }

    /// Look up an entry by tag.
    pub fn get_entry(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.get_entry_by_tag(tag.as_u16())
    }

    /// Look up an entry by numeric tag id.
    pub fn get_entry_by_tag(&self, tag_id: u16) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag_id == tag_id)
    }
}

// =============================================================================
// Tests
// =============================================================================
