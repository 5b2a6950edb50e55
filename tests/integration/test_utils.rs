//! Test utilities for integration tests.
//!
//! This module provides a request-tracking mock reader and a builder for
//! synthetic TIFF files. Built files contain headers and IFDs only; tile and
//! strip offsets point past the end of the file, since the translator never
//! reads pixel data.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use virtual_tiff::error::IoError;
use virtual_tiff::io::{check_range, RangeReader};

// =============================================================================
// Request-Logging Reader
// =============================================================================

/// In-memory reader that logs every range it is asked for.
///
/// Clones share the log, so a test can keep one handle while another is
/// moved into a `BlockCache`.
#[derive(Clone)]
pub struct TrackingMockReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<RwLock<Vec<(u64, usize)>>>,
}

impl TrackingMockReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
            request_count: Arc::default(),
            requests: Arc::default(),
        }
    }

    /// Number of reads that reached this reader.
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Every `(offset, len)` requested so far, in arrival order.
    pub async fn get_requests(&self) -> Vec<(u64, usize)> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl RangeReader for TrackingMockReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.write().await.push((offset, len));

        check_range(offset, len, self.size())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// TIFF File Builders
// =============================================================================

/// Assembles a TIFF file from a header and a chain of IFDs.
pub struct TiffBuilder {
    byte_order: ByteOrderType,
    is_bigtiff: bool,
    ifds: Vec<IfdBuilder>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

impl ByteOrderType {
    /// Append the low `width` bytes of `value` in this byte order.
    fn put(self, out: &mut Vec<u8>, value: u64, width: usize) {
        match self {
            ByteOrderType::LittleEndian => out.extend_from_slice(&value.to_le_bytes()[..width]),
            ByteOrderType::BigEndian => out.extend_from_slice(&value.to_be_bytes()[8 - width..]),
        }
    }
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self {
            byte_order: ByteOrderType::LittleEndian,
            is_bigtiff: false,
            ifds: Vec::new(),
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrderType) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_bigtiff(mut self, is_bigtiff: bool) -> Self {
        self.is_bigtiff = is_bigtiff;
        self
    }

    pub fn add_ifd(mut self, ifd: IfdBuilder) -> Self {
        self.ifds.push(ifd);
        self
    }

    /// Build the TIFF file data.
    ///
    /// Each IFD is followed by its out-of-line values, and IFDs are chained
    /// in the order they were added.
    pub fn build(self) -> Vec<u8> {
        let order = self.byte_order;
        let header_size = if self.is_bigtiff { 16 } else { 8 };
        let mut data = Vec::new();

        // Header
        match order {
            ByteOrderType::LittleEndian => data.extend(b"II"),
            ByteOrderType::BigEndian => data.extend(b"MM"),
        }
        if self.is_bigtiff {
            order.put(&mut data, 43, 2);
            order.put(&mut data, 8, 2);
            order.put(&mut data, 0, 2);
            order.put(&mut data, header_size, 8);
        } else {
            order.put(&mut data, 42, 2);
            order.put(&mut data, header_size, 4);
        }

        let ifd_count = self.ifds.len();
        for (idx, ifd) in self.ifds.into_iter().enumerate() {
            let is_last = idx + 1 == ifd_count;
            ifd.write_to(&mut data, order, self.is_bigtiff, is_last);
        }

        data
    }
}

impl Default for TiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed tag value, encoded with the file's byte order at build time.
#[derive(Clone, Debug)]
pub enum EntryValue {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
    Long8(Vec<u64>),
}

impl EntryValue {
    fn field_type(&self) -> u16 {
        match self {
            EntryValue::Byte(_) => 1,
            EntryValue::Ascii(_) => 2,
            EntryValue::Short(_) => 3,
            EntryValue::Long(_) => 4,
            EntryValue::Double(_) => 12,
            EntryValue::Long8(_) => 16,
        }
    }

    fn count(&self) -> u64 {
        match self {
            EntryValue::Byte(v) => v.len() as u64,
            // NUL terminator
            EntryValue::Ascii(s) => s.len() as u64 + 1,
            EntryValue::Short(v) => v.len() as u64,
            EntryValue::Long(v) => v.len() as u64,
            EntryValue::Double(v) => v.len() as u64,
            EntryValue::Long8(v) => v.len() as u64,
        }
    }

    fn encode(&self, order: ByteOrderType) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            EntryValue::Byte(v) => out.extend(v),
            EntryValue::Ascii(s) => {
                out.extend(s.as_bytes());
                out.push(0);
            }
            EntryValue::Short(v) => v
                .iter()
                .for_each(|x| order.put(&mut out, *x as u64, 2)),
            EntryValue::Long(v) => v
                .iter()
                .for_each(|x| order.put(&mut out, *x as u64, 4)),
            EntryValue::Double(v) => v
                .iter()
                .for_each(|x| order.put(&mut out, x.to_bits(), 8)),
            EntryValue::Long8(v) => v.iter().for_each(|x| order.put(&mut out, *x, 8)),
        }
        out
    }
}

/// Builder for one IFD.
#[derive(Clone, Debug, Default)]
pub struct IfdBuilder {
    entries: Vec<(u16, EntryValue)>,
}

impl IfdBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-band tiled image with one fake offset and byte count per tile.
    pub fn tiled(width: u32, height: u32, tile_size: u32, bits: u16, sample_format: u16) -> Self {
        let tiles_x = width.div_ceil(tile_size);
        let tiles_y = height.div_ceil(tile_size);
        let tile_count = tiles_x * tiles_y;

        let mut builder = Self::new();
        builder
            .long(256, &[width]) // ImageWidth
            .long(257, &[height]) // ImageLength
            .short(258, &[bits]) // BitsPerSample
            .short(259, &[1]) // Compression = none
            .short(262, &[1]) // PhotometricInterpretation = BlackIsZero
            .short(277, &[1]) // SamplesPerPixel
            .short(322, &[tile_size as u16]) // TileWidth
            .short(323, &[tile_size as u16]) // TileLength
            .long(324, &fake_offsets(tile_count)) // TileOffsets
            .long(325, &vec![4096; tile_count as usize]) // TileByteCounts
            .short(339, &[sample_format]); // SampleFormat
        builder
    }

    /// A single-band 8-bit stripped image.
    pub fn stripped(width: u32, height: u32, rows_per_strip: u32) -> Self {
        let strip_count = height.div_ceil(rows_per_strip);

        let mut builder = Self::new();
        builder
            .long(256, &[width])
            .long(257, &[height])
            .short(258, &[8])
            .short(259, &[1])
            .short(262, &[1])
            .short(277, &[1])
            .long(273, &fake_offsets(strip_count)) // StripOffsets
            .long(278, &[rows_per_strip]) // RowsPerStrip
            .long(279, &vec![2048; strip_count as usize]); // StripByteCounts
        builder
    }

    /// Set a tag, replacing any earlier value.
    pub fn set(&mut self, tag: u16, value: EntryValue) -> &mut Self {
        self.entries.retain(|(t, _)| *t != tag);
        self.entries.push((tag, value));
        self
    }

    /// Remove a tag.
    pub fn remove(&mut self, tag: u16) -> &mut Self {
        self.entries.retain(|(t, _)| *t != tag);
        self
    }

    pub fn short(&mut self, tag: u16, values: &[u16]) -> &mut Self {
        self.set(tag, EntryValue::Short(values.to_vec()))
    }

    pub fn long(&mut self, tag: u16, values: &[u32]) -> &mut Self {
        self.set(tag, EntryValue::Long(values.to_vec()))
    }

    pub fn long8(&mut self, tag: u16, values: &[u64]) -> &mut Self {
        self.set(tag, EntryValue::Long8(values.to_vec()))
    }

    pub fn double(&mut self, tag: u16, values: &[f64]) -> &mut Self {
        self.set(tag, EntryValue::Double(values.to_vec()))
    }

    pub fn ascii(&mut self, tag: u16, text: &str) -> &mut Self {
        self.set(tag, EntryValue::Ascii(text.to_string()))
    }

    pub fn bytes(&mut self, tag: u16, values: &[u8]) -> &mut Self {
        self.set(tag, EntryValue::Byte(values.to_vec()))
    }

    /// Append this IFD and its out-of-line values at the end of `data`.
    fn write_to(mut self, data: &mut Vec<u8>, order: ByteOrderType, is_bigtiff: bool, is_last: bool) {
        self.entries.sort_by_key(|(tag, _)| *tag);

        let (count_size, entry_size, offset_size) = if is_bigtiff { (8, 20, 8) } else { (2, 12, 4) };
        let ifd_offset = data.len();
        let ifd_size = count_size + self.entries.len() * entry_size + offset_size;
        let external_start = (ifd_offset + ifd_size) as u64;

        let mut external = Vec::new();
        let mut block = Vec::new();
        order.put(&mut block, self.entries.len() as u64, count_size);

        for (tag, value) in &self.entries {
            order.put(&mut block, *tag as u64, 2);
            order.put(&mut block, value.field_type() as u64, 2);
            order.put(&mut block, value.count(), offset_size);

            let encoded = value.encode(order);
            if encoded.len() <= offset_size {
                // Inline values are left-justified
                let mut field = encoded;
                field.resize(offset_size, 0);
                block.extend(field);
            } else {
                let offset = external_start + external.len() as u64;
                order.put(&mut block, offset, offset_size);
                external.extend(encoded);
                // Keep values word aligned
                if external.len() % 2 == 1 {
                    external.push(0);
                }
            }
        }

        let next_ifd_offset = if is_last {
            0
        } else {
            external_start + external.len() as u64
        };
        order.put(&mut block, next_ifd_offset, offset_size);

        data.extend(block);
        data.extend(external);
    }
}

/// Non-zero offsets well past the end of any built file.
fn fake_offsets(count: u32) -> Vec<u32> {
    (0..count).map(|i| 1_000_000 + i * 4096).collect()
}

// =============================================================================
// Common Files
// =============================================================================

/// 512x512 uint16 image in 256x256 tiles, uncompressed.
pub fn create_tiled_tiff(byte_order: ByteOrderType) -> Vec<u8> {
    TiffBuilder::new()
        .with_byte_order(byte_order)
        .add_ifd(IfdBuilder::tiled(512, 512, 256, 16, 1))
        .build()
}

/// Check for a classic TIFF magic number in either byte order.
pub fn is_tiff_magic(data: &[u8]) -> bool {
    data.len() >= 4 && (data[..4] == [b'I', b'I', 42, 0] || data[..4] == [b'M', b'M', 0, 42])
}

/// Check for a BigTIFF magic number in either byte order.
pub fn is_bigtiff_magic(data: &[u8]) -> bool {
    data.len() >= 4 && (data[..4] == [b'I', b'I', 43, 0] || data[..4] == [b'M', b'M', 0, 43])
}
