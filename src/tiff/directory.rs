//! Typed image file directories and the reader that produces them.
//!
//! [`TiffDirectoryReader`] walks the IFD chain of a TIFF or BigTIFF file and
//! turns each raw [`Ifd`] into an [`ImageFileDirectory`] with TIFF 6.0
//! defaults applied. Tags without a typed field are kept in `other_tags`.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::TiffError;
use crate::io::RangeReader;

use super::geokeys::GeoKeyDirectory;
use super::parser::{ByteOrder, Ifd, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::TiffTag;
use super::values::{TagValue, ValueReader};

/// Upper bound on the IFD chain length, guards against malformed files.
pub const MAX_IFDS: usize = 4096;

// =============================================================================
// ImageFileDirectory
// =============================================================================

/// The parsed fields of one IFD that the translator needs.
///
/// Optional fields are `None` when the tag is absent and has no TIFF default.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFileDirectory {
    pub image_width: u64,
    pub image_height: u64,

    /// One value per sample
    pub bits_per_sample: Vec<u16>,
    pub compression: u16,
    pub photometric_interpretation: Option<u16>,
    pub samples_per_pixel: u16,
    pub planar_configuration: u16,
    pub predictor: u16,

    /// One value per sample
    pub sample_format: Vec<u16>,

    pub rows_per_strip: Option<u64>,
    pub strip_offsets: Option<Vec<u64>>,
    pub strip_byte_counts: Option<Vec<u64>>,

    pub tile_width: Option<u64>,
    pub tile_height: Option<u64>,
    pub tile_offsets: Option<Vec<u64>>,
    pub tile_byte_counts: Option<Vec<u64>>,

    pub jpeg_tables: Option<Vec<u8>>,

    pub geo_key_directory: Option<GeoKeyDirectory>,
    pub model_pixel_scale: Option<Vec<f64>>,
    pub model_tiepoint: Option<Vec<f64>>,

    /// ZSTD level from the [`ZSTD_LEVEL_TAG`](super::tags::ZSTD_LEVEL_TAG) pseudo-tag
    pub zstd_level: Option<i32>,

    /// Every other tag, keyed by numeric id (GDAL metadata, nodata, SubIFDs, ...)
    pub other_tags: BTreeMap<u16, TagValue>,
}

impl Default for ImageFileDirectory {
    fn default() -> Self {
        Self {
            image_width: 0,
            image_height: 0,
            bits_per_sample: vec![1],
            compression: 1,
            photometric_interpretation: None,
            samples_per_pixel: 1,
            planar_configuration: 1,
            predictor: 1,
            sample_format: vec![1],
            rows_per_strip: None,
            strip_offsets: None,
            strip_byte_counts: None,
            tile_width: None,
            tile_height: None,
            tile_offsets: None,
            tile_byte_counts: None,
            jpeg_tables: None,
            geo_key_directory: None,
            model_pixel_scale: None,
            model_tiepoint: None,
            zstd_level: None,
            other_tags: BTreeMap::new(),
        }
    }
}

impl ImageFileDirectory {
    /// Look up a tag kept in `other_tags`.
    pub fn other_tag(&self, tag: TiffTag) -> Option<&TagValue> {
        self.other_tags.get(&tag.as_u16())
    }

    /// Whether the directory points at sub-IFDs.
    pub fn has_sub_ifds(&self) -> bool {
        self.other_tag(TiffTag::SubIfds)
            .map(|v| !v.is_empty() && v.as_u64_vec().map_or(true, |o| o.iter().any(|x| *x != 0)))
            .unwrap_or(false)
    }

    /// Whether pixel data is tiled rather than stripped.
    pub fn is_tiled(&self) -> bool {
        self.tile_width.is_some() && self.tile_height.is_some()
    }

    /// Build a typed directory from a raw IFD, fetching out-of-line values.
    pub async fn from_ifd<R: RangeReader + ?Sized>(
        ifd: &Ifd,
        values: &ValueReader<'_, R>,
    ) -> Result<Self, TiffError> {
        let mut dir = ImageFileDirectory::default();
        let mut seen_bits = false;
        let mut seen_format = false;
        let mut width = None;
        let mut height = None;
        let mut geo_directory: Option<Vec<u16>> = None;
        let mut geo_doubles: Option<Vec<f64>> = None;
        let mut geo_ascii: Option<String> = None;

        for entry in &ifd.entries {
            if entry.field_type.is_none() {
                warn!(
                    tag = entry.tag_id,
                    field_type = entry.field_type_raw,
                    "skipping tag with unknown field type"
                );
                continue;
            }

            let value = values.read_value(entry).await?;

            let Some(tag) = entry.tag() else {
                dir.other_tags.insert(entry.tag_id, value);
                continue;
            };

            match tag {
                TiffTag::ImageWidth => width = Some(scalar(&value, tag)?),
                TiffTag::ImageLength => height = Some(scalar(&value, tag)?),
                TiffTag::BitsPerSample => {
                    dir.bits_per_sample = shorts(&value, tag)?;
                    seen_bits = true;
                }
                TiffTag::Compression => dir.compression = short(&value, tag)?,
                TiffTag::PhotometricInterpretation => {
                    dir.photometric_interpretation = Some(short(&value, tag)?)
                }
                TiffTag::SamplesPerPixel => dir.samples_per_pixel = short(&value, tag)?,
                TiffTag::PlanarConfiguration => dir.planar_configuration = short(&value, tag)?,
                TiffTag::Predictor => dir.predictor = short(&value, tag)?,
                TiffTag::SampleFormat => {
                    dir.sample_format = shorts(&value, tag)?;
                    seen_format = true;
                }
                TiffTag::RowsPerStrip => dir.rows_per_strip = Some(scalar(&value, tag)?),
                TiffTag::StripOffsets => dir.strip_offsets = Some(longs(&value, tag)?),
                TiffTag::StripByteCounts => dir.strip_byte_counts = Some(longs(&value, tag)?),
                TiffTag::TileWidth => dir.tile_width = Some(scalar(&value, tag)?),
                TiffTag::TileLength => dir.tile_height = Some(scalar(&value, tag)?),
                TiffTag::TileOffsets => dir.tile_offsets = Some(longs(&value, tag)?),
                TiffTag::TileByteCounts => dir.tile_byte_counts = Some(longs(&value, tag)?),
                TiffTag::JpegTables => {
                    dir.jpeg_tables = match value {
                        TagValue::Bytes(b) => Some(b),
                        other => Some(
                            other
                                .as_u64_vec()
                                .unwrap_or_default()
                                .into_iter()
                                .map(|b| b as u8)
                                .collect(),
                        ),
                    }
                }
                TiffTag::ModelPixelScale => dir.model_pixel_scale = Some(floats(&value, tag)?),
                TiffTag::ModelTiepoint => dir.model_tiepoint = Some(floats(&value, tag)?),
                TiffTag::GeoKeyDirectory => geo_directory = Some(shorts(&value, tag)?),
                TiffTag::GeoDoubleParams => geo_doubles = Some(floats(&value, tag)?),
                TiffTag::GeoAsciiParams => geo_ascii = value.as_str().map(str::to_string),
                TiffTag::SubIfds | TiffTag::GdalMetadata | TiffTag::GdalNodata => {
                    dir.other_tags.insert(entry.tag_id, value);
                }
            }
        }

        dir.image_width = width.ok_or(TiffError::MissingTag(TiffTag::ImageWidth.name()))?;
        dir.image_height = height.ok_or(TiffError::MissingTag(TiffTag::ImageLength.name()))?;

        // Per-sample defaults depend on SamplesPerPixel
        let spp = dir.samples_per_pixel.max(1) as usize;
        if !seen_bits {
            dir.bits_per_sample = vec![1; spp];
        }
        if !seen_format {
            dir.sample_format = vec![1; spp];
        }

        if let Some(keys) = geo_directory {
            dir.geo_key_directory = Some(GeoKeyDirectory::decode(
                &keys,
                geo_doubles.as_deref(),
                geo_ascii.as_deref(),
            )?);
        }

        Ok(dir)
    }
}

fn invalid(tag: TiffTag, value: &TagValue, expected: &str) -> TiffError {
    TiffError::InvalidTagValue {
        tag: tag.name(),
        message: format!("expected {}, got {:?}", expected, value),
    }
}

fn scalar(value: &TagValue, tag: TiffTag) -> Result<u64, TiffError> {
    value.as_u64().ok_or_else(|| invalid(tag, value, "an unsigned integer"))
}

fn short(value: &TagValue, tag: TiffTag) -> Result<u16, TiffError> {
    scalar(value, tag)?
        .try_into()
        .map_err(|_| invalid(tag, value, "a 16-bit value"))
}

fn shorts(value: &TagValue, tag: TiffTag) -> Result<Vec<u16>, TiffError> {
    value
        .as_u16_vec()
        .ok_or_else(|| invalid(tag, value, "16-bit values"))
}

fn longs(value: &TagValue, tag: TiffTag) -> Result<Vec<u64>, TiffError> {
    value
        .as_u64_vec()
        .ok_or_else(|| invalid(tag, value, "unsigned integers"))
}

fn floats(value: &TagValue, tag: TiffTag) -> Result<Vec<f64>, TiffError> {
    value
        .as_f64_vec()
        .ok_or_else(|| invalid(tag, value, "numbers"))
}

// =============================================================================
// DirectoryReader
// =============================================================================

/// Produces the list of image file directories for a file.
///
/// Implementations may parse the file themselves or delegate to another
/// library; the translator only consumes the typed result.
#[async_trait]
pub trait DirectoryReader: Send + Sync {
    /// Read every directory in the main IFD chain, in file order.
    async fn read_directories(
        &self,
        reader: &dyn RangeReader,
    ) -> Result<Vec<ImageFileDirectory>, TiffError>;
}

/// Built-in TIFF/BigTIFF directory reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffDirectoryReader;

impl TiffDirectoryReader {
    /// Read and parse the file header.
    pub async fn read_header(reader: &dyn RangeReader) -> Result<TiffHeader, TiffError> {
        let size = reader.size();
        let len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let bytes = reader.read_exact_at(0, len).await?;
        TiffHeader::parse(&bytes, size)
    }

    /// Walk the IFD chain and return the raw IFDs.
    pub async fn read_ifds(
        reader: &dyn RangeReader,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let size = reader.size();
        let mut ifds = Vec::new();
        let mut visited = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 {
            if offset >= size || !visited.insert(offset) || ifds.len() >= MAX_IFDS {
                return Err(TiffError::InvalidIfdOffset(offset));
            }

            let count_size = header.ifd_count_size() as u64;
            if offset + count_size > size {
                return Err(TiffError::InvalidIfdOffset(offset));
            }
            let count_bytes = reader.read_exact_at(offset, count_size as usize).await?;
            let entry_count = Ifd::entry_count(&count_bytes, header)?;

            let ifd_size = Ifd::calculate_size(entry_count, header)
                .filter(|ifd_size| offset.checked_add(*ifd_size).is_some_and(|end| end <= size))
                .ok_or(TiffError::InvalidIfdOffset(offset))?;
            let ifd_bytes = reader.read_exact_at(offset, ifd_size as usize).await?;
            let ifd = Ifd::parse(offset, &ifd_bytes, header)?;

            debug!(
                index = ifds.len(),
                offset,
                entries = ifd.entries.len(),
                "read IFD"
            );

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    /// Byte order of an already-opened file.
    pub async fn byte_order(reader: &dyn RangeReader) -> Result<ByteOrder, TiffError> {
        Ok(Self::read_header(reader).await?.byte_order)
    }
}

#[async_trait]
impl DirectoryReader for TiffDirectoryReader {
    async fn read_directories(
        &self,
        reader: &dyn RangeReader,
    ) -> Result<Vec<ImageFileDirectory>, TiffError> {
        let header = Self::read_header(reader).await?;
        let ifds = Self::read_ifds(reader, &header).await?;
        let values = ValueReader::new(reader, &header);

        let mut directories = Vec::with_capacity(ifds.len());
        for ifd in &ifds {
            directories.push(ImageFileDirectory::from_ifd(ifd, &values).await?);
        }

        debug!(
            source = reader.identifier(),
            bigtiff = header.is_bigtiff,
            count = directories.len(),
            "read directories"
        );
        Ok(directories)
    }
}

// =============================================================================
// Tests
// =============================================================================
