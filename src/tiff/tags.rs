//! TIFF tag and field type definitions.
//!
//! This module defines the vocabulary the directory reader understands:
//! - Field types that determine how values are encoded
//! - Tag ids for baseline, GeoTIFF and GDAL tags
//! - Photometric interpretation codes
//!
//! Tags not listed here are still read; they end up in the directory's
//! `other_tags` map keyed by their numeric id.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// Encoding of the values in an IFD entry.
///
/// The size of a single value decides whether an entry's value fits inline in
/// the IFD entry or lives elsewhere in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer
    Byte = 1,
    /// 8-bit ASCII character, NUL terminated
    Ascii = 2,
    /// Unsigned 16-bit integer
    Short = 3,
    /// Unsigned 32-bit integer
    Long = 4,
    /// Two LONGs: numerator and denominator
    Rational = 5,
    /// Signed 8-bit integer
    SByte = 6,
    /// Opaque byte data
    Undefined = 7,
    /// Signed 16-bit integer
    SShort = 8,
    /// Signed 32-bit integer
    SLong = 9,
    /// Two SLONGs: numerator and denominator
    SRational = 10,
    /// IEEE single precision float
    Float = 11,
    /// IEEE double precision float
    Double = 12,
    /// 32-bit IFD offset
    Ifd = 13,
    /// Unsigned 64-bit integer (BigTIFF)
    Long8 = 16,
    /// Signed 64-bit integer (BigTIFF)
    SLong8 = 17,
    /// 64-bit IFD offset (BigTIFF)
    Ifd8 = 18,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float | FieldType::Ifd => 4,
            FieldType::Rational
            | FieldType::SRational
            | FieldType::Double
            | FieldType::Long8
            | FieldType::SLong8
            | FieldType::Ifd8 => 8,
        }
    }

    /// Field type for a type code, `None` if the code is unknown.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            6 => Some(FieldType::SByte),
            7 => Some(FieldType::Undefined),
            8 => Some(FieldType::SShort),
            9 => Some(FieldType::SLong),
            10 => Some(FieldType::SRational),
            11 => Some(FieldType::Float),
            12 => Some(FieldType::Double),
            13 => Some(FieldType::Ifd),
            16 => Some(FieldType::Long8),
            17 => Some(FieldType::SLong8),
            18 => Some(FieldType::Ifd8),
            _ => None,
        }
    }

    /// Maximum bytes stored inline in a classic TIFF entry.
    pub const INLINE_THRESHOLD_TIFF: usize = 4;

    /// Maximum bytes stored inline in a BigTIFF entry.
    pub const INLINE_THRESHOLD_BIGTIFF: usize = 8;

    /// Check if `count` values of this type fit in the entry's value field.
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let capacity = if is_bigtiff {
            Self::INLINE_THRESHOLD_BIGTIFF
        } else {
            Self::INLINE_THRESHOLD_TIFF
        };
        // Saturate so a corrupt count can never wrap into "inline"
        (self.size_in_bytes() as u64).saturating_mul(count) <= capacity as u64
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// Tag ids the directory reader maps onto typed directory fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    // -------------------------------------------------------------------------
    // Image structure
    // -------------------------------------------------------------------------
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    SamplesPerPixel = 277,
    PlanarConfiguration = 284,
    Predictor = 317,
    SampleFormat = 339,

    // -------------------------------------------------------------------------
    // Strips
    // -------------------------------------------------------------------------
    StripOffsets = 273,
    RowsPerStrip = 278,
    StripByteCounts = 279,

    // -------------------------------------------------------------------------
    // Tiles
    // -------------------------------------------------------------------------
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,

    // -------------------------------------------------------------------------
    // Auxiliary directories and JPEG
    // -------------------------------------------------------------------------
    /// Offsets of child IFDs (reduced resolutions, masks)
    SubIfds = 330,

    /// Shared quantization and Huffman tables for abbreviated JPEG streams
    JpegTables = 347,

    // -------------------------------------------------------------------------
    // GeoTIFF
    // -------------------------------------------------------------------------
    ModelPixelScale = 33550,
    ModelTiepoint = 33922,
    GeoKeyDirectory = 34735,
    GeoDoubleParams = 34736,
    GeoAsciiParams = 34737,

    // -------------------------------------------------------------------------
    // GDAL private tags
    // -------------------------------------------------------------------------
    /// XML `<GDALMetadata>` blob
    GdalMetadata = 42112,

    /// Nodata value as an ASCII string
    GdalNodata = 42113,
}

/// GDAL's ZSTD_LEVEL pseudo-tag.
///
/// The id does not fit a 16-bit IFD entry, so it never appears in a file.
/// Directory readers that know the writer settings report it through
/// [`ImageFileDirectory::zstd_level`](super::ImageFileDirectory::zstd_level).
pub const ZSTD_LEVEL_TAG: u32 = 65564;

impl TiffTag {
    /// Create a TiffTag from its numeric value.
    ///
    /// Returns `None` for tags the reader does not map to a typed field.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            256 => Some(TiffTag::ImageWidth),
            257 => Some(TiffTag::ImageLength),
            258 => Some(TiffTag::BitsPerSample),
            259 => Some(TiffTag::Compression),
            262 => Some(TiffTag::PhotometricInterpretation),
            273 => Some(TiffTag::StripOffsets),
            277 => Some(TiffTag::SamplesPerPixel),
            278 => Some(TiffTag::RowsPerStrip),
            279 => Some(TiffTag::StripByteCounts),
            284 => Some(TiffTag::PlanarConfiguration),
            317 => Some(TiffTag::Predictor),
            322 => Some(TiffTag::TileWidth),
            323 => Some(TiffTag::TileLength),
            324 => Some(TiffTag::TileOffsets),
            325 => Some(TiffTag::TileByteCounts),
            330 => Some(TiffTag::SubIfds),
            339 => Some(TiffTag::SampleFormat),
            347 => Some(TiffTag::JpegTables),
            33550 => Some(TiffTag::ModelPixelScale),
            33922 => Some(TiffTag::ModelTiepoint),
            34735 => Some(TiffTag::GeoKeyDirectory),
            34736 => Some(TiffTag::GeoDoubleParams),
            34737 => Some(TiffTag::GeoAsciiParams),
            42112 => Some(TiffTag::GdalMetadata),
            42113 => Some(TiffTag::GdalNodata),
            _ => None,
        }
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Tag name as used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::PhotometricInterpretation => "PhotometricInterpretation",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::Predictor => "Predictor",
            TiffTag::SampleFormat => "SampleFormat",
            TiffTag::StripOffsets => "StripOffsets",
            TiffTag::RowsPerStrip => "RowsPerStrip",
            TiffTag::StripByteCounts => "StripByteCounts",
            TiffTag::TileWidth => "TileWidth",
            TiffTag::TileLength => "TileLength",
            TiffTag::TileOffsets => "TileOffsets",
            TiffTag::TileByteCounts => "TileByteCounts",
            TiffTag::SubIfds => "SubIFDs",
            TiffTag::JpegTables => "JPEGTables",
            TiffTag::ModelPixelScale => "ModelPixelScale",
            TiffTag::ModelTiepoint => "ModelTiepoint",
            TiffTag::GeoKeyDirectory => "GeoKeyDirectory",
            TiffTag::GeoDoubleParams => "GeoDoubleParams",
            TiffTag::GeoAsciiParams => "GeoAsciiParams",
            TiffTag::GdalMetadata => "GDAL_METADATA",
            TiffTag::GdalNodata => "GDAL_NODATA",
        }
    }
}

// =============================================================================
// Photometric Interpretation
// =============================================================================

/// PhotometricInterpretation codes from TIFF 6.0 and its extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PhotometricInterpretation {
    WhiteIsZero = 0,
    BlackIsZero = 1,
    Rgb = 2,
    RgbPalette = 3,
    TransparencyMask = 4,
    Cmyk = 5,
    YCbCr = 6,
    CieLab = 8,
    IccLab = 9,
    ItuLab = 10,
}

impl PhotometricInterpretation {
    /// Create a PhotometricInterpretation from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::WhiteIsZero),
            1 => Some(Self::BlackIsZero),
            2 => Some(Self::Rgb),
            3 => Some(Self::RgbPalette),
            4 => Some(Self::TransparencyMask),
            5 => Some(Self::Cmyk),
            6 => Some(Self::YCbCr),
            8 => Some(Self::CieLab),
            9 => Some(Self::IccLab),
            10 => Some(Self::ItuLab),
            _ => None,
        }
    }

    /// Name used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::WhiteIsZero => "WhiteIsZero",
            Self::BlackIsZero => "BlackIsZero",
            Self::Rgb => "RGB",
            Self::RgbPalette => "RGBPalette",
            Self::TransparencyMask => "TransparencyMask",
            Self::Cmyk => "CMYK",
            Self::YCbCr => "YCbCr",
            Self::CieLab => "CIELab",
            Self::IccLab => "ICCLab",
            Self::ItuLab => "ITULab",
        }
    }

    /// Whether pixel bytes need a colour space conversion before they can be
    /// exposed as plain samples.
    pub const fn needs_color_conversion(self) -> bool {
        matches!(self, Self::YCbCr | Self::CieLab | Self::IccLab | Self::ItuLab)
    }
}

// =============================================================================
// Tests
// =============================================================================
