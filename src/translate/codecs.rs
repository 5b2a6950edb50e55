//! Codec pipelines that undo TIFF predictors, interleaving and compression.
//!
//! The pipeline is only described here, never executed. Stages follow the
//! array metadata convention: array->array codecs, one array->bytes codec,
//! then bytes->bytes codecs. Decoders apply them in reverse.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TranslateError;
use crate::tiff::ImageFileDirectory;

use super::dtype::{Endianness, ScalarType};
use super::geometry::ChunkLayout;

/// Prefix of codec names served by the imagecodecs package.
pub const IMAGECODECS_PREFIX: &str = "imagecodecs_";

/// ZSTD level GDAL uses when the level tag is absent.
pub const DEFAULT_ZSTD_LEVEL: i32 = 9;

// =============================================================================
// Metadata
// =============================================================================

/// A codec as it appears in array metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Map<String, Value>>,
}

impl CodecMetadata {
    fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            configuration: None,
        }
    }

    fn with<T: Serialize>(name: &str, configuration: &T) -> Self {
        let configuration = match serde_json::to_value(configuration) {
            Ok(Value::Object(map)) if !map.is_empty() => Some(map),
            _ => None,
        };
        Self {
            name: name.to_string(),
            configuration,
        }
    }

    /// Parse the configuration into `T`, treating a missing one as empty.
    fn parse<T: DeserializeOwned>(&self) -> Result<T, TranslateError> {
        let map = self.configuration.clone().unwrap_or_default();
        serde_json::from_value(Value::Object(map)).map_err(|e| TranslateError::InvalidConfiguration {
            name: self.name.clone(),
            message: e.to_string(),
        })
    }
}

// =============================================================================
// Configurations
// =============================================================================

/// Configuration of the `bytes` and `ChunkyCodec` codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BytesConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endian: Option<Endianness>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransposeConfiguration {
    pub order: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FloatPredictorConfiguration {
    /// NumPy type string of the samples, e.g. `<f4`
    pub dtype: String,
    /// Nominal chunk shape
    pub shape: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZstdConfiguration {
    pub level: i32,
}

impl Default for ZstdConfiguration {
    fn default() -> Self {
        Self {
            level: DEFAULT_ZSTD_LEVEL,
        }
    }
}

/// Configuration for compressors that take no parameters beyond their id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptyConfiguration {}

// =============================================================================
// Codecs
// =============================================================================

/// Codecs that map an array to an array of the same shape and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayToArrayCodec {
    /// Reverses TIFF predictor 2 with a cumulative sum along x
    HorizontalDelta,
    /// Reverses TIFF predictor 3 (byte shuffled float differencing)
    FloatPredictor(FloatPredictorConfiguration),
    /// Permutes axes
    Transpose(TransposeConfiguration),
}

/// Codecs that turn raw bytes into an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayToBytesCodec {
    /// Plain C-order packing
    Bytes(BytesConfiguration),
    /// Band-interleaved packing of chunky multi-sample pixels
    Chunky(BytesConfiguration),
}

impl ArrayToBytesCodec {
    pub fn endian(&self) -> Option<Endianness> {
        match self {
            ArrayToBytesCodec::Bytes(c) | ArrayToBytesCodec::Chunky(c) => c.endian,
        }
    }
}

/// Compressors from the TIFF Compression tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    Lzw,
    Jpeg8,
    Zlib,
    PackBits,
    Deflate,
    Lerc,
    Lzma,
    Png,
    JpegXr,
    Zstd(ZstdConfiguration),
    Webp,
    JpegXl,
}

impl Compressor {
    /// Resolve a Compression tag value. Value 1 (none) is not a compressor.
    pub fn from_tag(compression: u16, ifd: &ImageFileDirectory) -> Result<Self, TranslateError> {
        let compressor = match compression {
            5 => Compressor::Lzw,
            7 => Compressor::Jpeg8,
            8 => Compressor::Zlib,
            32773 => Compressor::PackBits,
            32946 => Compressor::Deflate,
            34887 => Compressor::Lerc,
            34925 => Compressor::Lzma,
            34933 => Compressor::Png,
            34934 => Compressor::JpegXr,
            50000 => Compressor::Zstd(ZstdConfiguration {
                level: ifd.zstd_level.unwrap_or(DEFAULT_ZSTD_LEVEL),
            }),
            50001 => Compressor::Webp,
            50002 | 52546 => Compressor::JpegXl,
            other => return Err(TranslateError::UnrecognizedCompression(other)),
        };

        if ifd.jpeg_tables.as_ref().is_some_and(|t| !t.is_empty()) {
            return Err(TranslateError::unsupported(
                "JPEG compression with quantization tables is not yet supported.",
            ));
        }

        Ok(compressor)
    }

    /// Codec id without the imagecodecs prefix.
    pub const fn id(&self) -> &'static str {
        match self {
            Compressor::Lzw => "lzw",
            Compressor::Jpeg8 => "jpeg8",
            Compressor::Zlib => "zlib",
            Compressor::PackBits => "packbits",
            Compressor::Deflate => "deflate",
            Compressor::Lerc => "lerc",
            Compressor::Lzma => "lzma",
            Compressor::Png => "png",
            Compressor::JpegXr => "jpegxr",
            Compressor::Zstd(_) => "zstd",
            Compressor::Webp => "webp",
            Compressor::JpegXl => "jpegxl",
        }
    }

    /// Full codec name, e.g. `imagecodecs_zstd`.
    pub fn name(&self) -> String {
        format!("{}{}", IMAGECODECS_PREFIX, self.id())
    }

    fn from_id(id: &str, metadata: &CodecMetadata) -> Result<Self, TranslateError> {
        let bare = |c: Compressor| -> Result<Self, TranslateError> {
            metadata.parse::<EmptyConfiguration>()?;
            Ok(c)
        };

        match id {
            "lzw" => bare(Compressor::Lzw),
            "jpeg8" => bare(Compressor::Jpeg8),
            "zlib" => bare(Compressor::Zlib),
            "packbits" => bare(Compressor::PackBits),
            "deflate" => bare(Compressor::Deflate),
            "lerc" => bare(Compressor::Lerc),
            "lzma" => bare(Compressor::Lzma),
            "png" => bare(Compressor::Png),
            "jpegxr" => bare(Compressor::JpegXr),
            "zstd" => Ok(Compressor::Zstd(metadata.parse()?)),
            "webp" => bare(Compressor::Webp),
            "jpegxl" => bare(Compressor::JpegXl),
            _ => Err(TranslateError::UnrecognizedCodec(metadata.name.clone())),
        }
    }

    fn configuration(&self) -> Map<String, Value> {
        let value = match self {
            Compressor::Zstd(config) => serde_json::to_value(config),
            _ => serde_json::to_value(EmptyConfiguration {}),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Codecs that map bytes to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesToBytesCodec {
    /// Trims decoded buffers of short edge chunks in rectilinear grids
    Truncate,
    Compressor(Compressor),
}

/// Any codec, tagged with its stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    ArrayToArray(ArrayToArrayCodec),
    ArrayToBytes(ArrayToBytesCodec),
    BytesToBytes(BytesToBytesCodec),
}

const HORIZONTAL_DELTA: &str = "HorizontalDeltaCodec";
const CHUNKY: &str = "ChunkyCodec";
const TRUNCATE: &str = "TruncateCodec";
const BYTES: &str = "bytes";
const TRANSPOSE: &str = "transpose";
const FLOAT_PREDICTOR_ID: &str = "floatpred";

impl Codec {
    /// Codec name as written to metadata.
    pub fn name(&self) -> String {
        match self {
            Codec::ArrayToArray(ArrayToArrayCodec::HorizontalDelta) => HORIZONTAL_DELTA.to_string(),
            Codec::ArrayToArray(ArrayToArrayCodec::FloatPredictor(_)) => {
                format!("{}{}", IMAGECODECS_PREFIX, FLOAT_PREDICTOR_ID)
            }
            Codec::ArrayToArray(ArrayToArrayCodec::Transpose(_)) => TRANSPOSE.to_string(),
            Codec::ArrayToBytes(ArrayToBytesCodec::Bytes(_)) => BYTES.to_string(),
            Codec::ArrayToBytes(ArrayToBytesCodec::Chunky(_)) => CHUNKY.to_string(),
            Codec::BytesToBytes(BytesToBytesCodec::Truncate) => TRUNCATE.to_string(),
            Codec::BytesToBytes(BytesToBytesCodec::Compressor(c)) => c.name(),
        }
    }

    /// Named configuration for array metadata.
    pub fn to_metadata(&self) -> CodecMetadata {
        let name = self.name();
        match self {
            Codec::ArrayToArray(ArrayToArrayCodec::HorizontalDelta)
            | Codec::BytesToBytes(BytesToBytesCodec::Truncate) => CodecMetadata::bare(&name),
            Codec::ArrayToArray(ArrayToArrayCodec::FloatPredictor(config)) => {
                with_id(CodecMetadata::with(&name, config), FLOAT_PREDICTOR_ID)
            }
            Codec::ArrayToArray(ArrayToArrayCodec::Transpose(config)) => {
                CodecMetadata::with(&name, config)
            }
            Codec::ArrayToBytes(ArrayToBytesCodec::Bytes(config))
            | Codec::ArrayToBytes(ArrayToBytesCodec::Chunky(config)) => {
                CodecMetadata::with(&name, config)
            }
            Codec::BytesToBytes(BytesToBytesCodec::Compressor(c)) => {
                let mut configuration = c.configuration();
                configuration.insert("id".to_string(), Value::from(c.id()));
                CodecMetadata {
                    name,
                    configuration: Some(configuration),
                }
            }
        }
    }

    /// Rebuild a codec from its named configuration.
    ///
    /// Prefixed codecs carry an `id` that must match the name.
    pub fn from_metadata(metadata: &CodecMetadata) -> Result<Self, TranslateError> {
        if let Some(id) = metadata.name.strip_prefix(IMAGECODECS_PREFIX) {
            let stripped = strip_id(metadata, id)?;
            if id == FLOAT_PREDICTOR_ID {
                return Ok(Codec::ArrayToArray(ArrayToArrayCodec::FloatPredictor(
                    stripped.parse()?,
                )));
            }
            return Ok(Codec::BytesToBytes(BytesToBytesCodec::Compressor(
                Compressor::from_id(id, &stripped)?,
            )));
        }

        let codec = match metadata.name.as_str() {
            HORIZONTAL_DELTA => {
                metadata.parse::<EmptyConfiguration>()?;
                Codec::ArrayToArray(ArrayToArrayCodec::HorizontalDelta)
            }
            TRANSPOSE => Codec::ArrayToArray(ArrayToArrayCodec::Transpose(metadata.parse()?)),
            BYTES => Codec::ArrayToBytes(ArrayToBytesCodec::Bytes(metadata.parse()?)),
            CHUNKY => Codec::ArrayToBytes(ArrayToBytesCodec::Chunky(metadata.parse()?)),
            TRUNCATE => {
                metadata.parse::<EmptyConfiguration>()?;
                Codec::BytesToBytes(BytesToBytesCodec::Truncate)
            }
            _ => return Err(TranslateError::UnrecognizedCodec(metadata.name.clone())),
        };
        Ok(codec)
    }
}

impl Codec {
    /// Forward transform of one chunk. Writing is never supported.
    pub fn encode(&self, _chunk: Bytes) -> Result<Bytes, TranslateError> {
        Err(TranslateError::NotImplemented(format!(
            "Encoding with {}",
            self.name()
        )))
    }

    /// Reverse transform of one chunk.
    ///
    /// The transforms themselves live in the codec registry that consumes the
    /// array metadata; here the codec is only named and configured.
    pub fn decode(&self, _chunk: Bytes) -> Result<Bytes, TranslateError> {
        Err(TranslateError::NotImplemented(format!(
            "Decoding with {} outside the codec registry",
            self.name()
        )))
    }
}

fn with_id(mut metadata: CodecMetadata, id: &str) -> CodecMetadata {
    metadata
        .configuration
        .get_or_insert_with(Map::new)
        .insert("id".to_string(), Value::from(id));
    metadata
}

/// Check and remove the `id` key of a prefixed codec's configuration.
fn strip_id(metadata: &CodecMetadata, expected: &str) -> Result<CodecMetadata, TranslateError> {
    let mut configuration = metadata.configuration.clone().unwrap_or_default();
    if let Some(found) = configuration.remove("id") {
        if found.as_str() != Some(expected) {
            return Err(TranslateError::ConfigurationMismatch {
                expected: expected.to_string(),
                found: found.as_str().map_or_else(|| found.to_string(), str::to_string),
            });
        }
    }
    Ok(CodecMetadata {
        name: metadata.name.clone(),
        configuration: Some(configuration),
    })
}

// =============================================================================
// CodecPipeline
// =============================================================================

/// The full, ordered codec chain of an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecPipeline {
    pub array_to_array: Vec<ArrayToArrayCodec>,
    pub array_to_bytes: ArrayToBytesCodec,
    pub bytes_to_bytes: Vec<BytesToBytesCodec>,
}

impl CodecPipeline {
    /// Derive the pipeline for an IFD from its predictor, planar
    /// configuration and compression tags.
    pub fn assemble(
        ifd: &ImageFileDirectory,
        dtype: &ScalarType,
        layout: &ChunkLayout,
    ) -> Result<Self, TranslateError> {
        let mut array_to_array = Vec::new();
        match ifd.predictor {
            1 => {}
            2 => array_to_array.push(ArrayToArrayCodec::HorizontalDelta),
            3 => array_to_array.push(ArrayToArrayCodec::FloatPredictor(
                FloatPredictorConfiguration {
                    dtype: dtype.numpy_str(),
                    shape: layout.grid.chunk_shape(),
                },
            )),
            other => {
                return Err(TranslateError::unsupported(format!(
                    "TIFF predictor {} is not supported.",
                    other
                )))
            }
        }

        let bytes_config = BytesConfiguration {
            endian: dtype.endian,
        };
        let array_to_bytes = if ifd.planar_configuration == 1 && ifd.samples_per_pixel > 1 {
            let ndim = layout.shape.len();
            let order = std::iter::once(0).chain((1..ndim).rev()).collect();
            array_to_array.push(ArrayToArrayCodec::Transpose(TransposeConfiguration { order }));
            ArrayToBytesCodec::Chunky(bytes_config)
        } else {
            ArrayToBytesCodec::Bytes(bytes_config)
        };

        let mut bytes_to_bytes = Vec::new();
        if layout.grid.is_rectilinear() {
            bytes_to_bytes.push(BytesToBytesCodec::Truncate);
        }
        if ifd.compression != 1 {
            bytes_to_bytes.push(BytesToBytesCodec::Compressor(Compressor::from_tag(
                ifd.compression,
                ifd,
            )?));
        }

        Ok(Self {
            array_to_array,
            array_to_bytes,
            bytes_to_bytes,
        })
    }

    /// The compressor, if the data is compressed.
    pub fn compressor(&self) -> Option<&Compressor> {
        self.bytes_to_bytes.iter().find_map(|c| match c {
            BytesToBytesCodec::Compressor(c) => Some(c),
            BytesToBytesCodec::Truncate => None,
        })
    }

    /// All codecs in encode order.
    pub fn codecs(&self) -> Vec<Codec> {
        self.array_to_array
            .iter()
            .cloned()
            .map(Codec::ArrayToArray)
            .chain(std::iter::once(Codec::ArrayToBytes(self.array_to_bytes)))
            .chain(self.bytes_to_bytes.iter().copied().map(Codec::BytesToBytes))
            .collect()
    }

    /// Run every codec forward, in encode order.
    pub fn encode(&self, chunk: Bytes) -> Result<Bytes, TranslateError> {
        self.codecs()
            .iter()
            .try_fold(chunk, |chunk, codec| codec.encode(chunk))
    }

    /// Run every codec in reverse, starting from the last bytes codec.
    pub fn decode(&self, chunk: Bytes) -> Result<Bytes, TranslateError> {
        self.codecs()
            .iter()
            .rev()
            .try_fold(chunk, |chunk, codec| codec.decode(chunk))
    }

    pub fn to_metadata(&self) -> Vec<CodecMetadata> {
        self.codecs().iter().map(Codec::to_metadata).collect()
    }

    /// Rebuild a pipeline, checking stage order and that exactly one
    /// array->bytes codec is present.
    pub fn from_metadata(metadata: &[CodecMetadata]) -> Result<Self, TranslateError> {
        let mut array_to_array = Vec::new();
        let mut array_to_bytes = None;
        let mut bytes_to_bytes = Vec::new();

        for entry in metadata {
            match Codec::from_metadata(entry)? {
                Codec::ArrayToArray(c) if array_to_bytes.is_none() => array_to_array.push(c),
                Codec::ArrayToBytes(c) if array_to_bytes.is_none() => array_to_bytes = Some(c),
                Codec::BytesToBytes(c) if array_to_bytes.is_some() => bytes_to_bytes.push(c),
                _ => {
                    return Err(TranslateError::invariant(format!(
                        "Codec {} is out of order in the codec pipeline.",
                        entry.name
                    )))
                }
            }
        }

        let array_to_bytes = array_to_bytes.ok_or_else(|| {
            TranslateError::invariant("The codec pipeline has no array to bytes codec.")
        })?;
        Ok(Self {
            array_to_array,
            array_to_bytes,
            bytes_to_bytes,
        })
    }
}
