//! IFD to virtual array translation.
//!
//! Each image file directory becomes a [`VirtualArrayDescriptor`]: a shape,
//! a data type, a chunk grid, a codec pipeline and a manifest of byte ranges
//! into the source file. No pixel data is read or decoded.
//!
//! # Pipeline
//!
//! For every selected IFD, [`VirtualTiff`] runs:
//!
//! 1. Feature checks: sub-IFDs and colour-converted photometric
//!    interpretations are rejected up front.
//! 2. [`ScalarType::resolve`]: SampleFormat and BitsPerSample to a data type.
//! 3. [`resolve_layout`]: tile or strip tags to a [`ChunkGrid`].
//! 4. [`CodecPipeline::assemble`]: predictor, planar configuration and
//!    compression to an ordered codec list.
//! 5. [`extract_attributes`]: GeoKeys and GDAL metadata to attributes.
//! 6. [`ChunkManifest::build`]: offsets and byte counts onto the grid.

mod attributes;
mod codecs;
mod descriptor;
mod dtype;
mod geometry;
mod manifest;
mod translator;

pub use attributes::{extract_attributes, parse_gdal_metadata, Attributes};
pub use codecs::{
    ArrayToArrayCodec, ArrayToBytesCodec, BytesConfiguration, BytesToBytesCodec, Codec,
    CodecMetadata, CodecPipeline, Compressor, FloatPredictorConfiguration,
    TransposeConfiguration, ZstdConfiguration, DEFAULT_ZSTD_LEVEL, IMAGECODECS_PREFIX,
};
pub use descriptor::{
    dimension_names, ArrayMetadata, ChunkKeyEncoding, GroupLayout, NodeType,
    VirtualArrayDescriptor, VirtualGroupDescriptor,
};
pub use dtype::{Endianness, ScalarKind, ScalarType};
pub use geometry::{
    resolve_layout, ChunkEdgeLengths, ChunkGrid, ChunkGridMetadata, ChunkLayout,
    RectilinearConfiguration, RunLengthElement,
};
pub use manifest::{ChunkManifest, ChunkManifestEntry};
pub use translator::{sniff_byte_order, translate_directory, VirtualTiff};
