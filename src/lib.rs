//! # virtual-tiff
//!
//! Translate TIFF and GeoTIFF image file directories into virtual chunked
//! array descriptors.
//!
//! A virtual array references the tiles or strips of an existing file in
//! place: for every chunk it records the byte range in the source file, and
//! for the array as a whole it records the data type, the chunk grid and the
//! codec pipeline needed to decode those bytes. Only the header and the IFDs
//! are read; pixel data is never fetched or decoded.
//!
//! ## Features
//!
//! - **Range-based reads**: Only the bytes of the header and IFDs are fetched,
//!   locally or from S3, through an LRU block cache
//! - **TIFF and BigTIFF**: Little- and big-endian, classic and 64-bit offsets
//! - **GeoTIFF**: GeoKeys, model tie points and pixel scale, GDAL metadata
//! - **Irregular strips**: A short final strip yields a rectilinear chunk grid
//!
//! ## Architecture
//!
//! - [`io`] - Range readers for S3 and local files, plus block caching
//! - [`tiff`] - Header parsing, IFD chain walking and typed tag values
//! - [`translate`] - Data types, chunk geometry, codecs, manifests and groups
//! - [`config`] - CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use virtual_tiff::{GroupLayout, LocalRangeReader, TiffDirectoryReader, VirtualTiff};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader = LocalRangeReader::open("scene.tif").await?;
//!     let group = VirtualTiff::new()
//!         .with_layout(GroupLayout::Flat)
//!         .translate(&reader, &TiffDirectoryReader)
//!         .await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&group.to_json(true)?)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod tiff;
pub mod translate;

// Re-export commonly used types
pub use config::{Config, Source};
pub use error::{IoError, TiffError, TranslateError};
pub use io::{
    create_s3_client, BlockCache, LocalRangeReader, RangeReader, S3Location, S3RangeReader,
    DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY,
};
pub use tiff::{
    ByteOrder, DirectoryReader, GeoKeyDirectory, ImageFileDirectory, TagValue,
    TiffDirectoryReader, TiffTag,
};
pub use translate::{
    ChunkGrid, ChunkManifest, CodecPipeline, GroupLayout, ScalarType, VirtualArrayDescriptor,
    VirtualGroupDescriptor, VirtualTiff,
};
