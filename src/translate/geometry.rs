//! Chunk geometry: how an IFD's tiles or strips partition the array.

use serde::{Deserialize, Serialize};

use crate::error::TranslateError;
use crate::tiff::ImageFileDirectory;

use super::manifest::NO_OFFSETS_MESSAGE;

// =============================================================================
// ChunkGrid
// =============================================================================

/// How an array is split into chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkGrid {
    /// Every chunk has this shape; edge chunks may extend past the array.
    Regular(Vec<u64>),

    /// Explicit block sizes per axis. Each axis' blocks sum to its extent.
    Rectilinear(Vec<Vec<u64>>),
}

impl ChunkGrid {
    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        match self {
            ChunkGrid::Regular(shape) => shape.len(),
            ChunkGrid::Rectilinear(blocks) => blocks.len(),
        }
    }

    pub fn is_rectilinear(&self) -> bool {
        matches!(self, ChunkGrid::Rectilinear(_))
    }

    /// Nominal chunk shape: the regular shape, or the largest block per axis.
    ///
    /// This is the buffer shape decoders produce before truncation.
    pub fn chunk_shape(&self) -> Vec<u64> {
        match self {
            ChunkGrid::Regular(shape) => shape.clone(),
            ChunkGrid::Rectilinear(blocks) => blocks
                .iter()
                .map(|axis| axis.iter().copied().max().unwrap_or(0))
                .collect(),
        }
    }

    /// Number of chunks along each axis for an array of `shape`.
    pub fn grid_shape(&self, shape: &[u64]) -> Vec<u64> {
        match self {
            ChunkGrid::Regular(chunks) => shape
                .iter()
                .zip(chunks)
                .map(|(extent, chunk)| if *chunk == 0 { 0 } else { extent.div_ceil(*chunk) })
                .collect(),
            ChunkGrid::Rectilinear(blocks) => blocks.iter().map(|axis| axis.len() as u64).collect(),
        }
    }

    /// Prepend a leading axis of `extent` split into chunks of `chunk`.
    pub fn with_leading_axis(self, extent: u64, chunk: u64) -> Self {
        match self {
            ChunkGrid::Regular(mut shape) => {
                shape.insert(0, chunk);
                ChunkGrid::Regular(shape)
            }
            ChunkGrid::Rectilinear(mut blocks) => {
                let count = if chunk == 0 { 0 } else { extent / chunk };
                blocks.insert(0, vec![chunk; count as usize]);
                ChunkGrid::Rectilinear(blocks)
            }
        }
    }

    /// Serializable chunk grid metadata.
    pub fn to_metadata(&self) -> ChunkGridMetadata {
        match self {
            ChunkGrid::Regular(shape) => ChunkGridMetadata::Regular {
                chunk_shape: shape.clone(),
            },
            ChunkGrid::Rectilinear(blocks) => {
                ChunkGridMetadata::Rectilinear(RectilinearConfiguration::Inline {
                    chunk_shapes: blocks.iter().map(|axis| ChunkEdgeLengths::encode(axis)).collect(),
                })
            }
        }
    }

    /// Rebuild a grid from metadata. `shape` expands scalar rectilinear axes.
    pub fn from_metadata(
        metadata: &ChunkGridMetadata,
        shape: &[u64],
    ) -> Result<Self, TranslateError> {
        match metadata {
            ChunkGridMetadata::Regular { chunk_shape } => Ok(ChunkGrid::Regular(chunk_shape.clone())),
            ChunkGridMetadata::Rectilinear(RectilinearConfiguration::Inline { chunk_shapes }) => {
                if chunk_shapes.len() != shape.len() {
                    return Err(TranslateError::invariant(format!(
                        "Chunk grid has {} dimensions but the array has {}.",
                        chunk_shapes.len(),
                        shape.len()
                    )));
                }
                let blocks = chunk_shapes
                    .iter()
                    .zip(shape)
                    .map(|(edges, extent)| edges.decode(*extent))
                    .collect();
                Ok(ChunkGrid::Rectilinear(blocks))
            }
        }
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// `chunk_grid` entry of array metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "configuration", rename_all = "lowercase")]
pub enum ChunkGridMetadata {
    Regular { chunk_shape: Vec<u64> },
    Rectilinear(RectilinearConfiguration),
}

/// Configuration of a rectilinear chunk grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RectilinearConfiguration {
    Inline { chunk_shapes: Vec<ChunkEdgeLengths> },
}

/// One element of a run-length encoded block list: `n` or `[n, repeat]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunLengthElement {
    Repeated([u64; 2]),
    Single(u64),
}

/// Block sizes for one axis of a rectilinear grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkEdgeLengths {
    /// Explicit, run-length encoded sizes
    Varying(Vec<RunLengthElement>),
    /// Fixed size chunks covering the axis
    Scalar(u64),
}

impl ChunkEdgeLengths {
    /// Encode an axis: uniform axes become a scalar, the rest are run-length encoded.
    pub fn encode(blocks: &[u64]) -> Self {
        match blocks.first() {
            Some(first) if blocks.iter().all(|b| b == first) => ChunkEdgeLengths::Scalar(*first),
            _ => {
                let mut runs: Vec<(u64, u64)> = Vec::new();
                for &block in blocks {
                    match runs.last_mut() {
                        Some((size, n)) if *size == block => *n += 1,
                        _ => runs.push((block, 1)),
                    }
                }
                ChunkEdgeLengths::Varying(
                    runs.into_iter()
                        .map(|(size, n)| {
                            if n == 1 {
                                RunLengthElement::Single(size)
                            } else {
                                RunLengthElement::Repeated([size, n])
                            }
                        })
                        .collect(),
                )
            }
        }
    }

    /// Expand to explicit block sizes for an axis of length `extent`.
    pub fn decode(&self, extent: u64) -> Vec<u64> {
        match self {
            ChunkEdgeLengths::Scalar(0) => Vec::new(),
            ChunkEdgeLengths::Scalar(size) => {
                let mut blocks = vec![*size; (extent / size) as usize];
                if extent % size > 0 {
                    blocks.push(extent % size);
                }
                blocks
            }
            ChunkEdgeLengths::Varying(runs) => runs
                .iter()
                .flat_map(|run| match run {
                    RunLengthElement::Single(size) => vec![*size],
                    RunLengthElement::Repeated([size, n]) => vec![*size; *n as usize],
                })
                .collect(),
        }
    }
}

// =============================================================================
// Layout resolution
// =============================================================================

/// Array shape, chunk grid and per-chunk byte ranges derived from one IFD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLayout {
    /// `[band,] y, x`
    pub shape: Vec<u64>,
    pub grid: ChunkGrid,
    /// One offset per chunk, in TIFF storage order
    pub offsets: Vec<u64>,
    /// One byte count per chunk, in TIFF storage order
    pub byte_counts: Vec<u64>,
}

impl ChunkLayout {
    /// Whether a leading band dimension was added.
    pub fn has_band_dimension(&self) -> bool {
        self.shape.len() == 3
    }
}

/// Derive the chunk layout of an IFD from its tile or strip tags.
///
/// Tiles win when both tile dimensions are present. Strips without
/// RowsPerStrip cover the whole image in one strip.
pub fn resolve_layout(ifd: &ImageFileDirectory) -> Result<ChunkLayout, TranslateError> {
    let height = ifd.image_height;
    let width = ifd.image_width;

    let (grid, offsets, byte_counts) = match (ifd.tile_height, ifd.tile_width) {
        (Some(tile_height), Some(tile_width)) => {
            if tile_height == 0 || tile_width == 0 {
                return Err(TranslateError::invariant(format!(
                    "Tile shape must be non-zero, got ({}, {}).",
                    tile_height, tile_width
                )));
            }
            (
                ChunkGrid::Regular(vec![tile_height, tile_width]),
                ifd.tile_offsets.clone().unwrap_or_default(),
                ifd.tile_byte_counts.clone().unwrap_or_default(),
            )
        }
        _ if ifd.rows_per_strip.is_some() || ifd.strip_offsets.is_some() => {
            let rows = ifd.rows_per_strip.unwrap_or(height).min(height);
            if rows == 0 {
                return Err(TranslateError::invariant(format!(
                    "Strip height must be non-zero, got RowsPerStrip = {:?} for an image of height {}.",
                    ifd.rows_per_strip, height
                )));
            }
            (
                strip_grid(height, width, rows),
                ifd.strip_offsets.clone().unwrap_or_default(),
                ifd.strip_byte_counts.clone().unwrap_or_default(),
            )
        }
        _ => return Err(TranslateError::unsupported(NO_OFFSETS_MESSAGE)),
    };

    if offsets.is_empty() || byte_counts.is_empty() {
        return Err(TranslateError::unsupported(NO_OFFSETS_MESSAGE));
    }

    let mut shape = vec![height, width];
    let mut grid = grid;
    let samples = ifd.samples_per_pixel as u64;
    if samples > 1 {
        let band_chunk = if ifd.planar_configuration == 2 { 1 } else { samples };
        shape.insert(0, samples);
        grid = grid.with_leading_axis(samples, band_chunk);
    }

    Ok(ChunkLayout {
        shape,
        grid,
        offsets,
        byte_counts,
    })
}

/// Strip grid for an image of `height` rows cut into strips of `rows`.
///
/// A short final strip makes the y axis rectilinear.
fn strip_grid(height: u64, width: u64, rows: u64) -> ChunkGrid {
    if height % rows == 0 {
        return ChunkGrid::Regular(vec![rows, width]);
    }

    let mut y_blocks = vec![rows; (height / rows) as usize];
    y_blocks.push(height % rows);
    ChunkGrid::Rectilinear(vec![y_blocks, vec![width]])
}
