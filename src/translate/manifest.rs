//! Chunk manifests: where each chunk's bytes live in the source file.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::error::TranslateError;

use super::geometry::ChunkLayout;

pub(crate) const NO_OFFSETS_MESSAGE: &str = "TIFFs without byte counts and offsets aren't supported";

/// Byte range of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkManifestEntry<'a> {
    pub path: &'a str,
    pub offset: u64,
    pub length: u64,
}

impl Serialize for ChunkManifestEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ChunkManifestEntry", 3)?;
        s.serialize_field("path", self.path)?;
        s.serialize_field("offset", &self.offset)?;
        s.serialize_field("length", &self.length)?;
        s.end()
    }
}

/// Dense mapping from chunk grid index to byte range.
///
/// All chunks come from one file, so the path is stored once and offsets and
/// lengths are kept in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkManifest {
    path: String,
    grid_shape: Vec<u64>,
    offsets: Vec<u64>,
    lengths: Vec<u64>,
}

impl ChunkManifest {
    /// Build a manifest from flat, row-major offset and length arrays.
    pub fn from_arrays(
        path: impl Into<String>,
        grid_shape: Vec<u64>,
        offsets: Vec<u64>,
        lengths: Vec<u64>,
    ) -> Result<Self, TranslateError> {
        if offsets.iter().all(|o| *o == 0) || lengths.iter().all(|l| *l == 0) {
            return Err(TranslateError::unsupported(NO_OFFSETS_MESSAGE));
        }

        let expected: u64 = grid_shape.iter().product();
        if offsets.len() as u64 != expected || lengths.len() as u64 != expected {
            return Err(TranslateError::invariant(format!(
                "Chunk grid {:?} needs {} chunks, but the TIFF has {} offsets and {} byte counts.",
                grid_shape,
                expected,
                offsets.len(),
                lengths.len()
            )));
        }

        Ok(Self {
            path: path.into(),
            grid_shape,
            offsets,
            lengths,
        })
    }

    /// Build the manifest for a resolved chunk layout.
    pub fn build(path: &str, layout: &ChunkLayout) -> Result<Self, TranslateError> {
        Self::from_arrays(
            path,
            layout.grid.grid_shape(&layout.shape),
            layout.offsets.clone(),
            layout.byte_counts.clone(),
        )
    }

    /// Source file all chunks point into.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of chunks per axis.
    pub fn grid_shape(&self) -> &[u64] {
        &self.grid_shape
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Entry for a chunk index, `None` if out of range.
    pub fn get(&self, index: &[u64]) -> Option<ChunkManifestEntry<'_>> {
        if index.len() != self.grid_shape.len() {
            return None;
        }

        let mut flat = 0u64;
        for (i, n) in index.iter().zip(&self.grid_shape) {
            if i >= n {
                return None;
            }
            flat = flat * n + i;
        }
        Some(self.entry(flat as usize))
    }

    /// All entries with their chunk index, in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Vec<u64>, ChunkManifestEntry<'_>)> + '_ {
        (0..self.len()).map(move |flat| (self.unravel(flat), self.entry(flat)))
    }

    /// Manifest key for a chunk index, e.g. `0.1.2`.
    pub fn key(index: &[u64]) -> String {
        index
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    fn entry(&self, flat: usize) -> ChunkManifestEntry<'_> {
        ChunkManifestEntry {
            path: &self.path,
            offset: self.offsets[flat],
            length: self.lengths[flat],
        }
    }

    fn unravel(&self, mut flat: usize) -> Vec<u64> {
        let mut index = vec![0; self.grid_shape.len()];
        for (slot, n) in index.iter_mut().zip(&self.grid_shape).rev() {
            *slot = flat as u64 % n;
            flat /= *n as usize;
        }
        index
    }
}

impl Serialize for ChunkManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (index, entry) in self.iter() {
            map.serialize_entry(&Self::key(&index), &entry)?;
        }
        map.end()
    }
}
