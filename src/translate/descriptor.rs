//! Virtual array and group descriptors, and their JSON form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TranslateError;

use super::attributes::Attributes;
use super::codecs::{CodecMetadata, CodecPipeline};
use super::dtype::ScalarType;
use super::geometry::{ChunkGrid, ChunkGridMetadata};
use super::manifest::ChunkManifest;

const ZARR_FORMAT: u8 = 3;

// =============================================================================
// Array
// =============================================================================

/// Everything needed to read one IFD as a chunked array.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualArrayDescriptor {
    pub shape: Vec<u64>,
    pub dtype: ScalarType,
    pub chunk_grid: ChunkGrid,
    pub codecs: CodecPipeline,
    /// `["band",] "y", "x"`
    pub dimension_names: Vec<String>,
    pub attributes: Attributes,
    pub fill_value: Value,
    pub manifest: ChunkManifest,
}

impl VirtualArrayDescriptor {
    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Array metadata document.
    pub fn metadata(&self) -> ArrayMetadata {
        ArrayMetadata {
            zarr_format: ZARR_FORMAT,
            node_type: NodeType::Array,
            shape: self.shape.clone(),
            data_type: self.dtype.data_type_name().to_string(),
            chunk_grid: self.chunk_grid.to_metadata(),
            chunk_key_encoding: ChunkKeyEncoding::default(),
            fill_value: self.fill_value.clone(),
            codecs: self.codecs.to_metadata(),
            attributes: self.attributes.clone(),
            dimension_names: self.dimension_names.clone(),
        }
    }

    /// JSON node with the metadata and, optionally, the manifest.
    pub fn to_json(&self, include_manifest: bool) -> Result<Value, TranslateError> {
        let mut node = Map::new();
        node.insert("metadata".to_string(), to_value(&self.metadata())?);
        if include_manifest {
            node.insert("manifest".to_string(), to_value(&self.manifest)?);
        }
        Ok(Value::Object(node))
    }
}

/// Dimension names for an array of `ndim` dimensions.
pub fn dimension_names(ndim: usize) -> Vec<String> {
    let names: &[&str] = if ndim == 3 {
        &["band", "y", "x"]
    } else {
        &["y", "x"]
    };
    names.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Array,
    Group,
}

/// `chunk_key_encoding` entry of array metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "configuration", rename_all = "lowercase")]
pub enum ChunkKeyEncoding {
    Default { separator: String },
}

impl Default for ChunkKeyEncoding {
    fn default() -> Self {
        ChunkKeyEncoding::Default {
            separator: "/".to_string(),
        }
    }
}

/// Array metadata in the zarr v3 layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMetadata {
    pub zarr_format: u8,
    pub node_type: NodeType,
    pub shape: Vec<u64>,
    pub data_type: String,
    pub chunk_grid: ChunkGridMetadata,
    pub chunk_key_encoding: ChunkKeyEncoding,
    pub fill_value: Value,
    pub codecs: Vec<CodecMetadata>,
    #[serde(default)]
    pub attributes: Attributes,
    pub dimension_names: Vec<String>,
}

impl ArrayMetadata {
    /// Rebuild and validate the codec pipeline.
    pub fn codec_pipeline(&self) -> Result<CodecPipeline, TranslateError> {
        CodecPipeline::from_metadata(&self.codecs)
    }

    /// Rebuild the chunk grid against this array's shape.
    pub fn chunk_grid(&self) -> Result<ChunkGrid, TranslateError> {
        ChunkGrid::from_metadata(&self.chunk_grid, &self.shape)
    }
}

// =============================================================================
// Group
// =============================================================================

/// How arrays are arranged in the output group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupLayout {
    /// Arrays are direct members of the root group
    #[default]
    Flat,
    /// Each array sits in a subgroup of the same name
    Nested,
}

/// Arrays of a file keyed by IFD index.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualGroupDescriptor {
    pub layout: GroupLayout,
    /// Keyed by IFD index as a string; iteration is in IFD order
    arrays: BTreeMap<usize, VirtualArrayDescriptor>,
}

impl VirtualGroupDescriptor {
    pub fn new(layout: GroupLayout) -> Self {
        Self {
            layout,
            arrays: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, ifd_index: usize, array: VirtualArrayDescriptor) {
        self.arrays.insert(ifd_index, array);
    }

    pub fn get(&self, ifd_index: usize) -> Option<&VirtualArrayDescriptor> {
        self.arrays.get(&ifd_index)
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Member names in IFD order.
    pub fn names(&self) -> Vec<String> {
        self.arrays.keys().map(usize::to_string).collect()
    }

    /// `(name, array)` pairs in IFD order.
    pub fn arrays(&self) -> impl Iterator<Item = (String, &VirtualArrayDescriptor)> + '_ {
        self.arrays.iter().map(|(i, a)| (i.to_string(), a))
    }

    /// JSON tree of the group. Nested layouts wrap each array in a subgroup.
    pub fn to_json(&self, include_manifest: bool) -> Result<Value, TranslateError> {
        let mut members = Map::new();
        for (name, array) in self.arrays() {
            let node = array.to_json(include_manifest)?;
            let node = match self.layout {
                GroupLayout::Flat => node,
                GroupLayout::Nested => {
                    let mut inner = Map::new();
                    inner.insert(name.clone(), node);
                    group_node(inner)
                }
            };
            members.insert(name, node);
        }
        Ok(group_node(members))
    }
}

fn group_node(members: Map<String, Value>) -> Value {
    let mut node = Map::new();
    node.insert("zarr_format".to_string(), Value::from(ZARR_FORMAT));
    node.insert("node_type".to_string(), Value::from("group"));
    node.insert("attributes".to_string(), Value::Object(Map::new()));
    node.insert("members".to_string(), Value::Object(members));
    Value::Object(node)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, TranslateError> {
    serde_json::to_value(value).map_err(|e| {
        TranslateError::invariant(format!("Failed to serialize array metadata: {}", e))
    })
}
