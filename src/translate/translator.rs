//! Translation of a whole file into a virtual group.

use tracing::{debug, info};

use crate::error::TranslateError;
use crate::io::RangeReader;
use crate::tiff::{ByteOrder, DirectoryReader, ImageFileDirectory, PhotometricInterpretation};

use super::attributes::extract_attributes;
use super::codecs::CodecPipeline;
use super::descriptor::{
    dimension_names, GroupLayout, VirtualArrayDescriptor, VirtualGroupDescriptor,
};
use super::dtype::ScalarType;
use super::geometry::resolve_layout;
use super::manifest::ChunkManifest;

/// Translates TIFF files into virtual groups.
///
/// # Example
///
/// ```ignore
/// let reader = LocalRangeReader::open("scene.tif").await?;
/// let group = VirtualTiff::new()
///     .with_layout(GroupLayout::Nested)
///     .translate(&reader, &TiffDirectoryReader)
///     .await?;
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualTiff {
    /// Translate only this IFD; all IFDs when `None`
    pub ifd: Option<usize>,
    pub layout: GroupLayout,
}

impl VirtualTiff {
    /// Translator for every IFD, in a flat group.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ifd(mut self, ifd: Option<usize>) -> Self {
        self.ifd = ifd;
        self
    }

    pub fn with_layout(mut self, layout: GroupLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Translate the file behind `reader`.
    ///
    /// Manifest entries point at `reader.identifier()`.
    pub async fn translate(
        &self,
        reader: &dyn RangeReader,
        directory_reader: &dyn DirectoryReader,
    ) -> Result<VirtualGroupDescriptor, TranslateError> {
        let path = reader.identifier().to_string();
        let byte_order = sniff_byte_order(reader).await?;
        let directories = directory_reader.read_directories(reader).await?;

        info!(
            path = %path,
            ?byte_order,
            ifds = directories.len(),
            "translating TIFF"
        );

        let selected: Vec<usize> = match self.ifd {
            Some(index) if index >= directories.len() => {
                return Err(TranslateError::invariant(format!(
                    "IFD {} requested, but the TIFF only has {} IFDs.",
                    index,
                    directories.len()
                )))
            }
            Some(index) => vec![index],
            None => (0..directories.len()).collect(),
        };

        let mut group = VirtualGroupDescriptor::new(self.layout);
        for index in selected {
            let array = translate_directory(&directories[index], byte_order, &path)?;
            debug!(
                ifd = index,
                shape = ?array.shape,
                dtype = %array.dtype,
                chunks = array.manifest.len(),
                "translated IFD"
            );
            group.insert(index, array);
        }

        Ok(group)
    }

    /// Blocking wrapper around [`translate`](Self::translate).
    ///
    /// Drives the translation on a current-thread runtime, so it must not be
    /// called from inside another tokio runtime.
    pub fn translate_blocking(
        &self,
        reader: &dyn RangeReader,
        directory_reader: &dyn DirectoryReader,
    ) -> Result<VirtualGroupDescriptor, TranslateError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TranslateError::Runtime(e.to_string()))?;
        runtime.block_on(self.translate(reader, directory_reader))
    }
}

/// Read the byte order from the first two bytes of the file.
pub async fn sniff_byte_order(reader: &dyn RangeReader) -> Result<ByteOrder, TranslateError> {
    let magic = reader.read_range(0, 2).await?;
    Ok(ByteOrder::from_magic([magic[0], magic[1]])?)
}

/// Translate one IFD into an array descriptor.
///
/// Unsupported features are rejected before any chunk or codec work.
pub fn translate_directory(
    ifd: &ImageFileDirectory,
    byte_order: ByteOrder,
    path: &str,
) -> Result<VirtualArrayDescriptor, TranslateError> {
    if ifd.has_sub_ifds() {
        return Err(TranslateError::unsupported(
            "TIFFs with Sub-IFDs are not yet supported.",
        ));
    }

    if let Some(photometric) = ifd
        .photometric_interpretation
        .and_then(PhotometricInterpretation::from_u16)
        .filter(|p| p.needs_color_conversion())
    {
        return Err(TranslateError::unsupported(format!(
            "{} PhotometricInterpretation is not yet supported.",
            photometric.name()
        )));
    }

    let dtype = ScalarType::resolve(&ifd.sample_format, &ifd.bits_per_sample, byte_order)?;
    let layout = resolve_layout(ifd)?;
    let codecs = CodecPipeline::assemble(ifd, &dtype, &layout)?;
    let attributes = extract_attributes(ifd)?;
    let manifest = ChunkManifest::build(path, &layout)?;

    Ok(VirtualArrayDescriptor {
        dimension_names: dimension_names(layout.shape.len()),
        shape: layout.shape,
        dtype,
        chunk_grid: layout.grid,
        codecs,
        attributes,
        fill_value: dtype.zero(),
        manifest,
    })
}
