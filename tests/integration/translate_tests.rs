//! End-to-end translation tests.
//!
//! Synthetic TIFF files are built in memory, read through the built-in
//! directory reader and translated into virtual groups.
//!
//! Tests verify:
//! - Tiled and stripped layouts, including short final strips
//! - Codec pipelines for compression, predictors and interleaving
//! - Big-endian and BigTIFF input
//! - Rejection of sub-IFDs, colour-converted photometrics and unknown compressors
//! - Flat and nested group layouts, and IFD selection

use serde_json::{json, Value};

use virtual_tiff::tiff::TiffDirectoryReader;
use virtual_tiff::translate::{GroupLayout, VirtualGroupDescriptor, VirtualTiff};
use virtual_tiff::{LocalRangeReader, TranslateError};

use super::test_utils::{
    create_tiled_tiff, ByteOrderType, IfdBuilder, TiffBuilder, TrackingMockReader,
};

async fn translate(data: Vec<u8>) -> Result<VirtualGroupDescriptor, TranslateError> {
    translate_with(data, VirtualTiff::new()).await
}

async fn translate_with(
    data: Vec<u8>,
    translator: VirtualTiff,
) -> Result<VirtualGroupDescriptor, TranslateError> {
    let reader = TrackingMockReader::new(data, "mem://test.tif");
    translator.translate(&reader, &TiffDirectoryReader).await
}

fn single_ifd(ifd: IfdBuilder) -> Vec<u8> {
    TiffBuilder::new().add_ifd(ifd).build()
}

fn metadata(group: &VirtualGroupDescriptor, index: usize) -> Value {
    serde_json::to_value(group.get(index).unwrap().metadata()).unwrap()
}

// =============================================================================
// Layouts
// =============================================================================

#[tokio::test]
async fn test_tiled_uncompressed() {
    let group = translate(create_tiled_tiff(ByteOrderType::LittleEndian))
        .await
        .unwrap();

    assert_eq!(group.len(), 1);
    let array = group.get(0).unwrap();
    assert_eq!(array.shape, vec![512, 512]);
    assert_eq!(array.manifest.grid_shape(), &[2, 2]);
    assert_eq!(array.manifest.len(), 4);

    let meta = metadata(&group, 0);
    assert_eq!(meta["data_type"], json!("uint16"));
    assert_eq!(
        meta["chunk_grid"],
        json!({"name": "regular", "configuration": {"chunk_shape": [256, 256]}})
    );
    // No bytes->bytes codecs for uncompressed data
    assert_eq!(
        meta["codecs"],
        json!([{"name": "bytes", "configuration": {"endian": "little"}}])
    );
    assert_eq!(meta["dimension_names"], json!(["y", "x"]));
    assert_eq!(meta["fill_value"], json!(0));
}

#[tokio::test]
async fn test_manifest_points_at_tiles() {
    let group = translate(create_tiled_tiff(ByteOrderType::LittleEndian))
        .await
        .unwrap();

    let manifest = &group.get(0).unwrap().manifest;
    let entry = manifest.get(&[1, 0]).unwrap();
    assert_eq!(entry.path, "mem://test.tif");
    assert_eq!(entry.offset, 1_000_000 + 2 * 4096);
    assert_eq!(entry.length, 4096);
}

#[tokio::test]
async fn test_short_final_strip_is_rectilinear() {
    let group = translate(single_ifd(IfdBuilder::stripped(100, 250, 100)))
        .await
        .unwrap();

    let meta = metadata(&group, 0);
    assert_eq!(meta["shape"], json!([250, 100]));
    assert_eq!(
        meta["chunk_grid"],
        json!({
            "name": "rectilinear",
            "configuration": {"kind": "inline", "chunk_shapes": [[[100, 2], 50], 100]}
        })
    );
    assert_eq!(
        meta["codecs"],
        json!([{"name": "bytes"}, {"name": "TruncateCodec"}])
    );
    assert_eq!(group.get(0).unwrap().manifest.grid_shape(), &[3, 1]);
}

#[tokio::test]
async fn test_even_strips_are_regular() {
    let group = translate(single_ifd(IfdBuilder::stripped(64, 256, 64)))
        .await
        .unwrap();

    let meta = metadata(&group, 0);
    assert_eq!(meta["chunk_grid"]["name"], json!("regular"));
    assert_eq!(meta["chunk_grid"]["configuration"]["chunk_shape"], json!([64, 64]));
}

#[tokio::test]
async fn test_missing_offsets_rejected() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 8, 1);
    ifd.remove(324).remove(325);

    let err = translate(single_ifd(ifd)).await.unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(
        err.to_string(),
        "TIFFs without byte counts and offsets aren't supported"
    );
}

// =============================================================================
// Bands
// =============================================================================

fn rgb(planar: u16) -> IfdBuilder {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 8, 1);
    ifd.short(258, &[8, 8, 8])
        .short(262, &[2])
        .short(277, &[3])
        .short(339, &[1, 1, 1])
        .short(284, &[planar]);
    if planar == 2 {
        let offsets: Vec<u32> = (0..12).map(|i| 2_000_000 + i * 4096).collect();
        ifd.long(324, &offsets).long(325, &[4096; 12]);
    }
    ifd
}

#[tokio::test]
async fn test_chunky_bands() {
    let group = translate(single_ifd(rgb(1))).await.unwrap();
    let array = group.get(0).unwrap();
    assert_eq!(array.shape, vec![3, 512, 512]);
    assert_eq!(array.dimension_names, vec!["band", "y", "x"]);
    assert_eq!(array.manifest.grid_shape(), &[1, 2, 2]);

    let meta = metadata(&group, 0);
    assert_eq!(meta["chunk_grid"]["configuration"]["chunk_shape"], json!([3, 256, 256]));
    assert_eq!(
        meta["codecs"],
        json!([
            {"name": "transpose", "configuration": {"order": [0, 2, 1]}},
            {"name": "ChunkyCodec"},
        ])
    );
    assert_eq!(meta["attributes"]["photometric_interpretation"], json!(2));
}

#[tokio::test]
async fn test_planar_bands() {
    let group = translate(single_ifd(rgb(2))).await.unwrap();
    let array = group.get(0).unwrap();
    assert_eq!(array.manifest.grid_shape(), &[3, 2, 2]);
    assert_eq!(array.manifest.get(&[2, 1, 1]).unwrap().offset, 2_000_000 + 11 * 4096);

    let meta = metadata(&group, 0);
    assert_eq!(meta["chunk_grid"]["configuration"]["chunk_shape"], json!([1, 256, 256]));
    assert_eq!(meta["codecs"], json!([{"name": "bytes"}]));
}

#[tokio::test]
async fn test_mixed_sample_formats_rejected() {
    let mut ifd = rgb(1);
    ifd.short(339, &[1, 1, 3]);

    let err = translate(single_ifd(ifd)).await.unwrap_err();
    assert!(matches!(err, TranslateError::InvariantViolation(_)));
    assert!(err.to_string().contains("[1, 1, 3]"));
}

// =============================================================================
// Codecs
// =============================================================================

#[tokio::test]
async fn test_zstd_default_level() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 16, 1);
    ifd.short(259, &[50000]);

    let group = translate(single_ifd(ifd)).await.unwrap();
    let codecs = metadata(&group, 0)["codecs"].clone();
    assert_eq!(
        codecs[1],
        json!({"name": "imagecodecs_zstd", "configuration": {"id": "zstd", "level": 9}})
    );
}

#[tokio::test]
async fn test_deflate_with_horizontal_predictor() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 16, 1);
    ifd.short(259, &[8]).short(317, &[2]);

    let group = translate(single_ifd(ifd)).await.unwrap();
    assert_eq!(
        metadata(&group, 0)["codecs"],
        json!([
            {"name": "HorizontalDeltaCodec"},
            {"name": "bytes", "configuration": {"endian": "little"}},
            {"name": "imagecodecs_zlib", "configuration": {"id": "zlib"}},
        ])
    );
}

#[tokio::test]
async fn test_float_predictor() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 32, 3);
    ifd.short(259, &[5]).short(317, &[3]);

    let group = translate(single_ifd(ifd)).await.unwrap();
    let meta = metadata(&group, 0);
    assert_eq!(meta["data_type"], json!("float32"));
    assert_eq!(meta["fill_value"], json!(0.0));
    assert_eq!(
        meta["codecs"][0],
        json!({
            "name": "imagecodecs_floatpred",
            "configuration": {"id": "floatpred", "dtype": "<f4", "shape": [256, 256]}
        })
    );
    assert_eq!(meta["codecs"][2]["name"], json!("imagecodecs_lzw"));
}

#[tokio::test]
async fn test_codecs_parse_back() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 16, 2);
    ifd.short(259, &[50000]).short(317, &[2]);

    let group = translate(single_ifd(ifd)).await.unwrap();
    let array = group.get(0).unwrap();
    let text = serde_json::to_string(&array.metadata()).unwrap();
    let parsed: virtual_tiff::translate::ArrayMetadata = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.codec_pipeline().unwrap(), array.codecs);
}

#[tokio::test]
async fn test_unknown_compression_names_tag() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 8, 1);
    ifd.short(259, &[34712]);

    let err = translate(single_ifd(ifd)).await.unwrap_err();
    assert!(matches!(err, TranslateError::UnrecognizedCompression(34712)));
    assert!(err.to_string().contains("34712"));
}

#[tokio::test]
async fn test_jpeg_tables_rejected() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 8, 1);
    ifd.short(259, &[7])
        .bytes(347, &[0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x43, 0xFF, 0xD9]);

    let err = translate(single_ifd(ifd)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "JPEG compression with quantization tables is not yet supported."
    );
}

// =============================================================================
// Byte order and BigTIFF
// =============================================================================

#[tokio::test]
async fn test_big_endian_input() {
    let group = translate(create_tiled_tiff(ByteOrderType::BigEndian))
        .await
        .unwrap();

    let meta = metadata(&group, 0);
    assert_eq!(meta["data_type"], json!("uint16"));
    assert_eq!(
        meta["codecs"],
        json!([{"name": "bytes", "configuration": {"endian": "big"}}])
    );
    assert_eq!(group.get(0).unwrap().dtype.numpy_str(), ">u2");
    assert_eq!(
        group.get(0).unwrap().manifest.get(&[0, 1]).unwrap().offset,
        1_000_000 + 4096
    );
}

#[tokio::test]
async fn test_bigtiff_long8_offsets() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 8, 1);
    let offsets: Vec<u64> = (0..4).map(|i| 5_000_000_000 + i * 4096).collect();
    ifd.long8(324, &offsets).long8(325, &[4096; 4]);

    let data = TiffBuilder::new().with_bigtiff(true).add_ifd(ifd).build();
    let group = translate(data).await.unwrap();
    let entry = group.get(0).unwrap().manifest.get(&[1, 1]).unwrap();
    assert_eq!(entry.offset, 5_000_000_000 + 3 * 4096);
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_sub_ifds_rejected() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 8, 1);
    ifd.long(330, &[4096]);

    let err = translate(single_ifd(ifd)).await.unwrap_err();
    assert_eq!(err.to_string(), "TIFFs with Sub-IFDs are not yet supported.");
}

#[tokio::test]
async fn test_ycbcr_rejected() {
    let mut ifd = rgb(1);
    ifd.short(262, &[6]);

    let err = translate(single_ifd(ifd)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "YCbCr PhotometricInterpretation is not yet supported."
    );
}

#[tokio::test]
async fn test_not_a_tiff() {
    let err = translate(b"GIF89a\0\0\0\0".to_vec()).await.unwrap_err();
    assert!(matches!(
        err,
        TranslateError::Tiff(virtual_tiff::TiffError::InvalidMagic(_))
    ));
}

// =============================================================================
// Attributes
// =============================================================================

#[tokio::test]
async fn test_geotiff_attributes() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 16, 1);
    ifd.short(
        34735,
        &[1, 1, 0, 4, 1024, 0, 1, 1, 1025, 0, 1, 1, 2049, 34737, 7, 0, 3072, 0, 1, 32633],
    )
    .ascii(34737, "WGS 84|")
    .double(33550, &[10.0, 10.0, 0.0])
    .double(33922, &[0.0, 0.0, 0.0, 500000.0, 4100000.0, 0.0])
    .ascii(
        42112,
        "<GDALMetadata>\n  <Item name=\"AREA_OR_POINT\">Area</Item>\n</GDALMetadata>\n",
    )
    .ascii(42113, "-9999");

    let group = translate(single_ifd(ifd)).await.unwrap();
    let attrs = &metadata(&group, 0)["attributes"];
    assert_eq!(attrs["model_type"], json!(1));
    assert_eq!(attrs["raster_type"], json!(1));
    assert_eq!(attrs["geog_citation"], json!("WGS 84"));
    assert_eq!(attrs["projected_type"], json!(32633));
    assert_eq!(attrs["model_pixel_scale"], json!([10.0, 10.0, 0.0]));
    assert_eq!(attrs["model_tiepoint"][4], json!(4100000.0));
    assert_eq!(attrs["AREA_OR_POINT"], json!("Area"));
    assert_eq!(attrs["gdal_no_data"], json!("-9999"));
}

#[tokio::test]
async fn test_nested_grids_rejected() {
    let mut ifd = IfdBuilder::tiled(512, 512, 256, 16, 1);
    ifd.ascii(
        42112,
        "<GDALMetadata><Item name=\"NUMBER_OF_NESTED_GRIDS\">1</Item></GDALMetadata>",
    );

    let err = translate(single_ifd(ifd)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Nested grids are not supported, but file has 1 nested grid based on GDAL metadata."
    );
}

// =============================================================================
// Groups
// =============================================================================

fn two_level_pyramid() -> Vec<u8> {
    TiffBuilder::new()
        .add_ifd(IfdBuilder::tiled(512, 512, 256, 8, 1))
        .add_ifd(IfdBuilder::tiled(256, 256, 256, 8, 1))
        .build()
}

#[tokio::test]
async fn test_flat_group_all_ifds() {
    let group = translate(two_level_pyramid()).await.unwrap();
    assert_eq!(group.names(), vec!["0", "1"]);
    assert_eq!(group.get(1).unwrap().shape, vec![256, 256]);

    let value = group.to_json(true).unwrap();
    assert_eq!(value["members"]["0"]["metadata"]["shape"], json!([512, 512]));
    assert_eq!(
        value["members"]["1"]["manifest"]["0.0"]["path"],
        json!("mem://test.tif")
    );
}

#[tokio::test]
async fn test_nested_group() {
    let translator = VirtualTiff::new().with_layout(GroupLayout::Nested);
    let group = translate_with(two_level_pyramid(), translator).await.unwrap();

    let value = group.to_json(false).unwrap();
    let subgroup = &value["members"]["1"];
    assert_eq!(subgroup["node_type"], json!("group"));
    assert_eq!(subgroup["members"]["1"]["metadata"]["shape"], json!([256, 256]));
    assert!(subgroup["members"]["1"].get("manifest").is_none());
}

#[tokio::test]
async fn test_select_ifd() {
    let translator = VirtualTiff::new().with_ifd(Some(1));
    let group = translate_with(two_level_pyramid(), translator).await.unwrap();
    assert_eq!(group.names(), vec!["1"]);

    let translator = VirtualTiff::new().with_ifd(Some(2));
    let err = translate_with(two_level_pyramid(), translator)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("IFD 2"));
}

// =============================================================================
// Local Files
// =============================================================================

#[tokio::test]
async fn test_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.tif");
    std::fs::write(&path, create_tiled_tiff(ByteOrderType::LittleEndian)).unwrap();

    let reader = LocalRangeReader::open(&path).await.unwrap();
    let group = VirtualTiff::new()
        .translate(&reader, &TiffDirectoryReader)
        .await
        .unwrap();

    let entry_path = group.get(0).unwrap().manifest.get(&[0, 0]).unwrap().path.to_string();
    assert!(entry_path.starts_with("file://"));
    assert!(entry_path.ends_with("scene.tif"));
}
