//! GeoTIFF key directory decoding.
//!
//! The GeoKeyDirectory tag (34735) is an array of SHORTs: a four-value header
//! followed by one `[key id, location, count, value/offset]` quadruple per key.
//! Location 0 means the value is the SHORT itself; otherwise it names the tag
//! holding the value (GeoDoubleParams or GeoAsciiParams) and the offset into it.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use crate::error::TiffError;

use super::tags::TiffTag;

/// Known GeoKeys by id, with the attribute names they are exported under.
pub const GEO_KEY_NAMES: &[(u16, &str)] = &[
    (1024, "model_type"),
    (1025, "raster_type"),
    (1026, "citation"),
    (2048, "geographic_type"),
    (2049, "geog_citation"),
    (2050, "geog_geodetic_datum"),
    (2051, "geog_prime_meridian"),
    (2052, "geog_linear_units"),
    (2053, "geog_linear_unit_size"),
    (2054, "geog_angular_units"),
    (2055, "geog_angular_unit_size"),
    (2056, "geog_ellipsoid"),
    (2057, "geog_semi_major_axis"),
    (2058, "geog_semi_minor_axis"),
    (2059, "geog_inv_flattening"),
    (2060, "geog_azimuth_units"),
    (2061, "geog_prime_meridian_long"),
    (3072, "projected_type"),
    (3073, "proj_citation"),
    (3074, "projection"),
    (3075, "proj_coord_trans"),
    (3076, "proj_linear_units"),
    (3077, "proj_linear_unit_size"),
    (3078, "proj_std_parallel1"),
    (3079, "proj_std_parallel2"),
    (3080, "proj_nat_origin_long"),
    (3081, "proj_nat_origin_lat"),
    (3082, "proj_false_easting"),
    (3083, "proj_false_northing"),
    (3084, "proj_false_origin_long"),
    (3085, "proj_false_origin_lat"),
    (3086, "proj_false_origin_easting"),
    (3087, "proj_false_origin_northing"),
    (3088, "proj_center_long"),
    (3089, "proj_center_lat"),
    (3090, "proj_center_easting"),
    (3091, "proj_center_northing"),
    (3092, "proj_scale_at_nat_origin"),
    (3093, "proj_scale_at_center"),
    (3094, "proj_azimuth_angle"),
    (3095, "proj_straight_vert_pole_long"),
    (4096, "vertical"),
    (4097, "vertical_citation"),
    (4098, "vertical_datum"),
    (4099, "vertical_units"),
];

/// Look up the attribute name for a GeoKey id.
pub fn geo_key_name(key_id: u16) -> Option<&'static str> {
    GEO_KEY_NAMES
        .iter()
        .find(|(id, _)| *id == key_id)
        .map(|(_, name)| *name)
}

/// A single GeoKey value.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoKeyValue {
    Short(u16),
    Shorts(Vec<u16>),
    Double(f64),
    Doubles(Vec<f64>),
    Ascii(String),
}

impl GeoKeyValue {
    /// Zero numbers and empty text count as unset.
    pub fn is_falsy(&self) -> bool {
        match self {
            GeoKeyValue::Short(v) => *v == 0,
            GeoKeyValue::Shorts(v) => v.is_empty(),
            GeoKeyValue::Double(v) => *v == 0.0,
            GeoKeyValue::Doubles(v) => v.is_empty(),
            GeoKeyValue::Ascii(s) => s.is_empty(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            GeoKeyValue::Short(v) => Value::from(*v),
            GeoKeyValue::Shorts(v) => Value::from(v.clone()),
            GeoKeyValue::Double(v) => Value::from(*v),
            GeoKeyValue::Doubles(v) => Value::from(v.clone()),
            GeoKeyValue::Ascii(s) => Value::from(s.clone()),
        }
    }
}

/// Decoded GeoKeyDirectory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoKeyDirectory {
    /// KeyDirectoryVersion, KeyRevision, MinorRevision
    pub version: (u16, u16, u16),

    /// Values keyed by GeoKey id, including ids outside [`GEO_KEY_NAMES`]
    pub keys: BTreeMap<u16, GeoKeyValue>,
}

impl GeoKeyDirectory {
    /// Decode the directory from the three GeoTIFF tags.
    ///
    /// Keys pointing into a params tag that is missing or too short are skipped
    /// with a warning rather than failing the whole directory.
    pub fn decode(
        directory: &[u16],
        doubles: Option<&[f64]>,
        ascii: Option<&str>,
    ) -> Result<Self, TiffError> {
        if directory.len() < 4 {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::GeoKeyDirectory.name(),
                message: format!("expected at least 4 values, got {}", directory.len()),
            });
        }

        let version = (directory[0], directory[1], directory[2]);
        let key_count = directory[3] as usize;
        if directory.len() < 4 + key_count * 4 {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::GeoKeyDirectory.name(),
                message: format!(
                    "header declares {} keys but only {} values follow",
                    key_count,
                    directory.len() - 4
                ),
            });
        }

        let mut keys = BTreeMap::new();
        for quad in directory[4..4 + key_count * 4].chunks_exact(4) {
            let (key_id, location, count, value) = (quad[0], quad[1], quad[2] as usize, quad[3]);
            let start = value as usize;

            let decoded = match location {
                0 => Some(GeoKeyValue::Short(value)),
                l if l == TiffTag::GeoKeyDirectory.as_u16() => directory
                    .get(start..start + count)
                    .map(|v| match v {
                        [single] => GeoKeyValue::Short(*single),
                        many => GeoKeyValue::Shorts(many.to_vec()),
                    }),
                l if l == TiffTag::GeoDoubleParams.as_u16() => doubles
                    .and_then(|d| d.get(start..start + count))
                    .map(|v| match v {
                        [single] => GeoKeyValue::Double(*single),
                        many => GeoKeyValue::Doubles(many.to_vec()),
                    }),
                l if l == TiffTag::GeoAsciiParams.as_u16() => ascii
                    .and_then(|s| s.get(start..start + count))
                    // GeoAsciiParams entries are terminated by '|'
                    .map(|s| GeoKeyValue::Ascii(s.trim_end_matches(['|', '\0']).to_string())),
                _ => None,
            };

            match decoded {
                Some(v) => {
                    keys.insert(key_id, v);
                }
                None => warn!(key_id, location, "skipping GeoKey with unresolvable value"),
            }
        }

        Ok(Self { version, keys })
    }

    /// Get a key's value by id.
    pub fn get(&self, key_id: u16) -> Option<&GeoKeyValue> {
        self.keys.get(&key_id)
    }

    /// Iterate the known keys that are set, as `(attribute name, value)`.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, &GeoKeyValue)> + '_ {
        GEO_KEY_NAMES.iter().filter_map(move |(id, name)| {
            self.keys
                .get(id)
                .filter(|v| !v.is_falsy())
                .map(|v| (*name, v))
        })
    }
}
