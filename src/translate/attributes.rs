//! Array attributes from GeoTIFF keys and GDAL private tags.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{TiffError, TranslateError};
use crate::tiff::{ImageFileDirectory, TiffTag};

/// Attribute mapping of one array.
pub type Attributes = Map<String, Value>;

const NESTED_GRIDS_KEY: &str = "number_of_nested_grids";

/// Collect the attributes of an IFD.
///
/// Later sources win on key collisions: GeoKeys, then model tags, then GDAL
/// metadata items, then GDAL nodata.
pub fn extract_attributes(ifd: &ImageFileDirectory) -> Result<Attributes, TranslateError> {
    let mut attrs = Attributes::new();

    if let Some(geo_keys) = &ifd.geo_key_directory {
        for (name, value) in geo_keys.named() {
            attrs.insert(name.to_string(), value.to_json());
        }
    }

    if let Some(scale) = ifd.model_pixel_scale.as_ref().filter(|v| !v.is_empty()) {
        attrs.insert("model_pixel_scale".to_string(), Value::from(scale.clone()));
    }
    if let Some(tiepoint) = ifd.model_tiepoint.as_ref().filter(|v| !v.is_empty()) {
        attrs.insert("model_tiepoint".to_string(), Value::from(tiepoint.clone()));
    }
    if let Some(photometric) = ifd.photometric_interpretation.filter(|p| *p != 0) {
        attrs.insert("photometric_interpretation".to_string(), Value::from(photometric));
    }

    if let Some(metadata) = ifd.other_tag(TiffTag::GdalMetadata) {
        match metadata.as_str() {
            Some(xml) => {
                for (name, text) in parse_gdal_metadata(xml)? {
                    attrs.insert(name, Value::String(text));
                }
            }
            None => warn!("GDAL_METADATA tag is not ASCII, ignoring it"),
        }
    }

    if let Some(nodata) = ifd.other_tag(TiffTag::GdalNodata).filter(|v| !v.is_empty()) {
        attrs.insert("gdal_no_data".to_string(), nodata.to_json());
    }

    check_nested_grids(&attrs)?;
    Ok(attrs)
}

fn check_nested_grids(attrs: &Attributes) -> Result<(), TranslateError> {
    let nested = attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(NESTED_GRIDS_KEY))
        .and_then(|(_, value)| match value {
            Value::String(s) => s.trim().parse::<i64>().ok(),
            other => other.as_i64(),
        });

    match nested {
        Some(n) if n > 0 => Err(TranslateError::unsupported(format!(
            "Nested grids are not supported, but file has {} nested grid based on GDAL metadata.",
            n
        ))),
        _ => Ok(()),
    }
}

/// Extract `<Item name="...">text</Item>` pairs from a `<GDALMetadata>` blob.
///
/// Only items directly under the root element count, and an item's text stops
/// at its first child element. Text is trimmed and the predefined XML entities
/// are unescaped. Items without a name are skipped. Unbalanced or unterminated
/// markup is an error.
pub fn parse_gdal_metadata(xml: &str) -> Result<Vec<(String, String)>, TiffError> {
    let mut items = Vec::new();
    let mut open: Vec<&str> = Vec::new();
    let mut item: Option<PendingItem> = None;
    let mut seen_root = false;
    let mut rest = xml;

    loop {
        let (text, markup) = match rest.find('<') {
            Some(lt) => (&rest[..lt], Some(&rest[lt..])),
            None => (rest, None),
        };
        match item.as_mut() {
            Some(current) if open.len() == 2 && !current.text_done => current.text.push_str(text),
            _ if open.is_empty() && !text.trim().is_empty() => {
                return Err(malformed("text outside the root element"))
            }
            _ => {}
        }
        let Some(markup) = markup else {
            break;
        };

        if let Some(comment) = markup.strip_prefix("<!--") {
            let end = comment
                .find("-->")
                .ok_or_else(|| malformed("unterminated comment"))?;
            rest = &comment[end + "-->".len()..];
            continue;
        }
        let end = markup.find('>').ok_or_else(|| malformed("unterminated tag"))?;
        let tag = &markup[1..end];
        rest = &markup[end + 1..];

        if tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }

        if let Some(closing) = tag.strip_prefix('/') {
            if open.pop() != Some(closing.trim_end()) {
                return Err(malformed(&format!("unexpected closing tag </{}>", closing)));
            }
            if open.len() == 1 {
                if let Some(PendingItem {
                    name: Some(name),
                    text,
                    ..
                }) = item.take()
                {
                    items.push((unescape(&name), unescape(text.trim())));
                }
            }
            continue;
        }

        let self_closing = tag.ends_with('/');
        let tag = tag.trim_end_matches('/');
        let (name, attributes) = tag.split_at(tag.find(char::is_whitespace).unwrap_or(tag.len()));
        if name.is_empty() {
            return Err(malformed("empty element name"));
        }

        match open.len() {
            0 if seen_root => return Err(malformed("more than one root element")),
            0 => seen_root = true,
            1 if name == "Item" => {
                let item_name = attribute(attributes, "name");
                if self_closing {
                    if let Some(item_name) = item_name {
                        items.push((unescape(&item_name), String::new()));
                    }
                } else {
                    item = Some(PendingItem {
                        name: item_name,
                        text: String::new(),
                        text_done: false,
                    });
                }
            }
            2 => {
                if let Some(current) = item.as_mut() {
                    current.text_done = true;
                }
            }
            _ => {}
        }
        if !self_closing {
            open.push(name);
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(malformed(&format!("element <{}> is never closed", unclosed)));
    }
    if !seen_root {
        return Err(malformed("no root element"));
    }
    Ok(items)
}

struct PendingItem {
    name: Option<String>,
    text: String,
    text_done: bool,
}

fn malformed(message: &str) -> TiffError {
    TiffError::InvalidTagValue {
        tag: TiffTag::GdalMetadata.name(),
        message: format!("malformed XML: {}", message),
    }
}

/// Value of `key="..."` (or single quoted) in an element's attribute list.
fn attribute(attributes: &str, key: &str) -> Option<String> {
    let mut rest = attributes;
    while let Some(pos) = rest.find(key) {
        let preceded_ok = rest[..pos]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let after = rest[pos + key.len()..].trim_start();
        if preceded_ok {
            if let Some(after_eq) = after.strip_prefix('=') {
                let after_eq = after_eq.trim_start();
                let quote = after_eq.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let value = &after_eq[1..];
                    let end = value.find(quote)?;
                    return Some(value[..end].to_string());
                }
            }
        }
        rest = &rest[pos + key.len()..];
    }
    None
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp..];
        let Some(semi) = after.find(';') else {
            out.push_str(after);
            return out;
        };

        let entity = &after[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&after[..=semi]),
        }
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    out
}
