//! UFO persistence.
//!
//! Glyphs go through norad. The pipeline owns a handful of keys in lib.plist
//! and fontinfo.plist, those files are edited as plain property lists so that
//! nothing else in them is disturbed.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use fontra_source::{
    glyph::{StaticGlyph, UfoPointType},
    source::{FontInfo, FontSource},
    GlyphName,
};
use log::{debug, warn};
use norad::{
    AffineTransform, Codepoints, Component, Contour, ContourPoint, Glyph, Name, PointType,
};
use plist::{Dictionary, Value};

use crate::error::Error;

pub const GLYPH_ORDER_KEY: &str = "public.glyphOrder";
pub const OVERLAP_KEY: &str = "public.truetype.overlap";
pub const GASP_KEY: &str = "openTypeGaspRangeRecords";

pub fn lib_file(ufo_dir: &Path) -> PathBuf {
    ufo_dir.join("lib.plist")
}

pub fn fontinfo_file(ufo_dir: &Path) -> PathBuf {
    ufo_dir.join("fontinfo.plist")
}

/// Read a dictionary plist, empty if the file doesn't exist
pub fn read_dict(file: &Path) -> Result<Dictionary, Error> {
    if !file.exists() {
        return Ok(Dictionary::new());
    }
    Value::from_file(file)
        .map_err(|e| Error::ParseError(file.to_path_buf(), e.to_string()))?
        .into_dictionary()
        .ok_or_else(|| Error::ParseError(file.to_path_buf(), "Not a dictionary".to_string()))
}

pub fn write_dict(file: &Path, dict: Dictionary) -> Result<(), Error> {
    debug!("Write {file:?}");
    Value::Dictionary(dict)
        .to_file_xml(file)
        .map_err(|e| Error::WriteError(file.to_path_buf(), e.to_string()))
}

/// Read-modify-write of a dictionary plist
pub fn update_dict(file: &Path, update: impl FnOnce(&mut Dictionary)) -> Result<(), Error> {
    let mut dict = read_dict(file)?;
    update(&mut dict);
    write_dict(file, dict)
}

fn layer_dir(ufo_dir: &Path, layer: Option<&str>) -> Result<PathBuf, Error> {
    let Some(layer) = layer else {
        return Ok(ufo_dir.join("glyphs"));
    };
    let file = ufo_dir.join("layercontents.plist");
    if !file.is_file() {
        return Err(Error::FileExpected(file));
    }
    let contents: Vec<(String, PathBuf)> =
        plist::from_file(&file).map_err(|e| Error::ParseError(file.clone(), e.to_string()))?;
    contents
        .into_iter()
        .find(|(name, _)| name == layer)
        .map(|(_, dir)| ufo_dir.join(dir))
        .ok_or_else(|| Error::ParseError(file, format!("No layer named '{layer}'")))
}

/// The glyph names in a layer, the default layer if none is given
pub fn glyph_names(ufo_dir: &Path, layer: Option<&str>) -> Result<Vec<String>, Error> {
    let glyph_list_file = layer_dir(ufo_dir, layer)?.join("contents.plist");
    if !glyph_list_file.is_file() {
        return Err(Error::FileExpected(glyph_list_file));
    }
    let contents: BTreeMap<String, PathBuf> = plist::from_file(&glyph_list_file)
        .map_err(|e| Error::ParseError(glyph_list_file.clone(), e.to_string()))?;
    if contents.is_empty() {
        warn!("{glyph_list_file:?} is empty");
    }
    Ok(contents.into_keys().collect())
}

fn norad_name(name: &str) -> Result<Name, Error> {
    Name::new(name).map_err(|e| Error::GlyphCopy(name.into(), format!("{e}")))
}

fn norad_point_type(typ: UfoPointType) -> PointType {
    match typ {
        UfoPointType::Move => PointType::Move,
        UfoPointType::Line => PointType::Line,
        UfoPointType::OffCurve => PointType::OffCurve,
        UfoPointType::Curve => PointType::Curve,
        UfoPointType::QCurve => PointType::QCurve,
    }
}

/// One layer's drawing of a glyph as a norad glyph.
pub fn to_norad_glyph(
    name: &GlyphName,
    codepoints: &[u32],
    drawing: &StaticGlyph,
) -> Result<Glyph, Error> {
    let fail = |e: fontra_source::Error| Error::GlyphCopy(name.clone(), e.to_string());
    let mut glyph = Glyph::new(name.as_str());
    glyph.width = drawing.x_advance;
    glyph.codepoints = Codepoints::new(codepoints.iter().filter_map(|cp| {
        let ch = char::from_u32(*cp);
        if ch.is_none() {
            warn!("{name}: dropping invalid codepoint {cp:#06x}");
        }
        ch
    }));

    for contour in drawing.path.contours.iter() {
        let types = contour.ufo_point_types().map_err(fail)?;
        let points = contour
            .points
            .iter()
            .zip(types)
            .map(|(p, typ)| {
                ContourPoint::new(p.x, p.y, norad_point_type(typ), p.smooth, None, None)
            })
            .collect();
        glyph.contours.push(Contour::new(points, None));
    }

    for component in drawing.components.iter() {
        if !component.location.is_empty() {
            warn!(
                "{name}: a UFO can't vary component '{}', ignoring its location",
                component.name
            );
        }
        let [x_scale, xy_scale, yx_scale, y_scale, x_offset, y_offset] =
            component.transformation.to_affine().as_coeffs();
        glyph.components.push(Component::new(
            norad_name(component.name.as_str())?,
            AffineTransform {
                x_scale,
                xy_scale,
                yx_scale,
                y_scale,
                x_offset,
                y_offset,
            },
            None,
        ));
    }
    Ok(glyph)
}

fn insert_opt<T: Into<Value>>(dict: &mut Dictionary, key: &str, value: Option<T>) {
    if let Some(value) = value {
        dict.insert(key.to_string(), value.into());
    }
}

/// The fontinfo.plist keys that come from font-wide info
pub fn apply_font_info(dict: &mut Dictionary, info: &FontInfo, units_per_em: u16) {
    dict.insert("unitsPerEm".to_string(), Value::from(units_per_em as i64));
    insert_opt(dict, "familyName", info.family_name.clone());
    insert_opt(dict, "versionMajor", info.version_major);
    insert_opt(dict, "versionMinor", info.version_minor);
    insert_opt(dict, "copyright", info.copyright.clone());
    insert_opt(dict, "trademark", info.trademark.clone());
    insert_opt(dict, "openTypeNameDescription", info.description.clone());
    insert_opt(dict, "openTypeNameSampleText", info.sample_text.clone());
    insert_opt(dict, "openTypeNameDesigner", info.designer.clone());
    insert_opt(dict, "openTypeNameDesignerURL", info.designer_url.clone());
    insert_opt(dict, "openTypeNameManufacturer", info.manufacturer.clone());
    insert_opt(dict, "openTypeNameManufacturerURL", info.manufacturer_url.clone());
    insert_opt(dict, "openTypeNameLicense", info.license_description.clone());
    insert_opt(dict, "openTypeNameLicenseURL", info.license_info_url.clone());
    insert_opt(dict, "openTypeOS2VendorID", info.vendor_id.clone());
}

/// The fontinfo.plist keys that vary per source
pub fn apply_source_info(dict: &mut Dictionary, source: &FontSource) {
    dict.insert("styleName".to_string(), Value::from(source.name.as_str()));
    for (fontra_name, ufo_name) in [
        ("ascender", "ascender"),
        ("descender", "descender"),
        ("xHeight", "xHeight"),
        ("capHeight", "capHeight"),
        ("italicAngle", "italicAngle"),
    ] {
        if let Some(metric) = source.line_metrics.get(fontra_name) {
            dict.insert(ufo_name.to_string(), Value::Real(metric.value));
        }
    }
}

/// Arbitrary json, as a property list
///
/// Property lists have no null, those are dropped.
pub fn json_to_plist(value: &serde_json::Value) -> Option<Value> {
    Some(match value {
        serde_json::Value::Null => return None,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::from(i),
            None => Value::Real(n.as_f64()?),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().filter_map(json_to_plist).collect())
        }
        serde_json::Value::Object(entries) => Value::Dictionary(
            entries
                .iter()
                .filter_map(|(k, v)| json_to_plist(v).map(|v| (k.clone(), v)))
                .collect(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use fontra_source::{
        coords::DesignLocation,
        glyph::{
            Component as FontraComponent, Contour as FontraContour, DecomposedTransform,
            Path as FontraPath, Point,
        },
        source::LineMetric,
    };
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn drawing() -> StaticGlyph {
        StaticGlyph {
            x_advance: 600.0,
            path: FontraPath {
                contours: vec![FontraContour {
                    points: vec![
                        Point::on_curve(0.0, 0.0),
                        Point::off_curve_quad(50.0, 100.0),
                        Point::on_curve(100.0, 0.0),
                    ],
                    is_closed: true,
                }],
            },
            components: vec![FontraComponent {
                transformation: DecomposedTransform {
                    translate_x: 10.0,
                    scale_y: 2.0,
                    ..Default::default()
                },
                ..FontraComponent::new("B")
            }],
        }
    }

    #[test]
    fn norad_glyph_from_drawing() {
        let glyph = to_norad_glyph(&"A".into(), &[0x41, 0x61], &drawing()).unwrap();
        assert_eq!(600.0, glyph.width);
        assert_eq!(vec!['A', 'a'], glyph.codepoints.iter().collect::<Vec<_>>());
        assert_eq!(
            vec![PointType::Line, PointType::OffCurve, PointType::QCurve],
            glyph.contours[0]
                .points
                .iter()
                .map(|p| p.typ.clone())
                .collect::<Vec<_>>()
        );
        let component = &glyph.components[0];
        assert_eq!("B", component.base.as_str());
        assert_eq!(
            (1.0, 2.0, 10.0),
            (
                component.transform.x_scale,
                component.transform.y_scale,
                component.transform.x_offset
            )
        );
    }

    #[test]
    fn save_and_list_glyphs() {
        let dir = tempdir().unwrap();
        let ufo_dir = dir.path().join("test.ufo");
        let mut font = norad::Font::new();
        for name in ["space", "A"] {
            font.default_layer_mut()
                .insert_glyph(to_norad_glyph(&name.into(), &[], &StaticGlyph::default()).unwrap());
        }
        font.save(&ufo_dir).unwrap();
        assert_eq!(vec!["A", "space"], glyph_names(&ufo_dir, None).unwrap());
    }

    #[test]
    fn update_preserves_other_keys() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("lib.plist");
        update_dict(&file, |d| {
            d.insert("com.example.keep".to_string(), Value::from("me"));
        })
        .unwrap();
        update_dict(&file, |d| {
            d.insert(OVERLAP_KEY.to_string(), Value::Boolean(true));
        })
        .unwrap();
        let dict = read_dict(&file).unwrap();
        assert_eq!(Some(&Value::from("me")), dict.get("com.example.keep"));
        assert_eq!(Some(&Value::Boolean(true)), dict.get(OVERLAP_KEY));
    }

    #[test]
    fn source_metrics() {
        let mut source = FontSource::new("Bold", DesignLocation::new());
        source.line_metrics.insert(
            "ascender".to_string(),
            LineMetric {
                value: 750.0,
                zone: 16.0,
            },
        );
        source.line_metrics.insert(
            "baseline".to_string(),
            LineMetric {
                value: 0.0,
                zone: -16.0,
            },
        );
        let mut dict = Dictionary::new();
        apply_source_info(&mut dict, &source);
        assert_eq!(Some(&Value::Real(750.0)), dict.get("ascender"));
        assert_eq!(Some(&Value::from("Bold")), dict.get("styleName"));
        assert_eq!(2, dict.len());
    }

    #[test]
    fn json_nulls_are_dropped() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a": [1, null, "x"], "b": null, "c": 0.5}"#).unwrap();
        let Some(Value::Dictionary(dict)) = json_to_plist(&json) else {
            panic!("Expected a dictionary");
        };
        assert_eq!(
            Some(&Value::Array(vec![Value::from(1i64), Value::from("x")])),
            dict.get("a")
        );
        assert_eq!(None, dict.get("b"));
        assert_eq!(Some(&Value::Real(0.5)), dict.get("c"));
    }
}
