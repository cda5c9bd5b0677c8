//! Variable glyphs as a font source presents them.
//!
//! Mirrors <https://github.com/googlefonts/fontra/blob/main/src/fontra/core/classes.py>

use std::collections::{BTreeMap, HashMap};

use kurbo::{Affine, BezPath};
use serde::{Deserialize, Serialize};

use crate::{
    coords::DesignLocation, error::Error, path_builder::GlyphPathBuilder, types::GlyphName,
};

pub type LayerName = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableGlyph {
    pub name: GlyphName,
    /// Variable component, or glyph-local, axes
    #[serde(default)]
    pub axes: Vec<GlyphAxis>,
    pub sources: Vec<GlyphSource>,
    pub layers: BTreeMap<LayerName, Layer>,
}

impl VariableGlyph {
    /// The sources that should be compiled
    pub fn active_sources(&self) -> impl Iterator<Item = &GlyphSource> {
        self.sources.iter().filter(|s| !s.inactive)
    }

    /// The drawing for a source, failing if the source names a layer we don't have.
    pub fn layer_glyph(&self, source: &GlyphSource) -> Result<&StaticGlyph, Error> {
        self.layers
            .get(&source.layer_name)
            .map(|l| &l.glyph)
            .ok_or_else(|| {
                Error::InvalidInputData(format!(
                    "{}: source '{}' refers to missing layer '{}'",
                    self.name, source.name, source.layer_name
                ))
            })
    }

    pub fn is_local_axis(&self, axis_name: &str) -> bool {
        self.axes.iter().any(|a| a.name == axis_name)
    }
}

/// An axis specific to a glyph meant to be used as a variable component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlyphAxis {
    pub name: String,
    #[serde(rename = "minValue")]
    pub min_value: f64,
    #[serde(rename = "defaultValue")]
    pub default_value: f64,
    #[serde(rename = "maxValue")]
    pub max_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlyphSource {
    pub name: String,
    #[serde(rename = "layerName")]
    pub layer_name: LayerName,
    /// Design space, may include glyph-local axes
    #[serde(default)]
    pub location: DesignLocation,
    /// Identifier of the font source this glyph source is based on, if any
    #[serde(rename = "locationBase", default)]
    pub location_base: Option<String>,
    #[serde(default)]
    pub inactive: bool,
}

impl GlyphSource {
    pub fn new(name: impl Into<String>, layer_name: impl Into<String>) -> GlyphSource {
        GlyphSource {
            name: name.into(),
            layer_name: layer_name.into(),
            location: Default::default(),
            location_base: None,
            inactive: false,
        }
    }

    pub fn at(mut self, location: DesignLocation) -> GlyphSource {
        self.location = location;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub glyph: StaticGlyph,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticGlyph {
    #[serde(rename = "xAdvance", default)]
    pub x_advance: f64,
    #[serde(default)]
    pub path: Path,
    #[serde(default)]
    pub components: Vec<Component>,
}

/// Only the unpacked representation; Fontra also has a packed one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    #[serde(default)]
    pub contours: Vec<Contour>,
}

impl Path {
    pub fn is_empty(&self) -> bool {
        self.contours.iter().all(|c| c.points.is_empty())
    }

    /// Every contour as one path
    pub fn to_bezpath(&self) -> Result<BezPath, Error> {
        let mut path = BezPath::new();
        for contour in self.contours.iter() {
            path.extend(contour.to_bezpath()?.elements().iter().copied());
        }
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub points: Vec<Point>,
    #[serde(rename = "isClosed", default)]
    pub is_closed: bool,
}

impl Contour {
    /// The type of each point, as a UFO would have it.
    ///
    /// An on-curve point takes its type from the off-curves leading to it, wrapping
    /// around for closed contours. Open contours start with a move.
    pub fn ufo_point_types(&self) -> Result<Vec<UfoPointType>, Error> {
        let types = self
            .points
            .iter()
            .map(Point::point_type)
            .collect::<Result<Vec<_>, _>>()?;
        let n = types.len();
        let mut result = Vec::with_capacity(n);
        for (i, typ) in types.iter().enumerate() {
            if typ.is_off_curve() {
                result.push(UfoPointType::OffCurve);
                continue;
            }
            if i == 0 && !self.is_closed {
                result.push(UfoPointType::Move);
                continue;
            }
            let prev = if i == 0 { types[n - 1] } else { types[i - 1] };
            result.push(match prev {
                PointType::OffCurveCubic => UfoPointType::Curve,
                PointType::OffCurveQuad => UfoPointType::QCurve,
                PointType::OnCurve | PointType::OnCurveSmooth => UfoPointType::Line,
            });
        }
        Ok(result)
    }

    pub fn to_bezpath(&self) -> Result<BezPath, Error> {
        if self.points.is_empty() {
            return Ok(BezPath::new());
        }
        let types = self.ufo_point_types()?;
        let mut builder = GlyphPathBuilder::new();
        for (point, typ) in self.points.iter().zip(types) {
            let p = (point.x, point.y);
            match typ {
                UfoPointType::Move => builder.move_to(p)?,
                UfoPointType::Line => builder.line_to(p)?,
                UfoPointType::Curve => builder.curve_to(p)?,
                UfoPointType::QCurve => builder.qcurve_to(p)?,
                UfoPointType::OffCurve => builder.offcurve(p),
            }
        }
        builder.build()
    }
}

/// <https://unifiedfontobject.org/versions/ufo3/glyphs/glif/#point-types>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UfoPointType {
    Move,
    Line,
    OffCurve,
    Curve,
    QCurve,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub smooth: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    raw_type: Option<String>,
}

/// <https://github.com/googlefonts/fontra/blob/a4edd06837118e583804fd963c22ed806a315b04/src/fontra/core/path.py#L65-L69>
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum PointType {
    #[default]
    OnCurve,
    OffCurveQuad,
    OffCurveCubic,
    OnCurveSmooth,
}

impl PointType {
    pub fn is_off_curve(&self) -> bool {
        match self {
            PointType::OffCurveCubic | PointType::OffCurveQuad => true,
            PointType::OnCurve | PointType::OnCurveSmooth => false,
        }
    }
}

impl Point {
    pub fn on_curve(x: f64, y: f64) -> Point {
        Point {
            x,
            y,
            smooth: false,
            raw_type: None,
        }
    }

    pub fn off_curve_cubic(x: f64, y: f64) -> Point {
        Point {
            x,
            y,
            smooth: false,
            raw_type: Some("cubic".to_string()),
        }
    }

    pub fn off_curve_quad(x: f64, y: f64) -> Point {
        Point {
            x,
            y,
            smooth: false,
            raw_type: Some("quad".to_string()),
        }
    }

    /// <https://github.com/googlefonts/fontra/blob/a4edd06837118e583804fd963c22ed806a315b04/src/fontra/core/path.py#L396-L406>
    pub fn point_type(&self) -> Result<PointType, Error> {
        match (self.smooth, self.raw_type.as_deref()) {
            (false, Some("cubic")) => Ok(PointType::OffCurveCubic),
            (false, Some("quad")) => Ok(PointType::OffCurveQuad),
            (false, None) => Ok(PointType::OnCurve),
            (true, None) => Ok(PointType::OnCurveSmooth),
            _ => Err(Error::InvalidInputData(format!(
                "Unrecognized combination, smooth {}, type {:?}",
                self.smooth, self.raw_type
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: GlyphName,
    #[serde(default)]
    pub transformation: DecomposedTransform,
    // This location is in terms of axes defined by the referenced glyph
    #[serde(default)]
    pub location: HashMap<String, f64>,
}

impl Component {
    pub fn new(name: impl Into<GlyphName>) -> Component {
        Component {
            name: name.into(),
            transformation: Default::default(),
            location: Default::default(),
        }
    }
}

/// What FontTools calls a DecomposedTransform
///
/// <https://github.com/fonttools/fonttools/blob/0572f7871823bdef3ceceaf41dedd0a6bd100995/Lib/fontTools/misc/transform.py#L410-L424>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecomposedTransform {
    #[serde(rename = "translateX", default)]
    pub translate_x: f64,
    #[serde(rename = "translateY", default)]
    pub translate_y: f64,
    /// in degrees counter-clockwise in font coordinate space
    #[serde(default)]
    pub rotation: f64,
    #[serde(rename = "scaleX", default = "float_one")]
    pub scale_x: f64,
    #[serde(rename = "scaleY", default = "float_one")]
    pub scale_y: f64,
    /// in degrees clockwise in font coordinate space
    #[serde(rename = "skewX", default)]
    pub skew_x: f64,
    /// in degrees counter-clockwise in font coordinate space
    #[serde(rename = "skewY", default)]
    pub skew_y: f64,
    #[serde(rename = "tCenterX", default)]
    pub t_center_x: f64,
    #[serde(rename = "tCenterY", default)]
    pub t_center_y: f64,
}

fn float_one() -> f64 {
    1.0
}

impl Default for DecomposedTransform {
    fn default() -> Self {
        DecomposedTransform {
            translate_x: 0.0,
            translate_y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            skew_x: 0.0,
            skew_y: 0.0,
            t_center_x: 0.0,
            t_center_y: 0.0,
        }
    }
}

impl DecomposedTransform {
    /// Compose into a single affine, as fontTools `DecomposedTransform.toTransform` does.
    pub fn to_affine(&self) -> Affine {
        Affine::translate((
            self.translate_x + self.t_center_x,
            self.translate_y + self.t_center_y,
        )) * Affine::rotate(self.rotation.to_radians())
            * Affine::scale_non_uniform(self.scale_x, self.scale_y)
            * Affine::skew(
                (-self.skew_x).to_radians().tan(),
                self.skew_y.to_radians().tan(),
            )
            * Affine::translate((-self.t_center_x, -self.t_center_y))
    }
}
