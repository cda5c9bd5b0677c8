//! Builds a variable font straight from a font source, bypassing the UFO project.
//!
//! Every active glyph source is a master. Outlines land in glyf and gvar, or in
//! CFF2 for `.otf` destinations. Components are not flattened: they become
//! variable components in a VARC table, each placed at a location on its base
//! glyph's own axes. Glyph-local axes get hidden fvar axes tagged `V000`,
//! `V001` and so on.

use std::{
    cmp::{max, min},
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    env,
    path::Path,
    rc::Rc,
};

use chrono::{DateTime, TimeZone, Utc};
use fontra_source::{
    axis::{default_location, Axis},
    glyph::{GlyphSource, StaticGlyph, VariableGlyph},
    source::{FontSource, ReadableFontSource},
    GlyphName,
};
use indexmap::{IndexMap, IndexSet};
use kurbo::{cubics_to_quadratic_splines, BezPath, CubicBez, PathEl, Point, Shape};
use log::{debug, trace, warn};
use write_fonts::{
    tables::{
        cmap::Cmap,
        glyf::{Bbox, GlyfLocaBuilder, Glyph, SimpleGlyph},
        gvar::GlyphVariations,
        head::Head,
        hhea::Hhea,
        hmtx::{Hmtx, LongMetric},
        loca::LocaFormat,
        maxp::Maxp,
        post::Post,
        variations::VariationRegion,
    },
    types::{Fixed, GlyphId, LongDateTime, Tag},
    BuilderError, FontBuilder, OtRound,
};

use crate::{
    cff2::{self, CharString},
    error::Error,
    fvar::{build_avar, build_fvar, FvarAxis},
    gvar,
    hvar::build_hvar,
    materialize::CopyFailures,
    name::build_name,
    os2::{build_os2, Os2Inputs},
    varc_table::{
        axis_value_bits, build_varc, MultiVarStoreBuilder, VarcComponent,
        AXIS_VALUES_HAVE_VARIATION, HAVE_AXES, HAVE_SCALE_X, HAVE_SCALE_Y,
        RESET_UNSPECIFIED_AXES, TRANSFORM_FIELDS, TRANSFORM_HAS_VARIATION, VARC,
    },
    variations::{normalize_location, ot_round, AxisTriple, NormalizedLocation, VariationModel},
};

/// Advance of the empty glyph that stands in for one we could not build
pub const PLACEHOLDER_ADVANCE: u16 = 500;

/// Max distance, in font units, between a cubic and its quadratic approximation
const QUADRATIC_ACCURACY: f64 = 1.0;

// The TrueType epoch (1st January 1904) as a Unix timestamp.
const MACINTOSH_EPOCH: i64 = -2082844800;

const TRUETYPE_SFNT_VERSION: u32 = 0x0001_0000;
const CFF_SFNT_VERSION: u32 = 0x4F54_544F;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarcOptions {
    /// CFF2 rather than TrueType outlines
    pub build_cff2: bool,
    /// Share repeated CFF2 contours as global subroutines
    pub subroutinize: bool,
    /// Write GVAR, with a 24-bit glyph count, instead of gvar
    pub use_extended_gvar: bool,
    /// Glyphs to build, in order. Empty means all of them.
    pub glyph_names: Vec<GlyphName>,
}

impl VarcOptions {
    /// CFF2 is requested by an `.otf` destination, in any case.
    pub fn for_destination(
        destination: &Path,
        subroutinize: bool,
        use_extended_gvar: bool,
    ) -> VarcOptions {
        let build_cff2 = destination
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("otf"))
            .unwrap_or_default();
        VarcOptions {
            build_cff2,
            subroutinize,
            use_extended_gvar,
            glyph_names: Vec::new(),
        }
    }
}

/// The requested glyphs, or every glyph by name, with `.notdef` first.
pub fn glyph_order(
    requested: &[GlyphName],
    glyph_map: &BTreeMap<GlyphName, Vec<u32>>,
) -> Vec<GlyphName> {
    let mut order: Vec<GlyphName> = if requested.is_empty() {
        glyph_map.keys().cloned().collect()
    } else {
        requested.to_vec()
    };
    if !order.contains(&GlyphName::NOTDEF) {
        order.insert(0, GlyphName::NOTDEF);
    }
    order
}

fn timestamp_since_mac_epoch(datetime: DateTime<Utc>) -> i64 {
    datetime.timestamp() - MACINTOSH_EPOCH
}

/// Seconds since 1904-01-01, or since then until
/// [SOURCE_DATE_EPOCH](https://reproducible-builds.org/specs/source-date-epoch/) if set.
fn current_timestamp() -> i64 {
    let mut src_date = None;
    if let Ok(src_date_var) = env::var("SOURCE_DATE_EPOCH") {
        if let Ok(timestamp) = src_date_var.parse::<i64>() {
            src_date = Utc.timestamp_opt(timestamp, 0).single();
        };
        if src_date.is_none() {
            warn!(
                "Invalid SOURCE_DATE_EPOCH value: {:?}. Falling back to Utc::now().",
                src_date_var
            );
        }
    }
    timestamp_since_mac_epoch(src_date.unwrap_or_else(Utc::now))
}

/// Convert cubics to quadratic splines, the same way in every master.
///
/// The i-th cubic of each master is converted together with the others so the
/// results keep the same number of points.
fn to_quadratics(name: &GlyphName, paths: &[BezPath]) -> Result<Vec<BezPath>, Error> {
    let mut quadratics = vec![BezPath::new(); paths.len()];
    let Some(first) = paths.first() else {
        return Ok(quadratics);
    };
    let mut starts = vec![Point::ZERO; paths.len()];
    let mut current = vec![Point::ZERO; paths.len()];
    for i in 0..first.elements().len() {
        let elements = paths
            .iter()
            .map(|path| path.elements().get(i).copied())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                Error::Interpolation(
                    name.clone(),
                    "paths have different numbers of segments".to_string(),
                )
            })?;

        if elements.iter().all(|el| matches!(el, PathEl::CurveTo(..))) {
            let cubics: Vec<CubicBez> = elements
                .iter()
                .zip(current.iter())
                .filter_map(|(el, p0)| match *el {
                    PathEl::CurveTo(c0, c1, p) => Some(CubicBez::new(*p0, c0, c1, p)),
                    _ => None,
                })
                .collect();
            let splines = cubics_to_quadratic_splines(&cubics, QUADRATIC_ACCURACY)
                .ok_or_else(|| {
                    Error::FontBuild(format!("{name}: unable to convert {cubics:?} to quadratic"))
                })?;
            for (quadratic, spline) in quadratics.iter_mut().zip(splines.iter()) {
                for quad in spline.to_quads() {
                    quadratic.quad_to(quad.p1, quad.p2);
                }
            }
        } else {
            for (quadratic, el) in quadratics.iter_mut().zip(elements.iter()) {
                quadratic.push(*el);
            }
        }

        for ((el, start), current) in elements
            .iter()
            .zip(starts.iter_mut())
            .zip(current.iter_mut())
        {
            match *el {
                PathEl::MoveTo(p) => {
                    *start = p;
                    *current = p;
                }
                PathEl::LineTo(p) | PathEl::QuadTo(_, p) | PathEl::CurveTo(_, _, p) => *current = p,
                PathEl::ClosePath => *current = *start,
            }
        }
    }
    Ok(quadratics)
}

/// Point and contour counts must match in every master.
fn check_compatibility(
    glyph: &VariableGlyph,
    sources: &[&GlyphSource],
    layers: &[&StaticGlyph],
) -> Result<(), Error> {
    let contour_info = |layer: &StaticGlyph| -> Vec<(usize, bool)> {
        layer
            .path
            .contours
            .iter()
            .map(|c| (c.points.len(), c.is_closed))
            .collect()
    };
    let first = contour_info(layers[0]);
    for (source, layer) in sources.iter().zip(layers.iter()).skip(1) {
        if contour_info(layer) != first {
            return Err(Error::Interpolation(
                glyph.name.clone(),
                format!("contours of source '{}' do not match", source.name),
            ));
        }
    }
    Ok(())
}

/// `V000`, `V001`... for every axis of `axis_dict` that isn't global.
fn local_axis_tags(
    axis_dict: &IndexMap<String, AxisTriple>,
    global: &IndexMap<String, AxisTriple>,
) -> Result<IndexMap<String, Tag>, Error> {
    axis_dict
        .keys()
        .filter(|name| !global.contains_key(*name))
        .enumerate()
        .map(|(i, name)| {
            let tag = Tag::new_checked(format!("V{i:03}").as_bytes())
                .map_err(|_| Error::FontBuild(format!("no tag left for local axis '{name}'")))?;
            Ok((name.clone(), tag))
        })
        .collect()
}

/// Bases used by the first active source
fn component_base_names(glyph: &VariableGlyph) -> BTreeSet<GlyphName> {
    glyph
        .active_sources()
        .next()
        .and_then(|source| glyph.layer_glyph(source).ok())
        .map(|layer| layer.components.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// What a composite needs to know about one of its component bases
#[derive(Debug)]
struct BaseInfo {
    local_axis_names: BTreeSet<String>,
    /// The base, or something it uses, varies along a global axis
    responds_to_global_axes: bool,
    axis_dict: IndexMap<String, AxisTriple>,
    axis_tags: IndexMap<String, Tag>,
}

#[derive(Debug)]
struct ComponentInfo {
    name: GlyphName,
    /// One value per source for each of [`TRANSFORM_FIELDS`]
    transform: Vec<Vec<f64>>,
    /// Normalized position on the base's axes, one value per source
    location: IndexMap<String, Vec<f64>>,
    base: Rc<BaseInfo>,
    flags: u32,
}

impl ComponentInfo {
    fn field_values(&self, flag: u32) -> Option<&Vec<f64>> {
        TRANSFORM_FIELDS
            .iter()
            .position(|field| field.flag == flag)
            .map(|i| &self.transform[i])
    }

    /// Decide what gets written, dropping axes that say nothing.
    fn settle_flags(&mut self, num_sources: usize) {
        self.location.retain(|_, values| !values.is_empty());

        let mut flags = 0;
        if !self.base.responds_to_global_axes {
            flags |= RESET_UNSPECIFIED_AXES;
        }
        for (field, values) in TRANSFORM_FIELDS.iter().zip(self.transform.iter()) {
            if values.iter().any(|v| *v != field.default) {
                flags |= field.flag;
                if values.iter().any(|v| *v != values[0]) {
                    flags |= TRANSFORM_HAS_VARIATION;
                }
            }
        }
        // a missing scaleY reads as scaleX
        if self.field_values(HAVE_SCALE_X) == self.field_values(HAVE_SCALE_Y) {
            flags &= !HAVE_SCALE_Y;
        } else {
            flags |= HAVE_SCALE_Y;
        }

        let mut at_default = Vec::new();
        for (axis_name, values) in self.location.iter() {
            if values.iter().any(|v| *v != values[0]) {
                flags |= AXIS_VALUES_HAVE_VARIATION;
            } else if values[0] == 0.0 {
                at_default.push(axis_name.clone());
            }
        }
        if flags & RESET_UNSPECIFIED_AXES != 0 {
            for axis_name in at_default {
                self.location.shift_remove(&axis_name);
            }
        } else {
            // pin the base's local axes, the parent may reuse their tags
            for axis_name in self.base.local_axis_names.iter() {
                if !self.location.contains_key(axis_name) {
                    self.location
                        .insert(axis_name.clone(), vec![0.0; num_sources]);
                }
            }
        }
        if !self.location.is_empty() {
            flags |= HAVE_AXES;
        }
        self.flags = flags;
    }

    fn to_varc_component(
        &self,
        glyph: &GlyphInfo,
        gids: &HashMap<&GlyphName, u32>,
        axis_tags: &[Tag],
        axis_indices: &mut IndexSet<Vec<u16>>,
        store: &mut MultiVarStoreBuilder,
    ) -> Result<VarcComponent, Error> {
        let gid = *gids.get(&self.name).ok_or_else(|| {
            Error::FontBuild(format!("component base '{}' is not in the font", self.name))
        })?;
        let default_idx = glyph.default_source_index;
        let num_sources = glyph.advances.len();
        let model = || {
            glyph.model.as_ref().ok_or_else(|| {
                Error::FontBuild(format!("'{}' varies without a variation model", self.name))
            })
        };
        let mut component = VarcComponent {
            flags: self.flags,
            gid,
            ..Default::default()
        };

        let fields: Vec<_> = TRANSFORM_FIELDS
            .iter()
            .zip(self.transform.iter())
            .filter(|(field, _)| self.flags & field.flag != 0)
            .collect();
        component.transform = fields
            .iter()
            .map(|(field, values)| field.to_stored(values[default_idx]) as i32)
            .collect();
        if self.flags & TRANSFORM_HAS_VARIATION != 0 {
            let masters: Vec<Vec<f64>> = (0..num_sources)
                .map(|i| {
                    fields
                        .iter()
                        .map(|(field, values)| field.to_stored(values[i]))
                        .collect()
                })
                .collect();
            component.transform_var_index = Some(store.store_masters(model()?, &masters)?);
        }

        if self.flags & HAVE_AXES != 0 {
            let mut location = self
                .location
                .iter()
                .map(|(axis_name, values)| {
                    self.base
                        .axis_tags
                        .get(axis_name)
                        .map(|tag| (*tag, values))
                        .ok_or_else(|| {
                            Error::FontBuild(format!(
                                "'{}' has no axis '{axis_name}'",
                                self.name
                            ))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            location.sort_by_key(|(tag, _)| *tag);
            let indices = location
                .iter()
                .map(|(tag, _)| {
                    axis_tags
                        .iter()
                        .position(|t| t == tag)
                        .map(|i| i as u16)
                        .ok_or_else(|| Error::FontBuild(format!("no fvar axis {tag}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let (index, _) = axis_indices.insert_full(indices);
            component.axis_indices_index = Some(index as u32);
            component.axis_values = location
                .iter()
                .map(|(_, values)| axis_value_bits(values[default_idx]) as i32)
                .collect();
            if self.flags & AXIS_VALUES_HAVE_VARIATION != 0 {
                let masters: Vec<Vec<f64>> = (0..num_sources)
                    .map(|i| {
                        location
                            .iter()
                            .map(|(_, values)| axis_value_bits(values[i]))
                            .collect()
                    })
                    .collect();
                component.axis_values_var_index =
                    Some(store.store_masters(model()?, &masters)?);
            }
        }
        Ok(component)
    }
}

#[derive(Debug)]
enum Outline {
    TrueType {
        /// The default master
        glyph: Glyph,
        /// Every master's points, phantom points included
        master_points: Vec<Vec<(f64, f64)>>,
    },
    Cff2(CharString),
}

/// Everything the font needs about one glyph
#[derive(Debug)]
struct GlyphInfo {
    has_contours: bool,
    advance: u16,
    /// Advance of each master
    advances: Vec<f64>,
    left_side_bearing: i16,
    bounds: Option<Bbox>,
    outline: Outline,
    components: Vec<ComponentInfo>,
    local_axis_tags: BTreeSet<Tag>,
    model: Option<VariationModel>,
    default_source_index: usize,
}

impl GlyphInfo {
    fn placeholder(build_cff2: bool) -> GlyphInfo {
        GlyphInfo {
            has_contours: false,
            advance: PLACEHOLDER_ADVANCE,
            advances: vec![PLACEHOLDER_ADVANCE as f64],
            left_side_bearing: 0,
            bounds: None,
            outline: if build_cff2 {
                Outline::Cff2(CharString::empty())
            } else {
                Outline::TrueType {
                    glyph: Glyph::Empty,
                    master_points: Vec::new(),
                }
            },
            components: Vec::new(),
            local_axis_tags: BTreeSet::new(),
            model: None,
            default_source_index: 0,
        }
    }

    fn num_points_and_contours(&self) -> (u16, u16) {
        match &self.outline {
            Outline::TrueType {
                glyph: Glyph::Simple(simple),
                ..
            } => (
                simple.contours.iter().map(|c| c.len() as u16).sum(),
                simple.contours.len() as u16,
            ),
            _ => (0, 0),
        }
    }

    /// HVAR deltas, one per non-default support.
    fn advance_deltas(
        &self,
        name: &GlyphName,
        axis_tags: &[Tag],
    ) -> Result<Vec<(VariationRegion, i16)>, Error> {
        let Some(model) = &self.model else {
            return Ok(Vec::new());
        };
        let masters: Vec<Vec<f64>> = self.advances.iter().map(|a| vec![*a]).collect();
        let deltas = model.deltas(&masters, ot_round)?;
        model
            .supports()
            .iter()
            .zip(deltas)
            .skip(1)
            .map(|(support, delta)| {
                let delta = i16::try_from(delta[0] as i64).map_err(|_| {
                    Error::FontBuild(format!("{name}: advance delta {} does not fit", delta[0]))
                })?;
                Ok((support.to_write_fonts_variation_region(axis_tags), delta))
            })
            .collect()
    }
}

/// Glyf outline of the default master plus every master's points.
fn truetype_outline(
    name: &GlyphName,
    paths: &[BezPath],
    advances: &[f64],
    default_idx: usize,
) -> Result<Outline, Error> {
    let mut glyphs: Vec<Option<SimpleGlyph>> = if paths[default_idx].elements().is_empty() {
        vec![None; paths.len()]
    } else {
        let quadratics = to_quadratics(name, paths)?;
        SimpleGlyph::interpolatable_glyphs_from_bezpaths(&quadratics)
            .map_err(|e| Error::Interpolation(name.clone(), format!("{e:?}")))?
            .into_iter()
            .map(Some)
            .collect()
    };
    let master_points = glyphs
        .iter()
        .zip(advances.iter())
        .map(|(glyph, advance)| {
            let mut points: Vec<(f64, f64)> = glyph
                .iter()
                .flat_map(|g| g.contours.iter())
                .flat_map(|c| c.iter())
                .map(|p| (p.x as f64, p.y as f64))
                .collect();
            points.extend([(0.0, 0.0), (*advance, 0.0), (0.0, 0.0), (0.0, 0.0)]);
            points
        })
        .collect();
    let glyph = glyphs
        .swap_remove(default_idx)
        .map(Glyph::Simple)
        .unwrap_or(Glyph::Empty);
    Ok(Outline::TrueType {
        glyph,
        master_points,
    })
}

/// Walks the glyph order, preparing each glyph and appending component bases.
struct Builder<'a> {
    source: &'a dyn ReadableFontSource,
    build_cff2: bool,
    font_sources: IndexMap<String, FontSource>,
    /// Global axes in design space
    global_axis_dict: IndexMap<String, AxisTriple>,
    global_axis_tags: IndexMap<String, Tag>,
    glyphs: HashMap<GlyphName, Option<Rc<VariableGlyph>>>,
    base_infos: HashMap<GlyphName, Rc<BaseInfo>>,
    order: Vec<GlyphName>,
}

impl<'a> Builder<'a> {
    fn new(
        source: &'a dyn ReadableFontSource,
        axes: &[Axis],
        build_cff2: bool,
        order: Vec<GlyphName>,
    ) -> Result<Builder<'a>, Error> {
        Ok(Builder {
            source,
            build_cff2,
            font_sources: source.sources()?,
            global_axis_dict: axes
                .iter()
                .map(|axis| {
                    let triple = AxisTriple::new(
                        axis.min_design().to_f64(),
                        axis.default_design().to_f64(),
                        axis.max_design().to_f64(),
                    );
                    (axis.name.clone(), triple)
                })
                .collect(),
            global_axis_tags: axes
                .iter()
                .map(|axis| (axis.name.clone(), axis.tag))
                .collect(),
            glyphs: HashMap::new(),
            base_infos: HashMap::new(),
            order,
        })
    }

    fn source_glyph(&mut self, name: &GlyphName) -> Result<Option<Rc<VariableGlyph>>, Error> {
        if let Some(glyph) = self.glyphs.get(name) {
            return Ok(glyph.clone());
        }
        let glyph = self.source.glyph(name)?.map(Rc::new);
        self.glyphs.insert(name.clone(), glyph.clone());
        Ok(glyph)
    }

    /// Design location of a glyph source; a location base decides the global axes.
    fn source_location(&self, source: &GlyphSource) -> BTreeMap<String, f64> {
        let mut location: BTreeMap<String, f64> = source
            .location
            .iter()
            .map(|(name, pos)| (name.clone(), pos.to_f64()))
            .collect();
        if let Some(font_source) = source
            .location_base
            .as_ref()
            .and_then(|base| self.font_sources.get(base))
        {
            location.extend(
                font_source
                    .location
                    .iter()
                    .filter(|(name, _)| self.global_axis_dict.contains_key(*name))
                    .map(|(name, pos)| (name.clone(), pos.to_f64())),
            );
        }
        location
    }

    fn base_info(
        &mut self,
        name: &GlyphName,
        stack: &mut Vec<GlyphName>,
    ) -> Result<Rc<BaseInfo>, Error> {
        if let Some(info) = self.base_infos.get(name) {
            return Ok(info.clone());
        }
        if stack.contains(name) {
            return Err(Error::ComponentCycle(name.clone()));
        }
        let glyph = self
            .source_glyph(name)?
            .ok_or_else(|| Error::MissingBaseGlyph(name.clone()))?;
        let local_axis_names: BTreeSet<String> =
            glyph.axes.iter().map(|axis| axis.name.clone()).collect();

        let mut responds_to_global_axes = glyph.sources.iter().any(|source| {
            self.source_location(source)
                .into_iter()
                .any(|(axis_name, value)| {
                    !local_axis_names.contains(&axis_name)
                        && self
                            .global_axis_dict
                            .get(&axis_name)
                            .is_some_and(|axis| axis.default != value)
                })
        });
        stack.push(name.clone());
        for nested in component_base_names(&glyph) {
            let nested = self.base_info(&nested, stack)?;
            responds_to_global_axes |= nested.responds_to_global_axes;
        }
        stack.pop();

        let mut axis_dict = self.global_axis_dict.clone();
        axis_dict.extend(glyph.axes.iter().map(|axis| {
            let triple = AxisTriple::new(axis.min_value, axis.default_value, axis.max_value);
            (axis.name.clone(), triple.symmetric())
        }));
        let mut axis_tags = self.global_axis_tags.clone();
        axis_tags.extend(local_axis_tags(&axis_dict, &self.global_axis_dict)?);

        trace!("{name}: local axes {local_axis_names:?}, responds to global axes {responds_to_global_axes}");
        let info = Rc::new(BaseInfo {
            local_axis_names,
            responds_to_global_axes,
            axis_dict,
            axis_tags,
        });
        self.base_infos.insert(name.clone(), info.clone());
        Ok(info)
    }

    fn collect_component_info(
        &mut self,
        glyph: &VariableGlyph,
        layers: &[&StaticGlyph],
    ) -> Result<Vec<ComponentInfo>, Error> {
        let mut components = Vec::new();
        for (i, component) in layers[0].components.iter().enumerate() {
            let axis_names: BTreeSet<&String> = layers
                .iter()
                .filter_map(|layer| layer.components.get(i))
                .flat_map(|c| c.location.keys())
                .collect();
            let base = self.base_info(&component.name, &mut vec![glyph.name.clone()])?;
            components.push(ComponentInfo {
                name: component.name.clone(),
                transform: vec![Vec::with_capacity(layers.len()); TRANSFORM_FIELDS.len()],
                location: axis_names
                    .into_iter()
                    .map(|axis_name| (axis_name.clone(), Vec::new()))
                    .collect(),
                base,
                flags: 0,
            });
        }

        for layer in layers.iter() {
            if layer.components.len() != components.len() {
                return Err(Error::Interpolation(
                    glyph.name.clone(),
                    format!(
                        "{} components vs. {}",
                        layer.components.len(),
                        components.len()
                    ),
                ));
            }
            for (info, component) in components.iter_mut().zip(layer.components.iter()) {
                if component.name != info.name {
                    return Err(Error::Interpolation(
                        glyph.name.clone(),
                        format!("component '{}' vs. '{}'", component.name, info.name),
                    ));
                }
                for (values, field) in info.transform.iter_mut().zip(TRANSFORM_FIELDS.iter()) {
                    values.push(field.value(&component.transformation));
                }
                let normalized = normalize_location(
                    component.location.iter().map(|(n, v)| (n, *v)),
                    &info.base.axis_dict,
                );
                for (axis_name, value) in normalized {
                    if let Some(values) = info.location.get_mut(&axis_name) {
                        values.push(value);
                    }
                }
            }
        }

        for info in components.iter_mut() {
            info.settle_flags(layers.len());
        }
        Ok(components)
    }

    fn prepare_glyph(&mut self, name: &GlyphName) -> Result<GlyphInfo, Error> {
        let glyph = self
            .source_glyph(name)?
            .ok_or_else(|| fontra_source::Error::NoGlyph(name.clone()))?;
        let sources: Vec<&GlyphSource> = glyph.active_sources().collect();
        if sources.is_empty() {
            return Err(fontra_source::Error::InvalidInputData(format!(
                "{name} has no active sources"
            ))
            .into());
        }
        let layers = sources
            .iter()
            .map(|source| glyph.layer_glyph(source))
            .collect::<Result<Vec<_>, _>>()?;
        check_compatibility(&glyph, &sources, &layers)?;

        let mut axis_dict = self.global_axis_dict.clone();
        axis_dict.extend(glyph.axes.iter().map(|axis| {
            let triple = AxisTriple::new(axis.min_value, axis.default_value, axis.max_value);
            (axis.name.clone(), triple.symmetric())
        }));
        let local_tags = local_axis_tags(&axis_dict, &self.global_axis_dict)?;
        let mut axis_tags = self.global_axis_tags.clone();
        axis_tags.extend(local_tags.iter().map(|(name, tag)| (name.clone(), *tag)));

        let locations: Vec<NormalizedLocation> = sources
            .iter()
            .map(|source| {
                let location = self.source_location(source);
                normalize_location(location.iter().map(|(n, v)| (n, *v)), &axis_dict)
                    .into_iter()
                    .filter_map(|(axis_name, value)| axis_tags.get(&axis_name).map(|t| (*t, value)))
                    .collect()
            })
            .collect();
        let model = if locations.len() >= 2 {
            let axis_order: Vec<Tag> = self.global_axis_tags.values().copied().collect();
            Some(VariationModel::new(&locations, &axis_order)?)
        } else {
            None
        };
        let default_idx = model
            .as_ref()
            .map(VariationModel::default_index)
            .unwrap_or_default();
        let default_layer = layers[default_idx];
        trace!("{name}: default source is '{}'", sources[default_idx].name);

        let paths = layers
            .iter()
            .map(|layer| layer.path.to_bezpath())
            .collect::<Result<Vec<_>, _>>()?;
        let advances: Vec<f64> = layers.iter().map(|layer| layer.x_advance).collect();

        let (outline, bounds) = if self.build_cff2 {
            let charstring = cff2::build_charstring(name.as_str(), &paths, model.as_ref())?;
            let default_path = &paths[default_idx];
            let bounds = (!default_path.elements().is_empty())
                .then(|| Bbox::from(default_path.bounding_box()));
            (Outline::Cff2(charstring), bounds)
        } else {
            let outline = truetype_outline(name, &paths, &advances, default_idx)?;
            let bounds = match &outline {
                Outline::TrueType { glyph, .. } => glyph.bbox(),
                Outline::Cff2(_) => None,
            };
            (outline, bounds)
        };

        let components = self.collect_component_info(&glyph, &layers)?;
        let mut local_axis_tags: BTreeSet<Tag> = local_tags.values().copied().collect();
        for component in components.iter() {
            local_axis_tags.extend(
                component
                    .location
                    .keys()
                    .filter(|axis_name| !self.global_axis_dict.contains_key(*axis_name))
                    .filter_map(|axis_name| component.base.axis_tags.get(axis_name)),
            );
        }

        Ok(GlyphInfo {
            has_contours: !default_layer.path.is_empty(),
            advance: default_layer.x_advance.max(0.0).ot_round(),
            advances,
            left_side_bearing: bounds.map(|b| b.x_min).unwrap_or_default(),
            bounds,
            outline,
            components,
            local_axis_tags,
            model,
            default_source_index: default_idx,
        })
    }

    /// Prepare every glyph of the order, appending component bases it lacks.
    ///
    /// Glyphs that cannot be built become empty placeholders and are reported.
    fn prepare_glyphs(
        &mut self,
        glyph_map: &BTreeMap<GlyphName, Vec<u32>>,
    ) -> Result<(Vec<GlyphInfo>, CopyFailures), Error> {
        let mut known: HashSet<GlyphName> = self.order.iter().cloned().collect();
        let mut infos = Vec::with_capacity(self.order.len());
        let mut failures = CopyFailures::default();

        let mut idx = 0;
        while idx < self.order.len() {
            let name = self.order[idx].clone();
            idx += 1;
            let info = if !glyph_map.contains_key(&name) {
                if name != GlyphName::NOTDEF {
                    warn!("'{name}' is not in the glyph map, using a placeholder");
                    failures.record(name.clone(), "not in the glyph map");
                }
                GlyphInfo::placeholder(self.build_cff2)
            } else {
                match self.prepare_glyph(&name) {
                    Ok(info) => info,
                    Err(
                        e @ (Error::Interpolation(..)
                        | Error::MissingBaseGlyph(..)
                        | Error::VariationModel(..)
                        | Error::ComponentCycle(..)),
                    ) => {
                        warn!("Unable to build '{name}', using a placeholder: {e}");
                        failures.record(name.clone(), e);
                        GlyphInfo::placeholder(self.build_cff2)
                    }
                    Err(e) => return Err(e),
                }
            };

            for component in info.components.iter() {
                if known.insert(component.name.clone()) {
                    debug!("Appending component base '{}' to the glyph order", component.name);
                    self.order.push(component.name.clone());
                }
            }
            infos.push(info);
        }
        Ok((infos, failures))
    }
}

fn build_error(e: BuilderError) -> Error {
    Error::FontBuild(e.to_string())
}

fn build_cmap(
    glyph_map: &BTreeMap<GlyphName, Vec<u32>>,
    gids: &HashMap<&GlyphName, u32>,
) -> Result<Cmap, Error> {
    let mut mappings = Vec::new();
    for (name, codepoints) in glyph_map.iter() {
        let Some(gid) = gids.get(name) else {
            continue;
        };
        for codepoint in codepoints {
            match char::from_u32(*codepoint) {
                Some(c) => mappings.push((c, GlyphId::new(*gid))),
                None => warn!("{name}: U+{codepoint:04X} is not a valid character, not mapped"),
            }
        }
    }
    Cmap::from_mappings(mappings).map_err(|e| Error::FontBuild(format!("cmap: {e}")))
}

fn build_hhea_hmtx(
    glyphs: &[GlyphInfo],
    line_metrics: Option<&FontSource>,
    units_per_em: u16,
) -> Result<(Hhea, Hmtx), Error> {
    let metric = |name: &str, fallback: f64| {
        line_metrics
            .and_then(|s| s.line_metrics.get(name))
            .map(|m| m.value)
            .unwrap_or(fallback)
    };
    let ascender: i16 = metric("ascender", 0.8 * units_per_em as f64).ot_round();
    let descender: i16 = metric("descender", -0.2 * units_per_em as f64).ot_round();

    let mut min_left_side_bearing = None;
    let mut min_right_side_bearing = None;
    let mut x_max_extent = None;
    let long_metrics: Vec<LongMetric> = glyphs
        .iter()
        .map(|glyph| {
            if let Some(bbox) = glyph.bounds {
                let rsb = glyph.advance as i32 - bbox.x_max as i32;
                min_left_side_bearing =
                    Some(min_left_side_bearing.map_or(bbox.x_min, |v| min(v, bbox.x_min)));
                min_right_side_bearing =
                    Some(min_right_side_bearing.map_or(rsb, |v| min(v, rsb)));
                x_max_extent = Some(x_max_extent.map_or(bbox.x_max, |v| max(v, bbox.x_max)));
            }
            LongMetric {
                advance: glyph.advance,
                side_bearing: glyph.left_side_bearing,
            }
        })
        .collect();

    let min_right_side_bearing: i16 = min_right_side_bearing
        .unwrap_or_default()
        .try_into()
        .map_err(|_| {
            Error::FontBuild(format!(
                "min_right_side_bearing {min_right_side_bearing:?} out of bounds"
            ))
        })?;
    let hhea = Hhea {
        ascender: ascender.into(),
        descender: descender.into(),
        advance_width_max: long_metrics
            .iter()
            .map(|m| m.advance)
            .max()
            .unwrap_or_default()
            .into(),
        min_left_side_bearing: min_left_side_bearing.unwrap_or_default().into(),
        min_right_side_bearing: min_right_side_bearing.into(),
        x_max_extent: x_max_extent.unwrap_or_default().into(),
        caret_slope_rise: 1,
        number_of_h_metrics: long_metrics.len() as u16,
        ..Default::default()
    };
    Ok((hhea, Hmtx::new(long_metrics, Vec::new())))
}

fn build_maxp(glyphs: &[GlyphInfo], build_cff2: bool) -> Maxp {
    if build_cff2 {
        return Maxp::new(glyphs.len() as u16);
    }
    let (max_points, max_contours) = glyphs
        .iter()
        .map(GlyphInfo::num_points_and_contours)
        .fold((0, 0), |(p, c), (gp, gc)| (max(p, gp), max(c, gc)));
    Maxp {
        num_glyphs: glyphs.len() as u16,
        max_points: Some(max_points),
        max_contours: Some(max_contours),
        max_composite_points: Some(0),
        max_composite_contours: Some(0),
        max_zones: Some(1),
        max_twilight_points: Some(0),
        max_storage: Some(0),
        max_function_defs: Some(0),
        max_instruction_defs: Some(0),
        max_stack_elements: Some(0),
        max_size_of_instructions: Some(0),
        max_component_elements: Some(0),
        max_component_depth: Some(0),
    }
}

/// VARC for every glyph with components, `None` when there are none.
///
/// A glyph with both contours and components lists itself last, standing for
/// its own outline.
fn build_varc_table(
    glyphs: &[GlyphInfo],
    gids: &HashMap<&GlyphName, u32>,
    axis_tags: &[Tag],
) -> Result<Option<Vec<u8>>, Error> {
    if glyphs.iter().all(|glyph| glyph.components.is_empty()) {
        return Ok(None);
    }
    let mut store = MultiVarStoreBuilder::new(axis_tags.to_vec());
    let mut axis_indices = IndexSet::new();
    let mut composites = Vec::new();
    for (gid, glyph) in glyphs.iter().enumerate() {
        if glyph.components.is_empty() {
            continue;
        }
        let mut components = glyph
            .components
            .iter()
            .map(|c| c.to_varc_component(glyph, gids, axis_tags, &mut axis_indices, &mut store))
            .collect::<Result<Vec<_>, _>>()?;
        if glyph.has_contours {
            components.push(VarcComponent {
                gid: gid as u32,
                ..Default::default()
            });
        }
        composites.push((gid as u16, components));
    }
    let axis_indices: Vec<Vec<u16>> = axis_indices.into_iter().collect();
    build_varc(&composites, &axis_indices, &store).map(Some)
}

/// FontBuilder always writes the TrueType sfnt version; CFF outlines want `OTTO`.
///
/// The whole-font checksum moves with the version, so head's adjustment does too.
fn mark_as_cff(bytes: &mut [u8]) -> Result<(), Error> {
    let read_u32 = |bytes: &[u8], pos: usize| {
        bytes
            .get(pos..pos + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    };
    let num_tables = bytes
        .get(4..6)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .unwrap_or_default();
    let head_offset = (0..num_tables as usize)
        .map(|i| 12 + 16 * i)
        .find(|record| bytes.get(*record..*record + 4) == Some(&b"head"[..]))
        .and_then(|record| read_u32(bytes, record + 8))
        .ok_or_else(|| Error::FontBuild("font has no head table".to_string()))?;
    let adjustment_pos = head_offset as usize + 8;
    let adjustment = read_u32(bytes, adjustment_pos)
        .ok_or_else(|| Error::FontBuild("head table is truncated".to_string()))?;

    bytes[0..4].copy_from_slice(&CFF_SFNT_VERSION.to_be_bytes());
    let adjustment = adjustment.wrapping_sub(CFF_SFNT_VERSION.wrapping_sub(TRUETYPE_SFNT_VERSION));
    bytes[adjustment_pos..adjustment_pos + 4].copy_from_slice(&adjustment.to_be_bytes());
    Ok(())
}

fn font_revision(major: Option<i64>, minor: Option<i64>) -> Fixed {
    let major = major.unwrap_or(1) as f64;
    let minor = minor.unwrap_or_default() as f64;
    Fixed::from_f64(major + minor / 1000.0)
}

/// Compile `source` to font bytes, reporting glyphs replaced by placeholders.
pub fn build_font(
    source: &dyn ReadableFontSource,
    options: &VarcOptions,
) -> Result<(Vec<u8>, CopyFailures), Error> {
    debug!(
        "Building {} font, subroutinize {}, extended gvar {}",
        if options.build_cff2 { "CFF2" } else { "TrueType" },
        options.subroutinize,
        options.use_extended_gvar
    );
    let units_per_em = source.units_per_em()?;
    let glyph_map = source.glyph_map()?;
    let axes = source.axes()?;
    let font_info = source.font_info()?;

    let mut builder = Builder::new(
        source,
        &axes,
        options.build_cff2,
        glyph_order(&options.glyph_names, &glyph_map),
    )?;
    let (glyphs, failures) = builder.prepare_glyphs(&glyph_map)?;
    let order = builder.order;
    if glyphs.len() > u16::MAX as usize {
        return Err(Error::FontBuild(format!(
            "{} glyphs is more than a font can hold",
            glyphs.len()
        )));
    }
    let gids: HashMap<&GlyphName, u32> = order
        .iter()
        .enumerate()
        .map(|(gid, name)| (name, gid as u32))
        .collect();

    let local_tags: BTreeSet<Tag> = glyphs
        .iter()
        .flat_map(|glyph| glyph.local_axis_tags.iter().copied())
        .collect();
    let fvar_axes: Vec<FvarAxis> = axes
        .iter()
        .map(FvarAxis::global)
        .chain(local_tags.into_iter().map(FvarAxis::local))
        .collect();
    let axis_tags: Vec<Tag> = fvar_axes.iter().map(|axis| axis.tag).collect();
    let is_variable = !axis_tags.is_empty();

    let mut font = FontBuilder::new();
    let mut loca_format = LocaFormat::Short;
    if options.build_cff2 {
        let charstrings: Vec<CharString> = glyphs
            .iter()
            .map(|glyph| match &glyph.outline {
                Outline::Cff2(charstring) => charstring.clone(),
                Outline::TrueType { .. } => CharString::empty(),
            })
            .collect();
        let cff2 = cff2::build_cff2(units_per_em, &charstrings, &axis_tags, options.subroutinize)?;
        font.add_raw(Tag::new(b"CFF2"), cff2);
    } else {
        let mut glyf_loca = GlyfLocaBuilder::new();
        let mut variations = Vec::with_capacity(glyphs.len());
        for (gid, (glyph, name)) in glyphs.iter().zip(order.iter()).enumerate() {
            let Outline::TrueType {
                glyph: outline,
                master_points,
            } = &glyph.outline
            else {
                return Err(Error::FontBuild(format!("{name} has no TrueType outline")));
            };
            glyf_loca
                .add_glyph(outline)
                .map_err(|e| Error::FontBuild(format!("{name}: {e:?}")))?;
            variations.push(match &glyph.model {
                Some(model) if is_variable => GlyphVariations::new(
                    GlyphId::new(gid as u32),
                    gvar::glyph_deltas(name.as_str(), model, &axis_tags, master_points)?,
                ),
                _ => gvar::empty_variations(gid as u32),
            });
        }
        let (glyf, loca, format) = glyf_loca.build();
        loca_format = format;
        font.add_table(&glyf)
            .and_then(|f| f.add_table(&loca))
            .map_err(build_error)?;
        if is_variable {
            let (tag, gvar) =
                gvar::build_gvar(variations, axis_tags.len() as u16, options.use_extended_gvar)?;
            font.add_raw(tag, gvar);
        }
    }

    if let Some(fvar) = build_fvar(&fvar_axes) {
        font.add_table(&fvar).map_err(build_error)?;
    }
    if let Some(avar) = build_avar(&fvar_axes) {
        font.add_table(&avar).map_err(build_error)?;
    }
    if is_variable {
        let advance_deltas = glyphs
            .iter()
            .zip(order.iter())
            .map(|(glyph, name)| glyph.advance_deltas(name, &axis_tags))
            .collect::<Result<Vec<_>, _>>()?;
        let hvar = build_hvar(axis_tags.len() as u16, &advance_deltas)?;
        font.add_table(&hvar).map_err(build_error)?;
    }
    if let Some(varc) = build_varc_table(&glyphs, &gids, &axis_tags)? {
        font.add_raw(VARC, varc);
    }

    let bbox = glyphs
        .iter()
        .filter_map(|glyph| glyph.bounds)
        .reduce(Bbox::union)
        .unwrap_or_default();
    let now = LongDateTime::new(current_timestamp());
    let head = Head {
        font_revision: font_revision(font_info.version_major, font_info.version_minor),
        units_per_em,
        created: now,
        modified: now,
        x_min: bbox.x_min,
        y_min: bbox.y_min,
        x_max: bbox.x_max,
        y_max: bbox.y_max,
        index_to_loc_format: match loca_format {
            LocaFormat::Short => 0,
            LocaFormat::Long => 1,
        },
        ..Default::default()
    };

    let sources = source.sources()?;
    let defaults = default_location(&axes);
    let default_source = sources
        .values()
        .find(|s| s.location.with_defaults(&defaults) == defaults)
        .or_else(|| sources.values().next());
    let (hhea, hmtx) = build_hhea_hmtx(&glyphs, default_source, units_per_em)?;
    let cmap = build_cmap(&glyph_map, &gids)?;
    let advances: Vec<u16> = glyphs.iter().map(|glyph| glyph.advance).collect();
    let codepoints: Vec<u32> = glyph_map
        .iter()
        .filter(|(name, _)| gids.contains_key(name))
        .flat_map(|(_, codepoints)| codepoints.iter().copied())
        .collect();
    let os2 = build_os2(&Os2Inputs {
        advances: &advances,
        codepoints: &codepoints,
        default_source,
        units_per_em,
        y_min: bbox.y_min,
        y_max: bbox.y_max,
        vendor_id: font_info.vendor_id.as_deref(),
    });
    let name = build_name(&font_info, &fvar_axes);
    let post = Post::new_v2(order.iter().map(GlyphName::as_str));

    font.add_table(&head)
        .and_then(|f| f.add_table(&hhea))
        .and_then(|f| f.add_table(&build_maxp(&glyphs, options.build_cff2)))
        .and_then(|f| f.add_table(&hmtx))
        .and_then(|f| f.add_table(&cmap))
        .and_then(|f| f.add_table(&os2))
        .and_then(|f| f.add_table(&name))
        .and_then(|f| f.add_table(&post))
        .map_err(build_error)?;
    let mut bytes = font.build();
    if options.build_cff2 {
        mark_as_cff(&mut bytes)?;
    }
    debug!(
        "Built {} glyphs on {} axes, {} placeholders",
        glyphs.len(),
        axis_tags.len(),
        failures.len()
    );
    Ok((bytes, failures))
}

#[cfg(test)]
mod tests {
    use fontra_source::{
        coords::DesignCoord,
        glyph::{Component, Contour, GlyphAxis, Layer, Path as GlyphPath, Point as GlyphPoint},
        source::InMemoryFont,
        FontraBackend,
    };
    use pretty_assertions::assert_eq;
    use write_fonts::{
        read::{
            tables::{cff2::Cff2, gvar::Gvar as ReadGvar, hvar::Hvar as ReadHvar, varc::Varc},
            FontRead, FontRef, TableProvider,
        },
        types::F2Dot14,
    };

    use crate::{
        test::testdata_dir,
        varc_table::{HAVE_TRANSLATE_X, TRANSFORM_HAS_VARIATION},
    };

    use super::*;

    fn names(names: &[&str]) -> Vec<GlyphName> {
        names.iter().map(|n| GlyphName::new(n)).collect()
    }

    fn square(x: f64, size: f64) -> GlyphPath {
        GlyphPath {
            contours: vec![Contour {
                points: vec![
                    GlyphPoint::on_curve(x, 0.0),
                    GlyphPoint::on_curve(x, size),
                    GlyphPoint::on_curve(x + size, size),
                    GlyphPoint::on_curve(x + size, 0.0),
                ],
                is_closed: true,
            }],
        }
    }

    fn glyph(name: &str, drawing: StaticGlyph) -> VariableGlyph {
        VariableGlyph {
            name: name.into(),
            axes: Vec::new(),
            sources: vec![GlyphSource::new("default", "default")],
            layers: [("default".to_string(), Layer { glyph: drawing })]
                .into_iter()
                .collect(),
        }
    }

    fn font() -> InMemoryFont {
        let mut font = InMemoryFont::new(1000);
        font.add_glyph(
            vec![0x41],
            glyph(
                "A",
                StaticGlyph {
                    x_advance: 600.0,
                    path: square(50.0, 500.0),
                    components: Vec::new(),
                },
            ),
        );
        let mut component = Component::new("A");
        component.transformation.translate_x = 100.0;
        font.add_glyph(
            vec![0xC0],
            glyph(
                "Agrave",
                StaticGlyph {
                    x_advance: 700.0,
                    path: Default::default(),
                    components: vec![component],
                },
            ),
        );
        font.add_glyph(
            vec![0x20],
            glyph(
                "space",
                StaticGlyph {
                    x_advance: 250.0,
                    ..Default::default()
                },
            ),
        );
        font
    }

    /// "base" bends along its own axis; "user" places it halfway.
    fn font_with_local_axis() -> InMemoryFont {
        let mut font = InMemoryFont::new(1000);
        let bent = |size: f64| StaticGlyph {
            x_advance: 500.0,
            path: square(0.0, size),
            components: Vec::new(),
        };
        let mut location = fontra_source::coords::DesignLocation::new();
        location.insert("bend", DesignCoord::new(100.0));
        font.add_glyph(
            Vec::new(),
            VariableGlyph {
                name: "base".into(),
                axes: vec![GlyphAxis {
                    name: "bend".to_string(),
                    min_value: 0.0,
                    default_value: 0.0,
                    max_value: 100.0,
                }],
                sources: vec![
                    GlyphSource::new("default", "default"),
                    GlyphSource::new("bent", "bent").at(location),
                ],
                layers: [
                    ("default".to_string(), Layer { glyph: bent(100.0) }),
                    ("bent".to_string(), Layer { glyph: bent(200.0) }),
                ]
                .into_iter()
                .collect(),
            },
        );
        let mut component = Component::new("base");
        component.location.insert("bend".to_string(), 50.0);
        font.add_glyph(
            vec![0x61],
            glyph(
                "user",
                StaticGlyph {
                    x_advance: 500.0,
                    path: Default::default(),
                    components: vec![component],
                },
            ),
        );
        font
    }

    fn mutator_sans() -> FontraBackend {
        FontraBackend::new(testdata_dir().join("MutatorSansLite.fontra")).unwrap()
    }

    fn builder(source: &dyn ReadableFontSource) -> Builder<'_> {
        let glyph_map = source.glyph_map().unwrap();
        Builder::new(
            source,
            &source.axes().unwrap(),
            false,
            glyph_order(&[], &glyph_map),
        )
        .unwrap()
    }

    #[test]
    fn notdef_goes_first() {
        let glyph_map: BTreeMap<_, _> = [("B".into(), vec![]), ("A".into(), vec![0x41])]
            .into_iter()
            .collect();
        assert_eq!(names(&[".notdef", "A", "B"]), glyph_order(&[], &glyph_map));
        assert_eq!(
            names(&[".notdef", "B"]),
            glyph_order(&names(&["B"]), &glyph_map)
        );
        assert_eq!(
            names(&["B", ".notdef"]),
            glyph_order(&names(&["B", ".notdef"]), &glyph_map)
        );
    }

    #[test]
    fn otf_destination_wants_cff2() {
        assert!(VarcOptions::for_destination(Path::new("a.OTF"), true, false).build_cff2);
        assert!(!VarcOptions::for_destination(Path::new("a.ttf"), true, false).build_cff2);
    }

    #[test]
    fn cubics_stay_compatible() {
        let curve = |height: f64| {
            let mut path = BezPath::new();
            path.move_to((0.0, 0.0));
            path.curve_to((0.0, height / 2.0), (100.0, height), (200.0, height));
            path.line_to((200.0, 0.0));
            path.close_path();
            path
        };
        let quadratics = to_quadratics(&"x".into(), &[curve(200.0), curve(600.0)]).unwrap();
        for quadratic in quadratics.iter() {
            assert!(quadratic
                .elements()
                .iter()
                .all(|el| !matches!(el, PathEl::CurveTo(..))));
            assert_eq!(Some(&PathEl::ClosePath), quadratic.elements().last());
        }
        assert_eq!(
            quadratics[0].elements().len(),
            quadratics[1].elements().len()
        );
        assert!(SimpleGlyph::interpolatable_glyphs_from_bezpaths(&quadratics).is_ok());
    }

    #[test]
    fn builds_a_loadable_font() {
        let (bytes, failures) = build_font(&font(), &VarcOptions::default()).unwrap();
        assert!(failures.is_empty(), "{failures}");

        let font = FontRef::new(&bytes).unwrap();
        for tag in [
            b"head", b"hhea", b"maxp", b"hmtx", b"cmap", b"post", b"glyf", b"loca", b"name",
            b"OS/2", b"VARC",
        ] {
            assert!(font.table_data(Tag::new(tag)).is_some(), "{tag:?}");
        }
        // static sources, nothing varies
        for tag in [b"fvar", b"gvar", b"HVAR"] {
            assert!(font.table_data(Tag::new(tag)).is_none(), "{tag:?}");
        }
        // .notdef, A, Agrave, space
        assert_eq!(4, font.maxp().unwrap().num_glyphs());
        let cmap = font.cmap().unwrap();
        assert_eq!(Some(GlyphId::new(1)), cmap.map_codepoint(0x41u32));
        assert_eq!(Some(GlyphId::new(2)), cmap.map_codepoint(0xC0u32));
        assert_eq!(1000, font.head().unwrap().units_per_em());
        assert_eq!(400, font.os2().unwrap().us_weight_class());
    }

    #[test]
    fn components_become_variable_components() {
        let (bytes, _) = build_font(&font(), &VarcOptions::default()).unwrap();
        let font = FontRef::new(&bytes).unwrap();

        // Agrave keeps no outline of its own
        let glyf = font.glyf().unwrap();
        let loca = font.loca(None).unwrap();
        assert!(loca.get_glyf(GlyphId::new(2), &glyf).unwrap().is_none());

        let varc = Varc::read(font.table_data(VARC).unwrap()).unwrap();
        let coverage = varc.coverage().unwrap();
        assert_eq!(Some(0), coverage.get(GlyphId::new(2)));
        assert_eq!(None, coverage.get(GlyphId::new(1)));
        assert_eq!(1, varc.glyph(0).unwrap().components().count());
        assert!(varc.multi_var_store().is_none());
    }

    #[test]
    fn contours_and_components_list_the_glyph_itself() {
        let mut source = font();
        let mut component = Component::new("A");
        component.transformation.translate_y = 700.0;
        source.add_glyph(
            vec![0x42],
            glyph(
                "B",
                StaticGlyph {
                    x_advance: 600.0,
                    path: square(0.0, 100.0),
                    components: vec![component],
                },
            ),
        );
        let (bytes, _) = build_font(&source, &VarcOptions::default()).unwrap();
        let font = FontRef::new(&bytes).unwrap();
        let varc = Varc::read(font.table_data(VARC).unwrap()).unwrap();
        // Agrave, then B
        assert_eq!(Some(1), varc.coverage().unwrap().get(GlyphId::new(3)));
        assert_eq!(2, varc.glyph(1).unwrap().components().count());
    }

    #[test]
    fn missing_base_gets_a_placeholder() {
        let mut source = font();
        source.add_glyph(
            vec![0x42],
            glyph(
                "B",
                StaticGlyph {
                    x_advance: 600.0,
                    path: Default::default(),
                    components: vec![Component::new("nosuchglyph")],
                },
            ),
        );
        let glyph_map = source.glyph_map().unwrap();
        let mut builder = builder(&source);
        let (glyphs, failures) = builder.prepare_glyphs(&glyph_map).unwrap();

        assert_eq!(names(&[".notdef", "A", "Agrave", "B", "space"]), builder.order);
        assert_eq!(builder.order.len(), glyphs.len());
        let failed: Vec<_> = failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(vec!["B"], failed);
        assert_eq!(PLACEHOLDER_ADVANCE, glyphs[3].advance);
        assert!(glyphs[3].components.is_empty());
    }

    #[test]
    fn requested_glyphs_pull_in_their_bases() {
        let source = font();
        let options = VarcOptions {
            glyph_names: names(&["Agrave"]),
            ..Default::default()
        };
        let (bytes, failures) = build_font(&source, &options).unwrap();
        assert!(failures.is_empty(), "{failures}");
        let font = FontRef::new(&bytes).unwrap();
        // .notdef, Agrave, A
        assert_eq!(3, font.maxp().unwrap().num_glyphs());
        let cmap = font.cmap().unwrap();
        assert_eq!(Some(GlyphId::new(1)), cmap.map_codepoint(0xC0u32));
        assert_eq!(Some(GlyphId::new(2)), cmap.map_codepoint(0x41u32));
        assert_eq!(None, cmap.map_codepoint(0x20u32));
    }

    #[test]
    fn component_cycle_is_an_error() {
        let mut source = InMemoryFont::new(1000);
        for (name, base) in [("a", "b"), ("b", "a")] {
            source.add_glyph(
                Vec::new(),
                glyph(
                    name,
                    StaticGlyph {
                        components: vec![Component::new(base)],
                        ..Default::default()
                    },
                ),
            );
        }
        let mut builder = builder(&source);
        assert!(matches!(
            builder.base_info(&"a".into(), &mut Vec::new()),
            Err(Error::ComponentCycle(..))
        ));

        let (_, failures) = build_font(&source, &VarcOptions::default()).unwrap();
        let failed: Vec<_> = failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(vec!["a", "b"], failed);
    }

    #[test]
    fn local_axes_become_hidden_fvar_axes() {
        let source = font_with_local_axis();
        let mut builder = builder(&source);
        let user = builder.prepare_glyph(&"user".into()).unwrap();
        let component = &user.components[0];
        assert_eq!(RESET_UNSPECIFIED_AXES | HAVE_AXES, component.flags);
        assert_eq!(
            vec![("bend".to_string(), vec![0.5])],
            component.location.clone().into_iter().collect::<Vec<_>>()
        );
        assert_eq!(
            BTreeSet::from([Tag::new(b"V000")]),
            user.local_axis_tags
        );

        let (bytes, failures) = build_font(&source, &VarcOptions::default()).unwrap();
        assert!(failures.is_empty(), "{failures}");
        let font = FontRef::new(&bytes).unwrap();
        let fvar = font.fvar().unwrap();
        let axes = fvar.axes().unwrap();
        assert_eq!(1, axes.len());
        assert_eq!(Tag::new(b"V000"), axes[0].axis_tag());
        assert_eq!(1, axes[0].flags() & 1);
        assert!(font.table_data(Tag::new(b"gvar")).is_some());
    }

    #[test]
    fn varying_component_transform() {
        let source = mutator_sans();
        let mut builder = builder(&source);
        let b = builder.prepare_glyph(&"B".into()).unwrap();
        assert_eq!(1, b.components.len());
        assert_eq!(
            HAVE_TRANSLATE_X | TRANSFORM_HAS_VARIATION,
            b.components[0].flags
        );
        assert_eq!(vec![20.0, 30.0, 40.0], b.components[0].transform[0]);
    }

    #[test]
    fn variable_font_from_masters() {
        let (bytes, failures) = build_font(&mutator_sans(), &VarcOptions::default()).unwrap();
        assert!(failures.is_empty(), "{failures}");
        let font = FontRef::new(&bytes).unwrap();
        for tag in [b"fvar", b"avar", b"gvar", b"HVAR", b"VARC"] {
            assert!(font.table_data(Tag::new(tag)).is_some(), "{tag:?}");
        }
        // .notdef, A, B, space
        assert_eq!(4, font.maxp().unwrap().num_glyphs());

        let gvar = ReadGvar::read(font.table_data(gvar::GVAR).unwrap()).unwrap();
        let data = gvar.glyph_variation_data(GlyphId::new(1)).unwrap().unwrap();
        let tuple = data.tuples().next().unwrap();
        let x_deltas: Vec<_> = tuple.deltas().map(|d| d.x_delta).collect();
        assert_eq!(vec![-10, -10, 350, 350, 0, 340, 0, 0], x_deltas);

        let hvar = ReadHvar::read(font.table_data(Tag::new(b"HVAR")).unwrap()).unwrap();
        let delta = |gid: u32, coord: f32| {
            hvar.advance_width_delta(GlyphId::new(gid), &[F2Dot14::from_f32(coord)])
                .unwrap()
                .to_i32()
        };
        // A: 400 to 740; B: 440, 600 at the intermediate, 780
        assert_eq!(340, delta(1, 1.0));
        assert_eq!(160, delta(2, 0.5));
        assert_eq!(340, delta(2, 1.0));
        assert_eq!(0, delta(3, 1.0));

        let varc = Varc::read(font.table_data(VARC).unwrap()).unwrap();
        assert_eq!(Some(0), varc.coverage().unwrap().get(GlyphId::new(2)));
        assert!(varc.multi_var_store().is_some());
    }

    #[test]
    fn extended_gvar_replaces_gvar() {
        let options = VarcOptions {
            use_extended_gvar: true,
            ..Default::default()
        };
        let (bytes, _) = build_font(&mutator_sans(), &options).unwrap();
        let font = FontRef::new(&bytes).unwrap();
        assert!(font.table_data(gvar::GVAR).is_none());
        assert!(font.table_data(gvar::EXTENDED_GVAR).is_some());
    }

    #[test]
    fn cff2_font() {
        let options = VarcOptions {
            build_cff2: true,
            ..Default::default()
        };
        let (bytes, failures) = build_font(&mutator_sans(), &options).unwrap();
        assert!(failures.is_empty(), "{failures}");
        assert_eq!(b"OTTO", &bytes[0..4]);
        assert_eq!(
            0xB1B0_AFBA,
            write_fonts::read::tables::compute_checksum(&bytes)
        );

        let font = FontRef::new(&bytes).unwrap();
        for tag in [b"glyf", b"loca", b"gvar"] {
            assert!(font.table_data(Tag::new(tag)).is_none(), "{tag:?}");
        }
        for tag in [b"CFF2", b"fvar", b"HVAR", b"VARC"] {
            assert!(font.table_data(Tag::new(tag)).is_some(), "{tag:?}");
        }
        assert_eq!(4, font.maxp().unwrap().num_glyphs());
        assert_eq!(None, font.maxp().unwrap().max_points());
        // A's tight bounds at the default master
        assert_eq!(40, font.hmtx().unwrap().side_bearing(GlyphId::new(1)).unwrap());
    }

    #[test]
    fn subroutinize_shares_repeated_contours() {
        let mut source = InMemoryFont::new(1000);
        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            source.add_glyph(
                vec![0x61 + i as u32],
                glyph(
                    name,
                    StaticGlyph {
                        x_advance: 600.0,
                        path: square(10.0 * i as f64, 500.0),
                        components: Vec::new(),
                    },
                ),
            );
        }
        let global_subrs = |subroutinize: bool| {
            let options = VarcOptions {
                build_cff2: true,
                subroutinize,
                ..Default::default()
            };
            let (bytes, _) = build_font(&source, &options).unwrap();
            let font = FontRef::new(&bytes).unwrap();
            let cff2 = Cff2::read(font.table_data(Tag::new(b"CFF2")).unwrap()).unwrap();
            cff2.global_subrs().count()
        };
        assert_eq!(0, global_subrs(false));
        assert_eq!(1, global_subrs(true));
    }

    #[test]
    fn cff_marking_keeps_the_checksum_valid() {
        let (mut bytes, _) = build_font(&font(), &VarcOptions::default()).unwrap();
        mark_as_cff(&mut bytes).unwrap();
        assert_eq!(b"OTTO", &bytes[0..4]);
        assert_eq!(
            0xB1B0_AFBA,
            write_fonts::read::tables::compute_checksum(&bytes)
        );
        assert!(mark_as_cff(&mut [0u8; 12]).is_err());
    }
}
