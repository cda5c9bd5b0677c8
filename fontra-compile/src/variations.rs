//! Normalized locations and the model that turns master values into deltas.
//!
//! The model follows `VariationModel` in
//! <https://github.com/fonttools/fonttools/blob/main/Lib/fontTools/varLib/models.py>
//! closely enough that the deltas and supports it produces match fontTools for
//! the same input.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
};

use indexmap::IndexMap;
use log::{log_enabled, trace};
use ordered_float::OrderedFloat;
use write_fonts::{
    tables::variations::{RegionAxisCoordinates, VariationRegion},
    types::{F2Dot14, Tag},
};

use crate::error::Error;

/// Positions in -1..1 keyed by axis tag
pub type NormalizedLocation = BTreeMap<Tag, f64>;

/// Round half up, as `fontTools.misc.roundTools.otRound`
pub fn ot_round(value: f64) -> f64 {
    (value + 0.5).floor()
}

pub fn no_round(value: f64) -> f64 {
    value
}

/// Min, default and max of an axis, all in the same space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisTriple {
    pub min: f64,
    pub default: f64,
    pub max: f64,
}

impl AxisTriple {
    pub fn new(min: f64, default: f64, max: f64) -> AxisTriple {
        AxisTriple { min, default, max }
    }

    /// Widen the shorter side so default sits in the middle.
    ///
    /// Component axis values may interpolate across the default. With a lopsided
    /// axis, the midpoint of two normalized values would not be the normalized
    /// midpoint of the raw values.
    pub fn symmetric(self) -> AxisTriple {
        let AxisTriple { min, default, max } = self;
        if !(min < default && default < max) {
            return self;
        }
        let below = default - min;
        let above = max - default;
        match below.partial_cmp(&above) {
            Some(Ordering::Greater) => AxisTriple::new(min, default, default + below),
            Some(Ordering::Less) => AxisTriple::new(default - above, default, max),
            _ => self,
        }
    }

    /// Clamp to the axis and map min, default, max to -1, 0, 1.
    pub fn normalize(&self, value: f64) -> f64 {
        let AxisTriple { min, default, max } = *self;
        let value = value.min(max).max(min);
        if value == default || min == max {
            return 0.0;
        }
        if (value < default && min != default) || (value > default && max == default) {
            (value - default) / (default - min)
        } else {
            (value - default) / (max - default)
        }
    }
}

/// Normalize every axis of `axes`; axes missing from `location` sit at their default.
pub fn normalize_location<'a>(
    location: impl IntoIterator<Item = (&'a String, f64)>,
    axes: &IndexMap<String, AxisTriple>,
) -> IndexMap<String, f64> {
    let location: HashMap<_, _> = location.into_iter().collect();
    axes.iter()
        .map(|(name, triple)| {
            let value = location.get(name).copied().unwrap_or(triple.default);
            (name.clone(), triple.normalize(value))
        })
        .collect()
}

/// Where a master has influence along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tent {
    pub lower: f64,
    pub peak: f64,
    pub upper: f64,
}

impl Tent {
    pub fn new(lower: f64, peak: f64, upper: f64) -> Tent {
        Tent { lower, peak, upper }
    }
}

/// A support: one tent per axis the master is off default on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Region(BTreeMap<Tag, Tent>);

impl Region {
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, tag: Tag) -> Option<&Tent> {
        self.0.get(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Tent)> {
        self.0.iter()
    }

    fn axes(&self) -> impl Iterator<Item = &Tag> {
        self.0.keys()
    }

    /// How much a master at this region contributes at `location`.
    ///
    /// `supportScalar` with `ot=True`.
    pub fn scalar_at(&self, location: &NormalizedLocation) -> f64 {
        let mut scalar = 1.0;
        for (tag, tent) in self.0.iter() {
            let Tent { lower, peak, upper } = *tent;
            if peak == 0.0 || lower > peak || peak > upper || (lower < 0.0 && upper > 0.0) {
                continue;
            }
            let v = location.get(tag).copied().unwrap_or_default();
            if v == peak {
                continue;
            }
            if v <= lower || upper <= v {
                return 0.0;
            }
            if v < peak {
                scalar *= (v - lower) / (peak - lower);
            } else {
                scalar *= (v - upper) / (peak - upper);
            }
        }
        scalar
    }

    /// Key for grouping data that shares a set of supports
    pub fn key(&self) -> Vec<(Tag, [OrderedFloat<f64>; 3])> {
        self.0
            .iter()
            .map(|(tag, t)| (*tag, [t.lower.into(), t.peak.into(), t.upper.into()]))
            .collect()
    }

    /// One set of coordinates per fvar axis, zero for axes the region doesn't mention.
    pub fn to_write_fonts_variation_region(&self, axis_tags: &[Tag]) -> VariationRegion {
        VariationRegion::new(
            axis_tags
                .iter()
                .map(|tag| {
                    let tent = self.get(*tag).copied().unwrap_or(Tent::new(0.0, 0.0, 0.0));
                    RegionAxisCoordinates::new(
                        F2Dot14::from_f32(tent.lower as f32),
                        F2Dot14::from_f32(tent.peak as f32),
                        F2Dot14::from_f32(tent.upper as f32),
                    )
                })
                .collect(),
        )
    }
}

impl FromIterator<(Tag, Tent)> for Region {
    fn from_iter<T: IntoIterator<Item = (Tag, Tent)>>(iter: T) -> Self {
        Region(iter.into_iter().collect())
    }
}

/// Subdivides variation space between a set of masters.
///
/// Masters are sorted so that each one is only influenced by those before it;
/// deltas and supports come back in that order, default first.
#[derive(Debug, Clone, PartialEq)]
pub struct VariationModel {
    locations: Vec<NormalizedLocation>,
    /// `reverse_mapping[i]` is the caller's index of the i-th sorted master
    reverse_mapping: Vec<usize>,
    supports: Vec<Region>,
    delta_weights: Vec<Vec<(usize, f64)>>,
}

impl VariationModel {
    /// Axes listed in `axis_order` sort first, in that order; the rest by tag.
    pub fn new(
        locations: &[NormalizedLocation],
        axis_order: &[Tag],
    ) -> Result<VariationModel, Error> {
        let stripped: Vec<NormalizedLocation> = locations
            .iter()
            .map(|loc| {
                loc.iter()
                    .filter(|(_, v)| **v != 0.0)
                    .map(|(k, v)| (*k, *v))
                    .collect()
            })
            .collect();
        for (i, loc) in stripped.iter().enumerate() {
            if stripped[..i].contains(loc) {
                return Err(Error::VariationModel(format!(
                    "locations must be unique, {loc:?} repeats"
                )));
            }
        }
        if !stripped.iter().any(|loc| loc.is_empty()) {
            return Err(Error::VariationModel("base master not found".to_string()));
        }

        let sort_key = LocationSortKey::builder(&stripped, axis_order);
        let mut order: Vec<usize> = (0..stripped.len()).collect();
        order.sort_by_cached_key(|idx| sort_key.key_for(&stripped[*idx]));

        let locations: Vec<_> = order.iter().map(|idx| stripped[*idx].clone()).collect();
        let supports = master_supports(&locations);
        let delta_weights = delta_weights(&locations, &supports);

        if log_enabled!(log::Level::Trace) {
            for (loc, support) in locations.iter().zip(supports.iter()) {
                trace!("  {loc:?} {support:?}");
            }
        }

        Ok(VariationModel {
            locations,
            reverse_mapping: order,
            supports,
            delta_weights,
        })
    }

    /// The caller's index of the default master
    pub fn default_index(&self) -> usize {
        self.reverse_mapping[0]
    }

    /// The caller's index of each master, in model order
    pub fn reverse_mapping(&self) -> &[usize] {
        &self.reverse_mapping
    }

    /// Supports in model order; the first is the default and empty.
    pub fn supports(&self) -> &[Region] {
        &self.supports
    }

    pub fn locations(&self) -> &[NormalizedLocation] {
        &self.locations
    }

    /// Turn one vector of values per master, in the caller's order, into one
    /// delta vector per support, in model order.
    ///
    /// `round` is applied to every delta before later deltas are derived from it.
    pub fn deltas(
        &self,
        master_values: &[Vec<f64>],
        round: fn(f64) -> f64,
    ) -> Result<Vec<Vec<f64>>, Error> {
        if master_values.len() != self.delta_weights.len() {
            return Err(Error::VariationModel(format!(
                "{} master values for {} masters",
                master_values.len(),
                self.delta_weights.len()
            )));
        }
        let len = master_values[self.default_index()].len();
        if master_values.iter().any(|v| v.len() != len) {
            return Err(Error::VariationModel(
                "every master needs the same number of values".to_string(),
            ));
        }

        let mut out: Vec<Vec<f64>> = Vec::with_capacity(master_values.len());
        for (i, weights) in self.delta_weights.iter().enumerate() {
            let mut delta = master_values[self.reverse_mapping[i]].clone();
            for (j, weight) in weights.iter() {
                for (value, prior) in delta.iter_mut().zip(out[*j].iter()) {
                    *value -= prior * weight;
                }
            }
            out.push(delta.into_iter().map(round).collect());
        }
        Ok(out)
    }
}

/// Orders masters by how many axes they are off default on, then by how many
/// of their positions coincide with an on-axis master, then by axis order.
///
/// `getMasterLocationsSortKeyFunc` in fontTools.
struct LocationSortKey<'a> {
    axis_order: &'a [Tag],
    axis_points: HashMap<Tag, HashSet<OrderedFloat<f64>>>,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    rank: usize,
    on_point_axes: i64,
    known_axes: Vec<usize>,
    ordered_axes: Vec<Tag>,
    signs: Vec<i8>,
    magnitudes: Vec<OrderedFloat<f64>>,
}

impl<'a> LocationSortKey<'a> {
    fn builder(locations: &[NormalizedLocation], axis_order: &'a [Tag]) -> LocationSortKey<'a> {
        let mut axis_points: HashMap<Tag, HashSet<OrderedFloat<f64>>> = HashMap::new();
        for loc in locations.iter().filter(|loc| loc.len() == 1) {
            for (tag, value) in loc.iter() {
                axis_points
                    .entry(*tag)
                    .or_insert_with(|| HashSet::from([OrderedFloat(0.0)]))
                    .insert(OrderedFloat(*value));
            }
        }
        LocationSortKey {
            axis_order,
            axis_points,
        }
    }

    fn key_for(&self, location: &NormalizedLocation) -> SortKey {
        let on_point_axes = location
            .iter()
            .filter(|(tag, value)| {
                self.axis_points
                    .get(*tag)
                    .is_some_and(|points| points.contains(&OrderedFloat(**value)))
            })
            .count();
        let mut ordered_axes: Vec<Tag> = self
            .axis_order
            .iter()
            .filter(|tag| location.contains_key(*tag))
            .copied()
            .collect();
        // BTreeMap keys are already sorted
        ordered_axes.extend(
            location
                .keys()
                .filter(|tag| !self.axis_order.contains(tag))
                .copied(),
        );
        let known_axes = ordered_axes
            .iter()
            .map(|tag| {
                self.axis_order
                    .iter()
                    .position(|t| t == tag)
                    .unwrap_or(0x10000)
            })
            .collect();
        let signs = ordered_axes
            .iter()
            .map(|tag| match location[tag].partial_cmp(&0.0) {
                Some(Ordering::Greater) => 1,
                Some(Ordering::Less) => -1,
                _ => 0,
            })
            .collect();
        let magnitudes = ordered_axes
            .iter()
            .map(|tag| OrderedFloat(location[tag].abs()))
            .collect();
        SortKey {
            rank: location.len(),
            on_point_axes: -(on_point_axes as i64),
            known_axes,
            ordered_axes,
            signs,
            magnitudes,
        }
    }
}

/// Each location's region spans from zero to the furthest master in its direction.
///
/// `VariationModel._locationsToRegions` in fontTools.
fn regions_for(locations: &[NormalizedLocation]) -> Vec<Region> {
    let mut extremes: HashMap<Tag, (f64, f64)> = HashMap::new();
    for loc in locations.iter() {
        for (tag, value) in loc.iter() {
            let (min, max) = extremes.entry(*tag).or_insert((*value, *value));
            *min = min.min(*value);
            *max = max.max(*value);
        }
    }
    locations
        .iter()
        .map(|loc| {
            loc.iter()
                .map(|(tag, value)| {
                    let (min, max) = extremes[tag];
                    let tent = if *value > 0.0 {
                        Tent::new(0.0, *value, max)
                    } else {
                        Tent::new(min, *value, 0.0)
                    };
                    (*tag, tent)
                })
                .collect()
        })
        .collect()
}

/// Shrink each region so it stops at earlier masters it overlaps.
///
/// The box is split along the axes with the largest range ratio; ties split
/// along all of them. `VariationModel._computeMasterSupports` in fontTools.
fn master_supports(locations: &[NormalizedLocation]) -> Vec<Region> {
    let regions = regions_for(locations);
    let mut supports = Vec::with_capacity(regions.len());
    for (i, region) in regions.iter().enumerate() {
        let mut region = region.clone();
        let axes: HashSet<Tag> = region.axes().copied().collect();
        for prev in regions[..i].iter() {
            if prev.axes().copied().collect::<HashSet<_>>() != axes {
                continue;
            }
            let relevant = region.iter().all(|(tag, tent)| {
                let prev_peak = prev.0[tag].peak;
                prev_peak == tent.peak || (tent.lower < prev_peak && prev_peak < tent.upper)
            });
            if !relevant {
                continue;
            }

            let mut best_axes: BTreeMap<Tag, Tent> = BTreeMap::new();
            let mut best_ratio = -1.0;
            for (tag, prev_tent) in prev.iter() {
                let val = prev_tent.peak;
                let Tent { lower, peak, upper } = region.0[tag];
                let (new_tent, ratio) = if val < peak {
                    (Tent::new(val, peak, upper), (val - peak) / (lower - peak))
                } else if peak < val {
                    (Tent::new(lower, peak, val), (val - peak) / (upper - peak))
                } else {
                    continue;
                };
                if ratio > best_ratio {
                    best_axes.clear();
                    best_ratio = ratio;
                }
                if ratio == best_ratio {
                    best_axes.insert(*tag, new_tent);
                }
            }
            for (tag, tent) in best_axes {
                region.0.insert(tag, tent);
            }
        }
        supports.push(region);
    }
    supports
}

/// For each master, the earlier supports that contribute at its location.
fn delta_weights(locations: &[NormalizedLocation], supports: &[Region]) -> Vec<Vec<(usize, f64)>> {
    locations
        .iter()
        .enumerate()
        .map(|(i, loc)| {
            supports[..i]
                .iter()
                .enumerate()
                .filter_map(|(j, support)| {
                    let scalar = support.scalar_at(loc);
                    (scalar != 0.0).then_some((j, scalar))
                })
                .collect()
        })
        .collect()
}
