//! Generates [fvar](https://learn.microsoft.com/en-us/typography/opentype/spec/fvar)
//! and [avar](https://learn.microsoft.com/en-us/typography/opentype/spec/avar) tables.

use fontra_source::{axis::Axis, coords::UserCoord};
use log::trace;
use ordered_float::OrderedFloat;
use write_fonts::{
    tables::{
        avar::{Avar, AxisValueMap, SegmentMaps},
        fvar::{AxisInstanceArrays, Fvar, VariationAxisRecord},
    },
    types::{F2Dot14, Fixed, NameId, Tag},
};

use crate::variations::AxisTriple;

const HIDDEN_AXIS: u16 = 0x0001;

/// Name ids below this are reserved
pub const FIRST_AXIS_NAME_ID: u16 = 256;

/// An axis as it lands in fvar.
#[derive(Debug, Clone, PartialEq)]
pub struct FvarAxis {
    pub tag: Tag,
    pub name: String,
    pub user: AxisTriple,
    pub design: AxisTriple,
    /// (user, design) pairs, empty when the two spaces coincide
    pub mapping: Vec<[f64; 2]>,
    pub hidden: bool,
}

impl FvarAxis {
    pub fn global(axis: &Axis) -> FvarAxis {
        let design = |value: UserCoord| axis.map_forward(value).to_f64();
        FvarAxis {
            tag: axis.tag,
            name: axis.name.clone(),
            user: AxisTriple::new(axis.min.to_f64(), axis.default.to_f64(), axis.max.to_f64()),
            design: AxisTriple::new(design(axis.min), design(axis.default), design(axis.max)),
            mapping: axis.mapping.clone(),
            hidden: axis.hidden,
        }
    }

    /// A glyph-local axis, already normalized, hidden from users.
    pub fn local(tag: Tag) -> FvarAxis {
        let triple = AxisTriple::new(-1.0, 0.0, 1.0);
        FvarAxis {
            tag,
            name: tag.to_string(),
            user: triple,
            design: triple,
            mapping: Vec::new(),
            hidden: true,
        }
    }

    fn segment_map(&self) -> SegmentMaps {
        let mut mappings: Vec<(OrderedFloat<f64>, OrderedFloat<f64>)> = self
            .mapping
            .iter()
            .map(|[user, design]| {
                (
                    self.user.normalize(*user).into(),
                    self.design.normalize(*design).into(),
                )
            })
            .chain([-1.0, 0.0, 1.0].map(|v| (v.into(), v.into())))
            .collect();
        mappings.sort();
        mappings.dedup_by_key(|(from, _)| *from);
        SegmentMaps::new(
            mappings
                .into_iter()
                .map(|(from, to)| {
                    AxisValueMap::new(F2Dot14::from_f32(*from as f32), F2Dot14::from_f32(*to as f32))
                })
                .collect(),
        )
    }
}

/// Axis `i` is named by name id `FIRST_AXIS_NAME_ID + i`.
pub fn build_fvar(axes: &[FvarAxis]) -> Option<Fvar> {
    if axes.is_empty() {
        trace!("Skip fvar; this is not a variable font");
        return None;
    }
    let records = axes
        .iter()
        .enumerate()
        .map(|(i, axis)| {
            let mut record = VariationAxisRecord {
                axis_tag: axis.tag,
                min_value: Fixed::from_f64(axis.user.min),
                default_value: Fixed::from_f64(axis.user.default),
                max_value: Fixed::from_f64(axis.user.max),
                axis_name_id: NameId::new(FIRST_AXIS_NAME_ID + i as u16),
                ..Default::default()
            };
            if axis.hidden {
                record.flags |= HIDDEN_AXIS;
            }
            record
        })
        .collect();
    Some(Fvar::new(AxisInstanceArrays::new(records, Vec::new())))
}

/// Only built when some axis maps user to design coordinates.
pub fn build_avar(axes: &[FvarAxis]) -> Option<Avar> {
    if axes.iter().all(|axis| axis.mapping.is_empty()) {
        trace!("Skip avar; no axis has a mapping");
        return None;
    }
    Some(Avar::new(axes.iter().map(FvarAxis::segment_map).collect()))
}
