//! Serializes a [VARC](https://github.com/harfbuzz/boring-expansion-spec/blob/main/VARC.md)
//! table and the multi-value variation store it carries.

use std::collections::HashMap;

use fontra_source::glyph::DecomposedTransform;
use indexmap::IndexMap;
use log::trace;
use ordered_float::OrderedFloat;
use write_fonts::{
    dump_table,
    tables::layout::CoverageTable,
    types::{F2Dot14, GlyphId16, Tag},
};

use crate::{
    cff2::write_index2,
    error::Error,
    variations::{ot_round, Region, VariationModel},
};

pub const VARC: Tag = Tag::new(b"VARC");

/// A var index that means "does not vary"
pub const NO_VARIATION_INDEX: u32 = 0xFFFF_FFFF;

const HEADER_SIZE: usize = 24;

// Component flags
pub const RESET_UNSPECIFIED_AXES: u32 = 1 << 0;
pub const HAVE_AXES: u32 = 1 << 1;
pub const AXIS_VALUES_HAVE_VARIATION: u32 = 1 << 2;
pub const TRANSFORM_HAS_VARIATION: u32 = 1 << 3;
pub const HAVE_TRANSLATE_X: u32 = 1 << 4;
pub const HAVE_TRANSLATE_Y: u32 = 1 << 5;
pub const HAVE_ROTATION: u32 = 1 << 6;
pub const HAVE_SCALE_X: u32 = 1 << 8;
pub const HAVE_SCALE_Y: u32 = 1 << 9;
pub const HAVE_TCENTER_X: u32 = 1 << 10;
pub const HAVE_TCENTER_Y: u32 = 1 << 11;
pub const GID_IS_24BIT: u32 = 1 << 12;
pub const HAVE_SKEW_X: u32 = 1 << 13;
pub const HAVE_SKEW_Y: u32 = 1 << 14;

/// One transform field: the flag that says it's present and how it's stored.
#[derive(Debug, Clone, Copy)]
pub struct TransformField {
    pub flag: u32,
    /// Stored value is `round(value / scale * 2^frac_bits)`
    scale: f64,
    frac_bits: i32,
    pub default: f64,
    get: fn(&DecomposedTransform) -> f64,
}

impl TransformField {
    pub fn value(&self, transform: &DecomposedTransform) -> f64 {
        (self.get)(transform)
    }

    /// The fixed point bits stored for `value`
    pub fn to_stored(&self, value: f64) -> f64 {
        ot_round(value / self.scale * 2f64.powi(self.frac_bits))
    }
}

/// In the order they are written
pub const TRANSFORM_FIELDS: [TransformField; 9] = [
    TransformField {
        flag: HAVE_TRANSLATE_X,
        scale: 1.0,
        frac_bits: 0,
        default: 0.0,
        get: |t| t.translate_x,
    },
    TransformField {
        flag: HAVE_TRANSLATE_Y,
        scale: 1.0,
        frac_bits: 0,
        default: 0.0,
        get: |t| t.translate_y,
    },
    TransformField {
        flag: HAVE_ROTATION,
        scale: 180.0,
        frac_bits: 12,
        default: 0.0,
        get: |t| t.rotation,
    },
    TransformField {
        flag: HAVE_SCALE_X,
        scale: 1.0,
        frac_bits: 10,
        default: 1.0,
        get: |t| t.scale_x,
    },
    TransformField {
        flag: HAVE_SCALE_Y,
        scale: 1.0,
        frac_bits: 10,
        default: 1.0,
        get: |t| t.scale_y,
    },
    TransformField {
        flag: HAVE_SKEW_X,
        scale: -180.0,
        frac_bits: 12,
        default: 0.0,
        get: |t| t.skew_x,
    },
    TransformField {
        flag: HAVE_SKEW_Y,
        scale: 180.0,
        frac_bits: 12,
        default: 0.0,
        get: |t| t.skew_y,
    },
    TransformField {
        flag: HAVE_TCENTER_X,
        scale: 1.0,
        frac_bits: 0,
        default: 0.0,
        get: |t| t.t_center_x,
    },
    TransformField {
        flag: HAVE_TCENTER_Y,
        scale: 1.0,
        frac_bits: 0,
        default: 0.0,
        get: |t| t.t_center_y,
    },
];

/// A normalized axis value as F2Dot14 bits
pub fn axis_value_bits(value: f64) -> f64 {
    F2Dot14::from_f32(value as f32).to_bits() as f64
}

/// Variable length unsigned int, one to five bytes.
pub fn write_uint32var(out: &mut Vec<u8>, value: u32) {
    match value {
        0..=0x7F => out.push(value as u8),
        0x80..=0x3FFF => out.extend([0x80 | (value >> 8) as u8, value as u8]),
        0x4000..=0x1F_FFFF => out.extend([
            0xC0 | (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ]),
        0x20_0000..=0x0FFF_FFFF => out.extend([
            0xE0 | (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ]),
        _ => {
            out.push(0xF0);
            out.extend(value.to_be_bytes());
        }
    }
}

const ZEROS: u8 = 0x80;
const WORDS: u8 = 0x40;
const LONGS: u8 = ZEROS | WORDS;
const MAX_RUN: usize = 64;

fn value_size(value: i32) -> u8 {
    match value {
        0 => 0,
        -128..=127 => 1,
        -32768..=32767 => 2,
        _ => 4,
    }
}

/// Packed as runs of zeros, bytes, words or longs.
pub fn write_tuple_values(out: &mut Vec<u8>, values: &[i32]) {
    let mut i = 0;
    while i < values.len() {
        let size = value_size(values[i]);
        let mut end = i + 1;
        while end < values.len() && end - i < MAX_RUN {
            let next = value_size(values[end]);
            // a lone zero between bytes is cheaper left in the byte run
            let fits = match size {
                0 => next == 0,
                1 => next == 1 || (next == 0 && values.get(end + 1).is_some_and(|v| value_size(*v) == 1)),
                2 => next == 2 || (next == 1 && values.get(end + 1).is_some_and(|v| value_size(*v) >= 2)),
                _ => next == 4,
            };
            if !fits {
                break;
            }
            end += 1;
        }
        let run = &values[i..end];
        let count = (run.len() - 1) as u8;
        match size {
            0 => out.push(ZEROS | count),
            1 => {
                out.push(count);
                out.extend(run.iter().map(|v| *v as i8 as u8));
            }
            2 => {
                out.push(WORDS | count);
                run.iter()
                    .for_each(|v| out.extend((*v as i16).to_be_bytes()));
            }
            _ => {
                out.push(LONGS | count);
                run.iter().for_each(|v| out.extend(v.to_be_bytes()));
            }
        }
        i = end;
    }
}

type SupportsKey = Vec<Vec<(Tag, [OrderedFloat<f64>; 3])>>;

#[derive(Debug, Default)]
struct MultiVarData {
    region_indexes: Vec<u16>,
    /// Region-major deltas, one item per stored vector
    items: Vec<Vec<i32>>,
}

/// Collects delta vectors, one data per set of supports.
#[derive(Debug)]
pub struct MultiVarStoreBuilder {
    axis_tags: Vec<Tag>,
    regions: IndexMap<Vec<(Tag, [OrderedFloat<f64>; 3])>, Region>,
    data: Vec<MultiVarData>,
    current_data: HashMap<SupportsKey, usize>,
    cache: HashMap<(usize, Vec<i32>), u32>,
}

impl MultiVarStoreBuilder {
    pub fn new(axis_tags: Vec<Tag>) -> MultiVarStoreBuilder {
        MultiVarStoreBuilder {
            axis_tags,
            regions: Default::default(),
            data: Default::default(),
            current_data: Default::default(),
            cache: Default::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Store one vector per master, returning the var index of its deltas.
    ///
    /// Values that don't vary get [`NO_VARIATION_INDEX`].
    pub fn store_masters(
        &mut self,
        model: &VariationModel,
        master_values: &[Vec<f64>],
    ) -> Result<u32, Error> {
        let deltas = model.deltas(master_values, ot_round)?;
        let deltas = &deltas[1..];
        if deltas.iter().flatten().all(|d| *d == 0.0) {
            return Ok(NO_VARIATION_INDEX);
        }
        let supports = &model.supports()[1..];
        let key: SupportsKey = supports.iter().map(Region::key).collect();

        let data_idx = match self.current_data.get(&key) {
            Some(idx) if self.data[*idx].items.len() < u16::MAX as usize => *idx,
            _ => {
                let region_indexes = supports
                    .iter()
                    .map(|region| {
                        let entry = self.regions.entry(region.key());
                        let idx = entry.index();
                        entry.or_insert_with(|| region.clone());
                        idx as u16
                    })
                    .collect();
                self.data.push(MultiVarData {
                    region_indexes,
                    items: Vec::new(),
                });
                let idx = self.data.len() - 1;
                self.current_data.insert(key, idx);
                idx
            }
        };

        let flat: Vec<i32> = deltas.iter().flatten().map(|d| *d as i32).collect();
        if let Some(var_idx) = self.cache.get(&(data_idx, flat.clone())) {
            return Ok(*var_idx);
        }
        let items = &mut self.data[data_idx].items;
        let var_idx = ((data_idx as u32) << 16) | items.len() as u32;
        items.push(flat.clone());
        self.cache.insert((data_idx, flat), var_idx);
        Ok(var_idx)
    }

    fn region_bytes(&self, region: &Region) -> Result<Vec<u8>, Error> {
        let mut records = region
            .iter()
            .map(|(tag, tent)| {
                let axis_index = self
                    .axis_tags
                    .iter()
                    .position(|t| t == tag)
                    .ok_or_else(|| Error::FontBuild(format!("VARC region on unknown axis {tag}")))?;
                Ok((axis_index as u16, *tent))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        records.sort_by_key(|(axis_index, _)| *axis_index);
        let mut out = (records.len() as u16).to_be_bytes().to_vec();
        for (axis_index, tent) in records {
            out.extend(axis_index.to_be_bytes());
            for coord in [tent.lower, tent.peak, tent.upper] {
                out.extend(F2Dot14::from_f32(coord as f32).to_be_bytes());
            }
        }
        Ok(out)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let mut region_list = (self.regions.len() as u16).to_be_bytes().to_vec();
        let mut region_data = Vec::new();
        let regions_start = 2 + 4 * self.regions.len();
        for region in self.regions.values() {
            region_list.extend(((regions_start + region_data.len()) as u32).to_be_bytes());
            region_data.extend(self.region_bytes(region)?);
        }
        region_list.extend(region_data);

        let header_len = 8 + 4 * self.data.len();
        let mut out = 1u16.to_be_bytes().to_vec();
        out.extend((header_len as u32).to_be_bytes());
        out.extend((self.data.len() as u16).to_be_bytes());
        let mut data_bytes = Vec::new();
        for data in self.data.iter() {
            let offset = header_len + region_list.len() + data_bytes.len();
            out.extend((offset as u32).to_be_bytes());
            data_bytes.push(1u8);
            data_bytes.extend((data.region_indexes.len() as u16).to_be_bytes());
            data.region_indexes
                .iter()
                .for_each(|idx| data_bytes.extend(idx.to_be_bytes()));
            let items: Vec<Vec<u8>> = data
                .items
                .iter()
                .map(|item| {
                    let mut packed = Vec::new();
                    write_tuple_values(&mut packed, item);
                    packed
                })
                .collect();
            write_index2(&mut data_bytes, &items);
        }
        out.extend(region_list);
        out.extend(data_bytes);
        Ok(out)
    }
}

/// One component of a variable composite glyph, ready to write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarcComponent {
    pub flags: u32,
    pub gid: u32,
    pub axis_indices_index: Option<u32>,
    /// F2Dot14 bits at the default master
    pub axis_values: Vec<i32>,
    pub axis_values_var_index: Option<u32>,
    pub transform_var_index: Option<u32>,
    /// Stored values of the flagged transform fields, in field order
    pub transform: Vec<i32>,
}

impl VarcComponent {
    fn write(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        let mut flags = self.flags;
        if self.gid > u16::MAX as u32 {
            flags |= GID_IS_24BIT;
        }
        write_uint32var(out, flags);
        if flags & GID_IS_24BIT != 0 {
            out.extend(&self.gid.to_be_bytes()[1..]);
        } else {
            out.extend((self.gid as u16).to_be_bytes());
        }
        if flags & HAVE_AXES != 0 {
            let index = self.axis_indices_index.ok_or_else(|| {
                Error::FontBuild(format!("component of gid {} lacks axis indices", self.gid))
            })?;
            write_uint32var(out, index);
            write_tuple_values(out, &self.axis_values);
        }
        if let Some(var_idx) = self.axis_values_var_index {
            write_uint32var(out, var_idx);
        }
        if let Some(var_idx) = self.transform_var_index {
            write_uint32var(out, var_idx);
        }
        for value in self.transform.iter() {
            let value = i16::try_from(*value).map_err(|_| {
                Error::FontBuild(format!(
                    "component of gid {}: transform value {value} does not fit",
                    self.gid
                ))
            })?;
            out.extend(value.to_be_bytes());
        }
        Ok(())
    }
}

/// Composite glyphs in ascending gid order.
pub fn build_varc(
    glyphs: &[(u16, Vec<VarcComponent>)],
    axis_indices: &[Vec<u16>],
    store: &MultiVarStoreBuilder,
) -> Result<Vec<u8>, Error> {
    let coverage: CoverageTable = glyphs.iter().map(|(gid, _)| GlyphId16::new(*gid)).collect();
    let coverage = dump_table(&coverage).map_err(|e| Error::FontBuild(format!("VARC: {e}")))?;
    let store = if store.is_empty() {
        Vec::new()
    } else {
        store.serialize()?
    };

    let mut axis_indices_list = Vec::new();
    if !axis_indices.is_empty() {
        let items: Vec<Vec<u8>> = axis_indices
            .iter()
            .map(|indices| {
                let mut packed = Vec::new();
                let values: Vec<i32> = indices.iter().map(|i| *i as i32).collect();
                write_tuple_values(&mut packed, &values);
                packed
            })
            .collect();
        write_index2(&mut axis_indices_list, &items);
    }

    let mut composites = Vec::with_capacity(glyphs.len());
    for (_, components) in glyphs.iter() {
        let mut record = Vec::new();
        for component in components.iter() {
            component.write(&mut record)?;
        }
        composites.push(record);
    }
    let mut composites_index = Vec::new();
    write_index2(&mut composites_index, &composites);

    let coverage_offset = HEADER_SIZE;
    let store_offset = coverage_offset + coverage.len();
    let axis_indices_offset = store_offset + store.len();
    let composites_offset = axis_indices_offset + axis_indices_list.len();
    let nullable = |offset: usize, len: usize| if len == 0 { 0 } else { offset as u32 };

    let mut out = Vec::new();
    out.extend(1u16.to_be_bytes());
    out.extend(0u16.to_be_bytes());
    out.extend((coverage_offset as u32).to_be_bytes());
    out.extend(nullable(store_offset, store.len()).to_be_bytes());
    // no condition list
    out.extend(0u32.to_be_bytes());
    out.extend(nullable(axis_indices_offset, axis_indices_list.len()).to_be_bytes());
    out.extend((composites_offset as u32).to_be_bytes());
    out.extend(coverage);
    out.extend(store);
    out.extend(axis_indices_list);
    out.extend(composites_index);
    trace!("VARC: {} composite glyphs, {} bytes", glyphs.len(), out.len());
    Ok(out)
}
