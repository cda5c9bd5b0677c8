//! Builds a [CFF2](https://learn.microsoft.com/en-us/typography/opentype/spec/cff2) table.
//!
//! Charstrings are written per master and merged with `blend` where the masters
//! differ. Each distinct set of supports gets its own `vsindex`.

use std::collections::HashMap;

use indexmap::IndexMap;
use kurbo::{BezPath, PathEl, Point};
use log::{debug, trace};
use ordered_float::OrderedFloat;
use write_fonts::{
    dump_table,
    tables::variations::{ItemVariationData, ItemVariationStore, VariationRegionList},
    types::Tag,
};

use crate::{
    error::Error,
    variations::{ot_round, Region, VariationModel},
};

/// Max operands on the charstring argument stack
const MAX_STACK: usize = 513;

// Charstring operators
const RLINETO: u8 = 5;
const RRCURVETO: u8 = 8;
const VSINDEX: u8 = 15;
const BLEND: u8 = 16;
const RMOVETO: u8 = 21;
const CALLGSUBR: u8 = 29;

// DICT operators
const CHARSTRINGS: &[u8] = &[17];
const PRIVATE: &[u8] = &[18];
const VSTORE: &[u8] = &[24];
const FONT_MATRIX: &[u8] = &[12, 7];
const FD_ARRAY: &[u8] = &[12, 36];

const HEADER_SIZE: u8 = 5;

/// Write a CFF2 INDEX; VARC borrows the format.
pub(crate) fn write_index2(out: &mut Vec<u8>, items: &[Vec<u8>]) {
    out.extend((items.len() as u32).to_be_bytes());
    if items.is_empty() {
        return;
    }
    let last_offset = items.iter().map(Vec::len).sum::<usize>() + 1;
    let off_size = match last_offset {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x10000..=0xFF_FFFF => 3,
        _ => 4,
    };
    out.push(off_size as u8);
    let push_offset = |out: &mut Vec<u8>, offset: usize| {
        out.extend(&(offset as u32).to_be_bytes()[4 - off_size..]);
    };
    let mut offset = 1;
    push_offset(out, offset);
    for item in items {
        offset += item.len();
        push_offset(out, offset);
    }
    for item in items {
        out.extend(item);
    }
}

/// Charstring integer operand
fn push_number(out: &mut Vec<u8>, value: i32) -> Result<(), Error> {
    match value {
        -107..=107 => out.push((value + 139) as u8),
        108..=1131 => {
            let v = value - 108;
            out.extend([((v >> 8) + 247) as u8, (v & 0xFF) as u8]);
        }
        -1131..=-108 => {
            let v = -value - 108;
            out.extend([((v >> 8) + 251) as u8, (v & 0xFF) as u8]);
        }
        -32768..=32767 => {
            out.push(28);
            out.extend((value as i16).to_be_bytes());
        }
        _ => {
            return Err(Error::FontBuild(format!(
                "{value} does not fit a charstring operand"
            )))
        }
    }
    Ok(())
}

/// DICT offsets always take five bytes so the DICT size doesn't depend on them.
fn push_dict_offset(out: &mut Vec<u8>, value: usize) {
    out.push(29);
    out.extend((value as u32).to_be_bytes());
}

/// A DICT real, as packed BCD
fn push_dict_real(out: &mut Vec<u8>, value: f64) {
    let mut nibbles: Vec<u8> = format!("{value}")
        .chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c as u8 - b'0'),
            '.' => Some(0xA),
            '-' => Some(0xE),
            _ => None,
        })
        .collect();
    nibbles.push(0xF);
    if nibbles.len() % 2 == 1 {
        nibbles.push(0xF);
    }
    out.push(30);
    out.extend(nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]));
}

/// A contour's opening move and the rest of it, kept apart so the rest can be shared.
#[derive(Debug, Clone, PartialEq)]
struct ContourOps {
    start: Vec<u8>,
    body: Vec<u8>,
    body_blends: bool,
}

/// A glyph's charstring before it is placed in a font
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharString {
    contours: Vec<ContourOps>,
    /// Supports of the glyph's model when anything blends
    supports: Option<Vec<Region>>,
}

impl CharString {
    pub fn empty() -> CharString {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }
}

/// Per-master state while walking the paths in lockstep
#[derive(Debug, Clone, Copy, Default)]
struct Pen {
    /// Last point, as drawn
    last: Point,
    /// Last point, rounded; relative operands are taken from this
    last_rounded: (f64, f64),
    contour_start: Point,
}

impl Pen {
    fn relative(&mut self, p: Point) -> [f64; 2] {
        let rounded = (ot_round(p.x), ot_round(p.y));
        let delta = [rounded.0 - self.last_rounded.0, rounded.1 - self.last_rounded.1];
        self.last_rounded = rounded;
        self.last = p;
        delta
    }
}

struct CharStringWriter<'a> {
    name: &'a str,
    model: Option<&'a VariationModel>,
    contours: Vec<ContourOps>,
    blends: bool,
}

impl CharStringWriter<'_> {
    /// Append an operator whose arguments are given once per master.
    fn push_op(&mut self, op: u8, args: Vec<Vec<f64>>) -> Result<(), Error> {
        let Some(contour) = self.contours.last_mut() else {
            return Err(Error::FontBuild(format!(
                "{}: drawing before the first move",
                self.name
            )));
        };
        let out = if op == RMOVETO {
            &mut contour.start
        } else {
            &mut contour.body
        };
        let default = &args[0];
        match self.model {
            Some(model) if args.iter().any(|a| a != default) => {
                let deltas = model.deltas(&args, ot_round)?;
                let n = deltas[0].len();
                let k = deltas.len() - 1;
                if n + n * k + 1 > MAX_STACK {
                    return Err(Error::FontBuild(format!(
                        "{}: blend of {n} values over {k} regions overflows the stack",
                        self.name
                    )));
                }
                for value in deltas[0].iter() {
                    push_number(out, *value as i32)?;
                }
                for i in 0..n {
                    for region_deltas in deltas[1..].iter() {
                        push_number(out, region_deltas[i] as i32)?;
                    }
                }
                push_number(out, n as i32)?;
                out.push(BLEND);
                if op != RMOVETO {
                    contour.body_blends = true;
                }
                self.blends = true;
            }
            _ => {
                let default = &args[self.model.map(VariationModel::default_index).unwrap_or(0)];
                for value in default.iter() {
                    push_number(out, *value as i32)?;
                }
            }
        }
        out.push(op);
        Ok(())
    }
}

/// Merge one path per master into a charstring.
///
/// `masters` are in the order `model` was built with. Closing lines back to the
/// contour start are implied in CFF and dropped.
pub fn build_charstring(
    name: &str,
    masters: &[BezPath],
    model: Option<&VariationModel>,
) -> Result<CharString, Error> {
    let Some(first) = masters.first() else {
        return Ok(CharString::empty());
    };
    let num_elements = first.elements().len();
    if masters.iter().any(|p| p.elements().len() != num_elements) {
        return Err(Error::Interpolation(
            name.into(),
            "paths have different numbers of segments".to_string(),
        ));
    }
    let mut pens = vec![Pen::default(); masters.len()];
    let mut writer = CharStringWriter {
        name,
        model,
        contours: Vec::new(),
        blends: false,
    };

    for i in 0..num_elements {
        let elements: Vec<PathEl> = masters.iter().map(|p| p.elements()[i]).collect();
        let next_closes = masters
            .iter()
            .all(|p| matches!(p.elements().get(i + 1), Some(PathEl::ClosePath)));
        let kind = std::mem::discriminant(&elements[0]);
        if elements.iter().any(|el| std::mem::discriminant(el) != kind) {
            return Err(Error::Interpolation(
                name.into(),
                format!("segment {i} is not the same kind in every source"),
            ));
        }

        let mut args = Vec::with_capacity(masters.len());
        let op = match elements[0] {
            PathEl::MoveTo(_) => {
                writer.contours.push(ContourOps {
                    start: Vec::new(),
                    body: Vec::new(),
                    body_blends: false,
                });
                for (pen, el) in pens.iter_mut().zip(elements.iter()) {
                    let PathEl::MoveTo(p) = el else { continue };
                    pen.contour_start = *p;
                    args.push(pen.relative(*p).to_vec());
                }
                RMOVETO
            }
            PathEl::LineTo(_) => {
                let closing = next_closes
                    && pens.iter().zip(elements.iter()).all(|(pen, el)| {
                        matches!(el, PathEl::LineTo(p) if *p == pen.contour_start)
                    });
                if closing {
                    continue;
                }
                for (pen, el) in pens.iter_mut().zip(elements.iter()) {
                    let PathEl::LineTo(p) = el else { continue };
                    args.push(pen.relative(*p).to_vec());
                }
                RLINETO
            }
            PathEl::QuadTo(..) | PathEl::CurveTo(..) => {
                for (pen, el) in pens.iter_mut().zip(elements.iter()) {
                    let (c0, c1, p) = match *el {
                        PathEl::QuadTo(c, p) => {
                            let start = pen.last;
                            (start + (c - start) * (2.0 / 3.0), p + (c - p) * (2.0 / 3.0), p)
                        }
                        PathEl::CurveTo(c0, c1, p) => (c0, c1, p),
                        _ => continue,
                    };
                    let mut master_args = pen.relative(c0).to_vec();
                    master_args.extend(pen.relative(c1));
                    master_args.extend(pen.relative(p));
                    args.push(master_args);
                }
                RRCURVETO
            }
            PathEl::ClosePath => {
                for pen in pens.iter_mut() {
                    pen.last = pen.contour_start;
                }
                continue;
            }
        };
        writer.push_op(op, args)?;
    }

    let supports = match (writer.blends, model) {
        (true, Some(model)) => Some(model.supports()[1..].to_vec()),
        _ => None,
    };
    trace!(
        "{name}: {} contours, blends {}",
        writer.contours.len(),
        supports.is_some()
    );
    Ok(CharString {
        contours: writer.contours,
        supports,
    })
}

type SupportsKey = Vec<Vec<(Tag, [OrderedFloat<f64>; 3])>>;

fn supports_key(supports: &[Region]) -> SupportsKey {
    supports.iter().map(Region::key).collect()
}

/// 107, 1131 or 32768 depending on how many subroutines there are
fn subr_bias(count: usize) -> i32 {
    if count < 1240 {
        107
    } else if count < 33900 {
        1131
    } else {
        32768
    }
}

/// Contour bodies used more than once, most used first.
///
/// Bodies that blend are only shared between glyphs with the same `vsindex`.
fn find_subroutines(
    charstrings: &[CharString],
    vsindexes: &[Option<usize>],
) -> Vec<(Option<usize>, Vec<u8>)> {
    // a call costs at most a three byte operand and the operator
    const CALL_COST: usize = 4;
    let mut counts: IndexMap<(Option<usize>, &[u8]), usize> = IndexMap::new();
    for (charstring, vsindex) in charstrings.iter().zip(vsindexes) {
        for contour in charstring.contours.iter() {
            let key = (
                vsindex.filter(|_| contour.body_blends),
                contour.body.as_slice(),
            );
            *counts.entry(key).or_default() += 1;
        }
    }
    let mut candidates: Vec<_> = counts
        .into_iter()
        .filter(|((_, body), count)| {
            let saved = count * body.len().saturating_sub(CALL_COST);
            *count >= 2 && saved > body.len() + CALL_COST
        })
        .collect();
    candidates.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    candidates
        .into_iter()
        .take(u16::MAX as usize)
        .map(|((vsindex, body), _)| (vsindex, body.to_vec()))
        .collect()
}

/// Assemble the table from charstrings in glyph order.
///
/// `axis_tags` are the fvar axes, for the variation store's regions.
pub fn build_cff2(
    units_per_em: u16,
    charstrings: &[CharString],
    axis_tags: &[Tag],
    subroutinize: bool,
) -> Result<Vec<u8>, Error> {
    let mut vsindex_map: IndexMap<SupportsKey, Vec<Region>> = IndexMap::new();
    let vsindexes: Vec<Option<usize>> = charstrings
        .iter()
        .map(|charstring| {
            charstring.supports.as_ref().map(|supports| {
                let entry = vsindex_map.entry(supports_key(supports));
                let index = entry.index();
                entry.or_insert_with(|| supports.clone());
                index
            })
        })
        .collect();

    let subrs = if subroutinize {
        find_subroutines(charstrings, &vsindexes)
    } else {
        Vec::new()
    };
    let bias = subr_bias(subrs.len());
    let subr_index: HashMap<(Option<usize>, &[u8]), i32> = subrs
        .iter()
        .enumerate()
        .map(|(i, (vsindex, body))| ((*vsindex, body.as_slice()), i as i32 - bias))
        .collect();
    if subroutinize {
        debug!("{} global subroutines", subrs.len());
    }

    let mut glyph_data = Vec::with_capacity(charstrings.len());
    for (charstring, vsindex) in charstrings.iter().zip(vsindexes.iter()) {
        let mut data = Vec::new();
        if let Some(vsindex) = vsindex.filter(|v| *v != 0) {
            push_number(&mut data, vsindex as i32)?;
            data.push(VSINDEX);
        }
        for contour in charstring.contours.iter() {
            data.extend(&contour.start);
            let key = (
                vsindex.filter(|_| contour.body_blends),
                contour.body.as_slice(),
            );
            match subr_index.get(&key) {
                Some(biased) => {
                    push_number(&mut data, *biased)?;
                    data.push(CALLGSUBR);
                }
                None => data.extend(&contour.body),
            }
        }
        glyph_data.push(data);
    }

    let vstore = if vsindex_map.is_empty() {
        None
    } else {
        Some(variation_store(&vsindex_map, axis_tags)?)
    };

    let mut gsubrs = Vec::new();
    write_index2(
        &mut gsubrs,
        &subrs.into_iter().map(|(_, body)| body).collect::<Vec<_>>(),
    );
    let mut charstrings_index = Vec::new();
    write_index2(&mut charstrings_index, &glyph_data);

    let top_dict = |charstrings: usize, fd_array: usize, vstore_offset: Option<usize>| {
        let mut dict = Vec::new();
        let scale = 1.0 / units_per_em as f64;
        for value in [scale, 0.0, 0.0, scale, 0.0, 0.0] {
            push_dict_real(&mut dict, value);
        }
        dict.extend(FONT_MATRIX);
        push_dict_offset(&mut dict, charstrings);
        dict.extend(CHARSTRINGS);
        push_dict_offset(&mut dict, fd_array);
        dict.extend(FD_ARRAY);
        if let Some(offset) = vstore_offset {
            push_dict_offset(&mut dict, offset);
            dict.extend(VSTORE);
        }
        dict
    };
    let has_vstore = vstore.is_some();
    let top_dict_len = top_dict(0, 0, has_vstore.then_some(0)).len();

    let gsubrs_start = HEADER_SIZE as usize + top_dict_len;
    let vstore_start = gsubrs_start + gsubrs.len();
    let charstrings_start = vstore_start + vstore.as_ref().map(Vec::len).unwrap_or_default();
    let fd_array_start = charstrings_start + charstrings_index.len();
    let font_dict = |private_offset: usize| {
        let mut dict = Vec::new();
        // an empty Private DICT
        dict.push(139);
        push_dict_offset(&mut dict, private_offset);
        dict.extend(PRIVATE);
        dict
    };
    let mut fd_array = Vec::new();
    write_index2(&mut fd_array, &[font_dict(0)]);
    let private_start = fd_array_start + fd_array.len();
    fd_array.clear();
    write_index2(&mut fd_array, &[font_dict(private_start)]);

    let top_dict = top_dict(
        charstrings_start,
        fd_array_start,
        has_vstore.then_some(vstore_start),
    );
    let top_dict_len = u16::try_from(top_dict.len())
        .map_err(|_| Error::FontBuild("CFF2 top DICT is too large".to_string()))?;

    let mut table = vec![2, 0, HEADER_SIZE];
    table.extend(top_dict_len.to_be_bytes());
    table.extend(top_dict);
    table.extend(gsubrs);
    if let Some(vstore) = vstore {
        table.extend(vstore);
    }
    table.extend(charstrings_index);
    table.extend(fd_array);
    Ok(table)
}

/// One `ItemVariationData` per `vsindex`, all without items.
fn variation_store(
    vsindex_map: &IndexMap<SupportsKey, Vec<Region>>,
    axis_tags: &[Tag],
) -> Result<Vec<u8>, Error> {
    let mut regions: IndexMap<Vec<(Tag, [OrderedFloat<f64>; 3])>, &Region> = IndexMap::new();
    for supports in vsindex_map.values() {
        for region in supports.iter() {
            regions.entry(region.key()).or_insert(region);
        }
    }
    let data = vsindex_map
        .values()
        .map(|supports| {
            let indexes = supports
                .iter()
                .filter_map(|region| regions.get_index_of(&region.key()))
                .map(|i| i as u16)
                .collect();
            Some(ItemVariationData::new(0, 0, indexes, Vec::new()))
        })
        .collect();
    let region_list = VariationRegionList::new(
        axis_tags.len() as u16,
        regions
            .values()
            .map(|region| region.to_write_fonts_variation_region(axis_tags))
            .collect(),
    );
    let store = ItemVariationStore::new(region_list, data);
    let store = dump_table(&store).map_err(|e| Error::FontBuild(format!("CFF2 vstore: {e}")))?;
    let len = u16::try_from(store.len())
        .map_err(|_| Error::FontBuild("CFF2 vstore is too large".to_string()))?;
    let mut bytes = len.to_be_bytes().to_vec();
    bytes.extend(store);
    Ok(bytes)
}
