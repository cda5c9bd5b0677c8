//! Generates a [gvar](https://learn.microsoft.com/en-us/typography/opentype/spec/gvar) table,
//! or its extended `GVAR` variant with 24-bit glyph counts.

use log::trace;
use write_fonts::{
    dump_table,
    tables::gvar::{GlyphDelta, GlyphDeltas, GlyphVariations, Gvar, Tent},
    types::{F2Dot14, GlyphId, Tag},
};

use crate::{
    error::Error,
    variations::{no_round, ot_round, Region, VariationModel},
};

pub const GVAR: Tag = Tag::new(b"gvar");
pub const EXTENDED_GVAR: Tag = Tag::new(b"GVAR");

// Byte offsets into the gvar header
const SHARED_TUPLES_OFFSET: usize = 8;
const GLYPH_COUNT: usize = 12;
const DATA_ARRAY_OFFSET: usize = 16;

/// One tent per fvar axis, peak zero where the region doesn't reach.
fn tents(region: &Region, axis_tags: &[Tag]) -> Vec<Tent> {
    axis_tags
        .iter()
        .map(|tag| match region.get(*tag) {
            Some(tent) => Tent::new(
                F2Dot14::from_f32(tent.peak as f32),
                Some((
                    F2Dot14::from_f32(tent.lower as f32),
                    F2Dot14::from_f32(tent.upper as f32),
                )),
            ),
            None => Tent::new(F2Dot14::ZERO, None),
        })
        .collect()
}

/// Point deltas for every non-default support that moves something.
///
/// `master_points` holds each master's points, phantom points included, in
/// the order the model was built with.
pub fn glyph_deltas(
    name: &str,
    model: &VariationModel,
    axis_tags: &[Tag],
    master_points: &[Vec<(f64, f64)>],
) -> Result<Vec<GlyphDeltas>, Error> {
    let flat: Vec<Vec<f64>> = master_points
        .iter()
        .map(|points| points.iter().flat_map(|(x, y)| [*x, *y]).collect())
        .collect();
    let deltas = model.deltas(&flat, no_round)?;

    let mut result = Vec::new();
    for (support, deltas) in model.supports().iter().zip(deltas).skip(1) {
        let rounded: Vec<i32> = deltas.into_iter().map(|d| ot_round(d) as i32).collect();
        if rounded.iter().all(|d| *d == 0) {
            continue;
        }
        let points = rounded
            .chunks(2)
            .map(|xy| {
                let x = i16::try_from(xy[0]);
                let y = i16::try_from(xy[1]);
                match (x, y) {
                    (Ok(x), Ok(y)) => Ok(GlyphDelta::required(x, y)),
                    _ => Err(Error::FontBuild(format!(
                        "{name}: delta ({}, {}) does not fit gvar",
                        xy[0], xy[1]
                    ))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        result.push(GlyphDeltas::new(tents(support, axis_tags), points));
    }
    trace!("{name}: {} gvar tuples", result.len());
    Ok(result)
}

/// Serialize gvar, or GVAR when `extended` is set.
///
/// Every glyph needs an entry in `variations`, even if it is empty.
pub fn build_gvar(
    variations: Vec<GlyphVariations>,
    axis_count: u16,
    extended: bool,
) -> Result<(Tag, Vec<u8>), Error> {
    let gvar = Gvar::new(variations, axis_count)
        .map_err(|e| Error::FontBuild(format!("gvar: {e:?}")))?;
    let bytes = dump_table(&gvar).map_err(|e| Error::FontBuild(format!("gvar: {e}")))?;
    if extended {
        Ok((EXTENDED_GVAR, extend_glyph_count(bytes)))
    } else {
        Ok((GVAR, bytes))
    }
}

pub fn empty_variations(gid: u32) -> GlyphVariations {
    GlyphVariations::new(GlyphId::new(gid), Vec::new())
}

/// Widen glyphCount to 24 bits, moving everything after it down one byte.
fn extend_glyph_count(mut bytes: Vec<u8>) -> Vec<u8> {
    bytes.insert(GLYPH_COUNT, 0);
    for offset_pos in [SHARED_TUPLES_OFFSET, DATA_ARRAY_OFFSET + 1] {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[offset_pos..offset_pos + 4]);
        let offset = u32::from_be_bytes(raw);
        if offset != 0 {
            bytes[offset_pos..offset_pos + 4].copy_from_slice(&(offset + 1).to_be_bytes());
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use write_fonts::read::{tables::gvar::Gvar as ReadGvar, FontData, FontRead};

    use crate::variations::NormalizedLocation;

    use super::*;

    const WGHT: Tag = Tag::new(b"wght");

    fn two_master_model() -> VariationModel {
        VariationModel::new(
            &[
                NormalizedLocation::new(),
                [(WGHT, 1.0)].into_iter().collect(),
            ],
            &[WGHT],
        )
        .unwrap()
    }

    fn variations() -> Vec<GlyphVariations> {
        let deltas = glyph_deltas(
            "a",
            &two_master_model(),
            &[WGHT],
            &[
                vec![(0.0, 0.0), (100.0, 0.0), (500.0, 0.0)],
                vec![(0.0, 0.0), (150.0, 10.4), (600.0, 0.0)],
            ],
        )
        .unwrap();
        vec![
            empty_variations(0),
            GlyphVariations::new(GlyphId::new(1), deltas),
        ]
    }

    #[test]
    fn default_and_zero_deltas_are_skipped() {
        let model = two_master_model();
        let same = vec![(1.0, 2.0), (3.0, 4.0)];
        let deltas = glyph_deltas("a", &model, &[WGHT], &[same.clone(), same]).unwrap();
        assert!(deltas.is_empty());
    }

    #[test]
    fn oversized_delta_is_an_error() {
        let model = two_master_model();
        let result = glyph_deltas("a", &model, &[WGHT], &[vec![(0.0, 0.0)], vec![(40000.0, 0.0)]]);
        assert!(matches!(result, Err(Error::FontBuild(..))), "{result:?}");
    }

    #[test]
    fn gvar_reads_back() {
        let (tag, bytes) = build_gvar(variations(), 1, false).unwrap();
        assert_eq!(GVAR, tag);
        let gvar = ReadGvar::read(FontData::new(&bytes)).unwrap();
        assert_eq!(2, gvar.glyph_count());
        assert!(gvar.glyph_variation_data(GlyphId::new(0)).unwrap().is_none());
        let data = gvar.glyph_variation_data(GlyphId::new(1)).unwrap().unwrap();
        let tuple = data.tuples().next().unwrap();
        let deltas: Vec<_> = tuple.deltas().map(|d| (d.position, d.x_delta, d.y_delta)).collect();
        assert_eq!(vec![(0, 0, 0), (1, 50, 10), (2, 100, 0)], deltas);
    }

    #[test]
    fn extended_gvar_has_a_wider_glyph_count() {
        let (_, plain) = build_gvar(variations(), 1, false).unwrap();
        let (tag, extended) = build_gvar(variations(), 1, true).unwrap();
        assert_eq!(EXTENDED_GVAR, tag);
        assert_eq!(plain.len() + 1, extended.len());
        assert_eq!(&[0, 0, 2], &extended[12..15]);

        let offset = |bytes: &[u8], pos: usize| u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap());
        assert_eq!(offset(&plain, 16) + 1, offset(&extended, 17));
        // everything after the header is unchanged
        assert_eq!(&plain[20..], &extended[21..]);
    }
}
