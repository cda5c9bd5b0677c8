//! Generates an [HVAR](https://learn.microsoft.com/en-us/typography/opentype/spec/HVAR) table.

use write_fonts::tables::{
    hvar::Hvar,
    variations::{ivs_builder::VariationStoreBuilder, DeltaSetIndexMap, VariationRegion},
};

use crate::error::Error;

/// One delta set per glyph, in glyph order; glyphs that don't vary have none.
///
/// Advances always go through a [`DeltaSetIndexMap`] so glyphs that share
/// deltas share a delta set.
pub fn build_hvar(
    axis_count: u16,
    advance_deltas: &[Vec<(VariationRegion, i16)>],
) -> Result<Hvar, Error> {
    let mut builder = VariationStoreBuilder::new(axis_count);
    let temp_ids: Vec<_> = advance_deltas
        .iter()
        .map(|deltas| builder.add_deltas(deltas.clone()))
        .collect();
    let (store, remap) = builder.build();
    let var_idxes = temp_ids
        .into_iter()
        .map(|id| {
            remap
                .get(id)
                .ok_or_else(|| Error::FontBuild(format!("HVAR lost delta set {id}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let advance_map: DeltaSetIndexMap = var_idxes.into_iter().collect();
    Ok(Hvar::new(store, Some(advance_map), None, None))
}
