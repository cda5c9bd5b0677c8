//! Gives the default UFO a `public.glyphOrder` if it lacks one.

use std::cmp::Ordering;

use log::debug;
use plist::Value;

use crate::{error::Error, project::Project, ufo};

/// Glyphs that go first, in this order, when present
const FIRST_GLYPHS: [&str; 4] = [".notdef", ".null", "CR", "space"];

fn priority(glyph_name: &str) -> usize {
    FIRST_GLYPHS
        .iter()
        .position(|n| *n == glyph_name)
        .unwrap_or(FIRST_GLYPHS.len())
}

/// Orders glyph names: the well known first glyphs, then everything else by name.
pub fn glyph_sort_key(glyph_name: &str) -> (usize, &str) {
    (priority(glyph_name), glyph_name)
}

pub fn compare_glyph_names(a: &str, b: &str) -> Ordering {
    glyph_sort_key(a).cmp(&glyph_sort_key(b))
}

pub fn sorted_glyph_order(mut glyph_names: Vec<String>) -> Vec<String> {
    glyph_names.sort_by(|a, b| compare_glyph_names(a, b));
    glyph_names
}

/// Returns whether a glyph order was added.
///
/// An existing order is never replaced.
pub fn add_glyph_order(project: &Project) -> Result<bool, Error> {
    let ufo_dir = project.default_ufo()?;
    let lib_file = ufo::lib_file(&ufo_dir);
    let mut lib = ufo::read_dict(&lib_file)?;
    if lib.contains_key(ufo::GLYPH_ORDER_KEY) {
        debug!("{ufo_dir:?} already has a glyph order");
        return Ok(false);
    }
    let order = sorted_glyph_order(ufo::glyph_names(&ufo_dir, None)?);
    debug!("Glyph order for {ufo_dir:?} has {} glyphs", order.len());
    lib.insert(
        ufo::GLYPH_ORDER_KEY.to_string(),
        Value::Array(order.into_iter().map(Value::String).collect()),
    );
    ufo::write_dict(&lib_file, lib)?;
    Ok(true)
}
