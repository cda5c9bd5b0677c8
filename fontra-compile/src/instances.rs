//! Named instances for a designspace that declares none.
//!
//! Instances are the cross product of the axis value labels, so an axis
//! labelled Regular/Bold and another labelled Upright/Italic make four.

use std::path::Path;

use fontra_source::coords::{DesignLocation, UserCoord};
use log::{debug, info};

use crate::{
    designspace::{DesignSpaceDocument, DsAxis, DsInstance},
    error::Error,
};

/// Style name when every label of an instance is elided
pub const DEFAULT_ELIDED_FALLBACK_NAME: &str = "Regular";

/// Registered axes first, in this order, anything else after them
fn axis_sort_key(axis: &DsAxis) -> usize {
    match &axis.tag.into_bytes() {
        b"wght" => 0,
        b"wdth" => 1,
        b"ital" => 2,
        b"slnt" => 3,
        _ => 100,
    }
}

/// One stop along one axis: axis name, style name part (None if elided), user value
type LabelStop<'a> = (&'a str, Option<&'a str>, f64);

fn cross_product<'a>(per_axis: &[Vec<LabelStop<'a>>]) -> Vec<Vec<LabelStop<'a>>> {
    let mut combinations: Vec<Vec<LabelStop>> = vec![Vec::new()];
    for stops in per_axis {
        combinations = combinations
            .into_iter()
            .flat_map(|prefix| {
                stops.iter().map(move |stop| {
                    let mut combination = prefix.clone();
                    combination.push(*stop);
                    combination
                })
            })
            .collect();
    }
    combinations
}

/// Compute, without saving, the instances [`add_instances`] would add.
///
/// Axes without labels stay at their default.
pub fn synthesize_instances(
    doc: &DesignSpaceDocument,
    family_name: &str,
    elided_fallback_name: &str,
) -> Result<Vec<DsInstance>, Error> {
    let mut axes: Vec<_> = doc.axes.iter().collect();
    // stable, ties keep document order
    axes.sort_by_key(|a| axis_sort_key(a));

    let per_axis: Vec<Vec<LabelStop>> = axes
        .iter()
        .filter(|axis| !axis.labels.is_empty())
        .map(|axis| {
            axis.labels
                .iter()
                .map(|label| {
                    (
                        axis.name.as_str(),
                        (!label.elidable).then_some(label.name.as_str()),
                        label.user_value,
                    )
                })
                .collect()
        })
        .collect();

    let defaults = doc.default_location();
    let mut instances = Vec::new();
    for combination in cross_product(&per_axis) {
        let mut name_parts: Vec<&str> = combination
            .iter()
            .filter_map(|(_, name, _)| *name)
            .collect();
        if name_parts.is_empty() {
            name_parts.push(elided_fallback_name);
        }

        let mut location = DesignLocation::new();
        for (axis_name, _, user_value) in combination.iter() {
            let Some(axis) = doc.axes.iter().find(|a| a.name == *axis_name) else {
                continue;
            };
            location.insert(
                *axis_name,
                axis.to_axis().map_forward(UserCoord::new(*user_value)),
            );
        }
        let location = location.with_defaults(&defaults);
        if let Some(missing) = doc.axes.iter().find(|a| !location.contains(&a.name)) {
            return Err(Error::IncompleteLocation(
                format!("{location:?}"),
                missing.name.clone(),
            ));
        }

        instances.push(DsInstance {
            name: None,
            family_name: family_name.to_string(),
            style_name: name_parts.join(" "),
            location,
        });
    }
    Ok(instances)
}

/// Add an instance per combination of axis labels unless the designspace has instances.
///
/// Returns whether the document changed. The style names are a best guess,
/// compilers that name instances from the axis labels will override them.
pub fn add_instances(designspace_file: &Path, family_name: &str) -> Result<bool, Error> {
    let mut doc = DesignSpaceDocument::load(designspace_file)?;
    if !doc.instances.is_empty() {
        debug!(
            "{designspace_file:?} already has {} instances",
            doc.instances.len()
        );
        return Ok(false);
    }

    let elided_fallback_name = doc
        .elided_fallback_name
        .clone()
        .unwrap_or_else(|| DEFAULT_ELIDED_FALLBACK_NAME.to_string());
    doc.instances = synthesize_instances(&doc, family_name, &elided_fallback_name)?;
    doc.elided_fallback_name = Some(elided_fallback_name);
    info!(
        "Synthesized {} instances for {designspace_file:?}",
        doc.instances.len()
    );
    doc.save(designspace_file)?;
    Ok(true)
}
