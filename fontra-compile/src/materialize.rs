//! Copies a font source to disk as a UFO or a designspace of UFOs.
//!
//! Unreachable sources and layers are always dropped first, a stray source
//! leaves the compiler guessing which master is the default.

use std::{
    collections::HashSet,
    fmt::Display,
    fs,
    path::Path,
};

use fontra_source::{
    axis::default_location,
    coords::DesignLocation,
    filter::DropUnusedSourcesAndLayers,
    glyph::{GlyphSource, VariableGlyph},
    source::{FontSource, ReadableFontSource},
    GlyphName,
};
use indexmap::IndexMap;
use log::{debug, trace, warn};
use plist::Value;

use crate::{
    designspace::{DesignSpaceDocument, DsAxis, DsSource},
    error::Error,
    project::Project,
    ufo,
};

/// Name shared by every file the materializer writes
pub const TEMP_STEM: &str = "temp";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeOptions {
    /// Set `public.truetype.overlap` in every UFO
    pub set_overlap_simple_flag: bool,
    /// Skip glyphs that fail to copy rather than failing outright
    pub continue_on_error: bool,
}

/// Glyphs left out of a project because they failed to copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyFailures {
    failures: Vec<(GlyphName, String)>,
}

impl CopyFailures {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(GlyphName, String)> {
        self.failures.iter()
    }

    pub fn record(&mut self, glyph: GlyphName, reason: impl Display) {
        self.failures.push((glyph, reason.to_string()));
    }

    pub fn extend(&mut self, other: CopyFailures) {
        self.failures.extend(other.failures);
    }
}

impl Display for CopyFailures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} glyph(s) failed to copy", self.failures.len())?;
        for (glyph, reason) in self.failures.iter() {
            write!(f, "\n  {glyph}: {reason}")?;
        }
        Ok(())
    }
}

/// One UFO of the project
#[derive(Debug)]
struct Master {
    id: String,
    source: FontSource,
    /// Every global axis specified
    location: DesignLocation,
    filename: String,
    glyphs: Vec<norad::Glyph>,
}

/// Where a glyph source ends up
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Target {
    Master(usize),
    /// A layer of the default master, for a location no font source covers
    Sparse(DesignLocation),
}

fn location_name(location: &DesignLocation) -> String {
    location
        .iter()
        .map(|(name, pos)| format!("{name}={pos}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// A filename stem nobody will trip over
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The location restricted to global axes, every one of them specified
fn global_location(
    location: &DesignLocation,
    defaults: &DesignLocation,
    glyph: &VariableGlyph,
) -> DesignLocation {
    location
        .iter()
        .filter(|(name, _)| defaults.contains(name) && !glyph.is_local_axis(name))
        .map(|(name, pos)| (name.clone(), *pos))
        .collect::<DesignLocation>()
        .with_defaults(defaults)
}

/// A UFO can't vary a glyph along its own axes, only the default of those is usable.
fn at_local_default(glyph: &VariableGlyph, source: &GlyphSource) -> bool {
    glyph.axes.iter().all(|axis| {
        source
            .location
            .get(&axis.name)
            .map_or(true, |pos| pos.to_f64() == axis.default_value)
    })
}

/// Record a failure if we may continue, otherwise fail
fn skip_or_fail(
    failures: &mut CopyFailures,
    options: &MaterializeOptions,
    glyph: &GlyphName,
    error: Error,
) -> Result<(), Error> {
    if !options.continue_on_error {
        return Err(error);
    }
    warn!("Skipping '{glyph}': {error}");
    failures.record(glyph.clone(), error);
    Ok(())
}

fn read_glyphs(
    source: &dyn ReadableFontSource,
    options: &MaterializeOptions,
    failures: &mut CopyFailures,
) -> Result<Vec<(Vec<u32>, VariableGlyph)>, Error> {
    let mut glyphs = Vec::new();
    for (name, codepoints) in source.glyph_map()? {
        match source.glyph(&name) {
            Ok(Some(glyph)) => glyphs.push((codepoints, glyph)),
            Ok(None) => skip_or_fail(
                failures,
                options,
                &name,
                fontra_source::Error::NoGlyph(name.clone()).into(),
            )?,
            Err(e) => skip_or_fail(failures, options, &name, e.into())?,
        }
    }
    Ok(glyphs)
}

fn push_master(
    masters: &mut Vec<Master>,
    id: String,
    source: FontSource,
    location: DesignLocation,
) {
    if let Some(existing) = masters.iter().find(|m| m.location == location) {
        warn!(
            "Font source '{id}' is at the same location as '{}', dropping it",
            existing.id
        );
        return;
    }
    masters.push(Master {
        id,
        source,
        location,
        filename: String::new(),
        glyphs: Vec::new(),
    });
}

/// Font sources as masters, the default first.
fn masters(
    sources: IndexMap<String, FontSource>,
    defaults: &DesignLocation,
    glyphs: &[(Vec<u32>, VariableGlyph)],
) -> Vec<Master> {
    let mut masters: Vec<Master> = Vec::new();
    if sources.is_empty() {
        debug!("No font sources, deriving them from glyph sources");
        push_master(
            &mut masters,
            "default".to_string(),
            FontSource::new("Regular", defaults.clone()),
            defaults.clone(),
        );
        for (_, glyph) in glyphs.iter() {
            for source in glyph.active_sources() {
                if !at_local_default(glyph, source) {
                    continue;
                }
                let location = global_location(&source.location, defaults, glyph);
                if masters.iter().any(|m| m.location == location) {
                    continue;
                }
                let name = location_name(&location);
                push_master(
                    &mut masters,
                    name.clone(),
                    FontSource::new(name, location.clone()),
                    location,
                );
            }
        }
    } else {
        for (id, source) in sources {
            let location = source
                .location
                .iter()
                .filter(|(name, _)| defaults.contains(name))
                .map(|(name, pos)| (name.clone(), *pos))
                .collect::<DesignLocation>()
                .with_defaults(defaults);
            push_master(&mut masters, id, source, location);
        }
    }

    match masters.iter().position(|m| &m.location == defaults) {
        Some(0) => (),
        Some(idx) => {
            let default = masters.remove(idx);
            masters.insert(0, default);
        }
        None => {
            warn!("No font source at the default location {defaults:?}, adding an empty one");
            masters.insert(
                0,
                Master {
                    id: "default".to_string(),
                    source: FontSource::new("Regular", defaults.clone()),
                    location: defaults.clone(),
                    filename: String::new(),
                    glyphs: Vec::new(),
                },
            );
        }
    }
    masters
}

/// Convert every usable source of a glyph, all or nothing.
fn place_glyph(
    codepoints: &[u32],
    glyph: &VariableGlyph,
    masters: &[Master],
    defaults: &DesignLocation,
) -> Result<Vec<(Target, norad::Glyph)>, Error> {
    let mut placed = Vec::new();
    let mut seen = HashSet::new();
    for source in glyph.active_sources() {
        if !at_local_default(glyph, source) {
            trace!(
                "{}: skipping '{}', it is off the default of a glyph axis",
                glyph.name,
                source.name
            );
            continue;
        }
        let location = global_location(&source.location, defaults, glyph);
        let by_base = source
            .location_base
            .as_ref()
            .and_then(|base| masters.iter().position(|m| &m.id == base));
        let target = by_base
            .or_else(|| masters.iter().position(|m| m.location == location))
            .map(Target::Master)
            .unwrap_or(Target::Sparse(location));
        if !seen.insert(target.clone()) {
            warn!(
                "{}: more than one source at {target:?}, dropping '{}'",
                glyph.name, source.name
            );
            continue;
        }
        let drawing = glyph.layer_glyph(source)?;
        placed.push((target, ufo::to_norad_glyph(&glyph.name, codepoints, drawing)?));
    }
    if !seen.contains(&Target::Master(0)) {
        warn!("{} has no source at the default location", glyph.name);
    }
    Ok(placed)
}

fn assign_filenames(masters: &mut [Master], is_variable: bool) {
    if !is_variable {
        masters[0].filename = format!("{TEMP_STEM}.ufo");
        return;
    }
    let mut used = HashSet::new();
    for master in masters.iter_mut() {
        let stem = format!("{TEMP_STEM}_{}", sanitize(&master.id));
        let mut filename = format!("{stem}.ufo");
        let mut n = 1;
        while !used.insert(filename.clone()) {
            filename = format!("{stem}_{n}.ufo");
            n += 1;
        }
        master.filename = filename;
    }
}

/// Copy `source` into `dir`, returning the project and whatever failed to copy.
///
/// Axes decide the shape: none make a `temp.ufo`, any make a `temp.designspace`
/// next to one UFO per font source.
pub fn materialize(
    source: impl ReadableFontSource,
    dir: &Path,
    options: &MaterializeOptions,
) -> Result<(Project, CopyFailures), Error> {
    let source = DropUnusedSourcesAndLayers::new(source);
    let axes = source.axes()?;
    let is_variable = !axes.is_empty();
    let defaults = default_location(&axes);

    fs::create_dir_all(dir).map_err(|source| Error::FileIo {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut failures = CopyFailures::default();
    let glyphs = read_glyphs(&source, options, &mut failures)?;

    let mut masters = masters(source.sources()?, &defaults, &glyphs);
    if !is_variable {
        masters.truncate(1);
    }
    assign_filenames(&mut masters, is_variable);

    // keyed by location, (layer name, glyphs)
    let mut sparse: IndexMap<DesignLocation, (String, Vec<norad::Glyph>)> = IndexMap::new();
    for (codepoints, glyph) in glyphs.iter() {
        let placed = match place_glyph(codepoints, glyph, &masters, &defaults) {
            Ok(placed) => placed,
            Err(e) => {
                skip_or_fail(&mut failures, options, &glyph.name, e)?;
                continue;
            }
        };
        for (target, norad_glyph) in placed {
            match target {
                Target::Master(idx) => masters[idx].glyphs.push(norad_glyph),
                Target::Sparse(location) => sparse
                    .entry(location.clone())
                    .or_insert_with(|| (location_name(&location), Vec::new()))
                    .1
                    .push(norad_glyph),
            }
        }
    }

    let units_per_em = source.units_per_em()?;
    let font_info = source.font_info()?;
    let custom_data = source.custom_data()?;
    let sparse_sources: Vec<_> = sparse
        .iter()
        .map(|(location, (layer_name, _))| (location.clone(), layer_name.clone()))
        .collect();
    let mut layer_glyphs = Some(sparse.into_values().collect::<Vec<_>>());
    for (idx, master) in masters.iter_mut().enumerate() {
        let ufo_dir = dir.join(&master.filename);
        let mut font = norad::Font::new();
        for glyph in std::mem::take(&mut master.glyphs) {
            font.default_layer_mut().insert_glyph(glyph);
        }
        if idx == 0 {
            for (layer_name, glyphs) in layer_glyphs.take().unwrap_or_default() {
                let layer = font
                    .layers
                    .new_layer(&layer_name)
                    .map_err(|e| Error::WriteError(ufo_dir.clone(), e.to_string()))?;
                for glyph in glyphs {
                    layer.insert_glyph(glyph);
                }
            }
        }
        debug!("Write {ufo_dir:?}");
        font.save(&ufo_dir)
            .map_err(|e| Error::WriteError(ufo_dir.clone(), e.to_string()))?;

        ufo::update_dict(&ufo::fontinfo_file(&ufo_dir), |info| {
            ufo::apply_font_info(info, &font_info, units_per_em);
            ufo::apply_source_info(info, &master.source);
        })?;
        let is_default = idx == 0;
        if options.set_overlap_simple_flag || (is_default && !custom_data.is_empty()) {
            ufo::update_dict(&ufo::lib_file(&ufo_dir), |lib| {
                if is_default {
                    for (key, value) in custom_data.iter() {
                        if let Some(value) = ufo::json_to_plist(value) {
                            lib.insert(key.clone(), value);
                        }
                    }
                }
                if options.set_overlap_simple_flag {
                    lib.insert(ufo::OVERLAP_KEY.to_string(), Value::Boolean(true));
                }
            })?;
        }
    }

    if !is_variable {
        return Ok((Project::Ufo(dir.join(&masters[0].filename)), failures));
    }

    let mut doc = DesignSpaceDocument {
        axes: axes.iter().map(DsAxis::from).collect(),
        ..Default::default()
    };
    for master in masters.iter() {
        doc.sources.push(DsSource {
            name: master.id.clone(),
            filename: master.filename.clone(),
            layer: None,
            style_name: Some(master.source.name.clone()),
            location: master.location.clone(),
        });
    }
    for (location, layer_name) in sparse_sources.iter() {
        doc.sources.push(DsSource {
            name: format!("{}.{layer_name}", masters[0].id),
            filename: masters[0].filename.clone(),
            layer: Some(layer_name.clone()),
            style_name: None,
            location: location.clone(),
        });
    }
    let designspace_file = dir.join(format!("{TEMP_STEM}.designspace"));
    doc.save(&designspace_file)?;
    debug!(
        "{} masters and {} sparse layers in {designspace_file:?}",
        masters.len(),
        sparse_sources.len()
    );
    Ok((Project::Designspace(designspace_file), failures))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use fontra_source::{
        axis::Axis,
        coords::DesignCoord,
        glyph::{Layer, StaticGlyph},
        source::InMemoryFont,
        FontraBackend,
    };
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;
    use write_fonts::types::Tag;

    use crate::test::testdata_dir;

    use super::*;

    fn options() -> MaterializeOptions {
        MaterializeOptions::default()
    }

    fn layer(advance: f64) -> Layer {
        Layer {
            glyph: StaticGlyph {
                x_advance: advance,
                ..Default::default()
            },
        }
    }

    #[test]
    fn static_source_makes_a_ufo() {
        let temp = tempdir().unwrap();
        let source = FontraBackend::new(testdata_dir().join("minimal.fontra")).unwrap();
        let (project, failures) = materialize(source, temp.path(), &options()).unwrap();

        assert!(failures.is_empty());
        assert_eq!(Project::Ufo(temp.path().join("temp.ufo")), project);
        assert_eq!(
            vec![".notdef", "A", "space"],
            ufo::glyph_names(project.path(), None).unwrap()
        );
        let info = ufo::read_dict(&ufo::fontinfo_file(project.path())).unwrap();
        assert_eq!(Some(&Value::from("Minimal")), info.get("familyName"));
        assert_eq!(Some(&Value::from(1000i64)), info.get("unitsPerEm"));
        assert_eq!(Some(&Value::Real(800.0)), info.get("ascender"));
    }

    #[test]
    fn variable_source_makes_a_designspace() {
        let temp = tempdir().unwrap();
        let source =
            FontraBackend::new(testdata_dir().join("MutatorSansLite.fontra")).unwrap();
        let (project, _) = materialize(source, temp.path(), &options()).unwrap();

        assert_eq!(
            Project::Designspace(temp.path().join("temp.designspace")),
            project
        );
        let doc = DesignSpaceDocument::load(project.path()).unwrap();
        assert_eq!(
            vec![
                ("light", "temp_light.ufo", None),
                ("bold", "temp_bold.ufo", None),
                ("light.Weight=500", "temp_light.ufo", Some("Weight=500")),
            ],
            doc.sources
                .iter()
                .map(|s| (s.name.as_str(), s.filename.as_str(), s.layer.as_deref()))
                .collect::<Vec<_>>()
        );
        assert_eq!(vec![(400.0, 0.0), (700.0, 600.0), (900.0, 1000.0)], doc.axes[0].map);
        assert_eq!(
            temp.path().join("temp_light.ufo"),
            project.default_ufo().unwrap()
        );
        assert_eq!(
            vec!["B"],
            ufo::glyph_names(&temp.path().join("temp_light.ufo"), Some("Weight=500")).unwrap()
        );
        // the unused sketch layer of A doesn't travel
        assert_eq!(
            vec![".notdef", "A", "B", "space"],
            ufo::glyph_names(&temp.path().join("temp_bold.ufo"), None).unwrap()
        );
    }

    #[test]
    fn overlap_flag_lands_in_every_ufo() {
        let temp = tempdir().unwrap();
        let source =
            FontraBackend::new(testdata_dir().join("MutatorSansLite.fontra")).unwrap();
        let options = MaterializeOptions {
            set_overlap_simple_flag: true,
            ..Default::default()
        };
        materialize(source, temp.path(), &options).unwrap();
        for filename in ["temp_light.ufo", "temp_bold.ufo"] {
            let lib = ufo::read_dict(&ufo::lib_file(&temp.path().join(filename))).unwrap();
            assert_eq!(
                Some(&Value::Boolean(true)),
                lib.get(ufo::OVERLAP_KEY),
                "{filename}"
            );
        }
    }

    fn font_with_bad_glyph() -> InMemoryFont {
        let mut font = InMemoryFont::new(1000);
        font.sources.insert(
            "default".to_string(),
            FontSource::new("Regular", DesignLocation::new()),
        );
        font.add_glyph(
            vec![],
            VariableGlyph {
                name: "good".into(),
                axes: Vec::new(),
                sources: vec![GlyphSource::new("default", "foreground")],
                layers: BTreeMap::from([("foreground".to_string(), layer(500.0))]),
            },
        );
        font.add_glyph(
            vec![],
            VariableGlyph {
                name: "bad".into(),
                axes: Vec::new(),
                sources: vec![GlyphSource::new("default", "missing")],
                layers: BTreeMap::new(),
            },
        );
        font
    }

    #[test]
    fn failure_aborts_by_default() {
        let temp = tempdir().unwrap();
        assert!(materialize(font_with_bad_glyph(), temp.path(), &options()).is_err());
    }

    #[test]
    fn continue_on_error_collects_failures() {
        let temp = tempdir().unwrap();
        let options = MaterializeOptions {
            continue_on_error: true,
            ..Default::default()
        };
        let (project, failures) =
            materialize(font_with_bad_glyph(), temp.path(), &options).unwrap();
        assert_eq!(
            vec![GlyphName::new("bad")],
            failures.iter().map(|(g, _)| g.clone()).collect::<Vec<_>>()
        );
        assert_eq!(vec!["good"], ufo::glyph_names(project.path(), None).unwrap());
    }

    #[test]
    fn masters_from_glyph_sources() {
        let mut font = InMemoryFont::new(1000);
        font.axes = vec![Axis::new("Weight", Tag::new(b"wght"), 100.0, 100.0, 900.0)];
        let bold: DesignLocation = [("Weight", DesignCoord::new(900.0))].into_iter().collect();
        font.add_glyph(
            vec![0x41],
            VariableGlyph {
                name: "A".into(),
                axes: Vec::new(),
                sources: vec![
                    GlyphSource::new("bold", "bold").at(bold),
                    GlyphSource::new("regular", "regular"),
                ],
                layers: BTreeMap::from([
                    ("regular".to_string(), layer(500.0)),
                    ("bold".to_string(), layer(600.0)),
                ]),
            },
        );
        let temp = tempdir().unwrap();
        let (project, _) = materialize(font, temp.path(), &options()).unwrap();
        let doc = DesignSpaceDocument::load(project.path()).unwrap();
        assert_eq!(
            vec!["default", "Weight=900"],
            doc.sources.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(
            vec!["A"],
            ufo::glyph_names(&temp.path().join("temp_Weight_900.ufo"), None).unwrap()
        );
    }

    #[test]
    fn filenames_are_unique() {
        let mut masters: Vec<_> = ["a b", "a_b"]
            .into_iter()
            .map(|id| Master {
                id: id.to_string(),
                source: FontSource::default(),
                location: DesignLocation::new(),
                filename: String::new(),
                glyphs: Vec::new(),
            })
            .collect();
        assign_filenames(&mut masters, true);
        assert_eq!(
            vec!["temp_a_b.ufo", "temp_a_b_1.ufo"],
            masters.iter().map(|m| m.filename.as_str()).collect::<Vec<_>>()
        );
    }
}
