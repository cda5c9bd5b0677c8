//! Parse .fontra json filesets
//!
//! See <https://github.com/googlefonts/fontra/blob/main/src/fontra/core/classes.py>

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use write_fonts::types::Tag;

use crate::{
    axis::{Axis, AxisValueLabel},
    coords::UserCoord,
    error::Error,
    glyph::VariableGlyph,
    paths::string_to_filename,
    source::{FontInfo, FontSource, ReadableFontSource},
    types::GlyphName,
};

pub(crate) fn glyph_file(glyph_dir: &Path, glyph: &GlyphName) -> PathBuf {
    glyph_dir.join(string_to_filename(glyph.as_str(), ".json"))
}

fn from_file<T>(p: &Path) -> Result<T, Error>
where
    for<'a> T: Deserialize<'a>,
{
    let raw = fs::read_to_string(p).map_err(|source| Error::FileIo {
        path: p.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| Error::ParseError(p.to_path_buf(), format!("{e}")))
}

/// serde type used to load font-data.json
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FontraFontData {
    #[serde(rename = "unitsPerEm")]
    pub(crate) units_per_em: u16,
    #[serde(default)]
    pub(crate) axes: FontraAxes,
    #[serde(default)]
    pub(crate) sources: IndexMap<String, FontSource>,
    #[serde(rename = "fontInfo", default)]
    pub(crate) font_info: FontInfo,
    #[serde(rename = "customData", default)]
    pub(crate) custom_data: serde_json::Map<String, serde_json::Value>,
}

/// Older files have a list of axes, newer ones wrap it to make room for cross-axis mappings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum FontraAxes {
    List(Vec<FontraAxis>),
    Wrapped { axes: Vec<FontraAxis> },
}

impl Default for FontraAxes {
    fn default() -> Self {
        FontraAxes::List(Vec::new())
    }
}

impl FontraAxes {
    fn axes(&self) -> &[FontraAxis] {
        match self {
            FontraAxes::List(axes) => axes,
            FontraAxes::Wrapped { axes } => axes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum FontraAxis {
    Continuous(FontraContinuousAxis),
    Discrete(FontraDiscreteAxis),
}

/// Corresponds to a Fontra FontAxis
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FontraContinuousAxis {
    pub(crate) name: String,
    pub(crate) tag: Tag,
    #[serde(default)]
    pub(crate) hidden: bool,
    #[serde(rename = "defaultValue")]
    pub(crate) default_value: f64,
    #[serde(default)]
    pub(crate) mapping: Vec<[f64; 2]>,
    #[serde(rename = "valueLabels", default)]
    pub(crate) value_labels: Vec<AxisValueLabel>,

    #[serde(rename = "minValue")]
    pub(crate) min_value: f64,
    #[serde(rename = "maxValue")]
    pub(crate) max_value: f64,
}

/// Corresponds to a Fontra DiscreteFontAxis
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FontraDiscreteAxis {
    pub(crate) name: String,
    pub(crate) tag: Tag,
    #[serde(default)]
    pub(crate) hidden: bool,
    #[serde(rename = "defaultValue")]
    pub(crate) default_value: f64,
    #[serde(default)]
    pub(crate) mapping: Vec<[f64; 2]>,
    #[serde(rename = "valueLabels", default)]
    pub(crate) value_labels: Vec<AxisValueLabel>,
    pub(crate) values: Vec<f64>,
}

impl FontraAxis {
    fn to_axis(&self) -> Result<Axis, Error> {
        let axis = match self {
            FontraAxis::Continuous(a) => Axis {
                name: a.name.clone(),
                tag: a.tag,
                min: UserCoord::new(a.min_value),
                default: UserCoord::new(a.default_value),
                max: UserCoord::new(a.max_value),
                hidden: a.hidden,
                mapping: a.mapping.clone(),
                values: None,
                value_labels: a.value_labels.clone(),
            },
            FontraAxis::Discrete(a) => {
                let (min, max) = a.values.iter().fold(
                    (a.default_value, a.default_value),
                    |(min, max), v| (min.min(*v), max.max(*v)),
                );
                Axis {
                    name: a.name.clone(),
                    tag: a.tag,
                    min: UserCoord::new(min),
                    default: UserCoord::new(a.default_value),
                    max: UserCoord::new(max),
                    hidden: a.hidden,
                    mapping: a.mapping.clone(),
                    values: Some(a.values.clone()),
                    value_labels: a.value_labels.clone(),
                }
            }
        };
        axis.validate()?;
        Ok(axis)
    }
}

/// Reads a .fontra directory.
///
/// font-data.json and glyph-info.csv are read up front, glyph files on demand.
#[derive(Debug)]
pub struct FontraBackend {
    fontra_dir: PathBuf,
    glyph_dir: PathBuf,
    font_data: FontraFontData,
    glyph_info: BTreeMap<GlyphName, (PathBuf, Vec<u32>)>,
}

impl FontraBackend {
    pub fn new(fontra_dir: PathBuf) -> Result<Self, Error> {
        if !fontra_dir.is_dir() {
            return Err(Error::DirectoryExpected(fontra_dir));
        }
        let fontdata_file = fontra_dir.join("font-data.json");
        if !fontdata_file.is_file() {
            return Err(Error::FileExpected(fontdata_file));
        }
        let glyphinfo_file = fontra_dir.join("glyph-info.csv");
        if !glyphinfo_file.is_file() {
            return Err(Error::FileExpected(glyphinfo_file));
        }
        let glyph_dir = fontra_dir.join("glyphs");
        if !glyph_dir.is_dir() {
            return Err(Error::DirectoryExpected(glyph_dir));
        }
        debug!("Loading {fontra_dir:?}");
        let font_data = from_file(&fontdata_file)?;
        let glyph_info = load_glyphinfo(&glyphinfo_file, &glyph_dir)?;
        Ok(FontraBackend {
            fontra_dir,
            glyph_dir,
            font_data,
            glyph_info,
        })
    }

    pub fn path(&self) -> &Path {
        &self.fontra_dir
    }
}

fn load_glyphinfo(
    glyphinfo_file: &Path,
    glyph_dir: &Path,
) -> Result<BTreeMap<GlyphName, (PathBuf, Vec<u32>)>, Error> {
    let file = File::open(glyphinfo_file).map_err(|source| Error::FileIo {
        path: glyphinfo_file.to_path_buf(),
        source,
    })?;

    // Example files suggest the first line is just the column headers. Hopefully always :)
    // This file is tool generated so it shouldn't be full of human error. Fail if we don't understand.
    let mut glyph_info = BTreeMap::default();
    for (i, line) in BufReader::new(file).lines().enumerate().skip(1) {
        let line = line.map_err(|source| Error::FileIo {
            path: glyphinfo_file.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<_> = line.split(';').collect();
        if parts.len() != 2 {
            return Err(Error::ParseError(
                glyphinfo_file.to_path_buf(),
                format!("Expected two parts in line {i} separated by ;"),
            ));
        }
        let glyph_name = GlyphName::new(parts[0].trim());
        let codepoints = parts[1]
            .split(',')
            .filter_map(|codepoint| {
                let codepoint = codepoint.trim();
                if codepoint.is_empty() {
                    return None;
                }
                let Some(codepoint) = codepoint.strip_prefix("U+") else {
                    return Some(Err(Error::ParseError(
                        glyphinfo_file.to_path_buf(),
                        format!("Unintelligible codepoint {codepoint:?} at line {i}"),
                    )));
                };
                Some(u32::from_str_radix(codepoint, 16).map_err(|e| {
                    Error::ParseError(
                        glyphinfo_file.to_path_buf(),
                        format!("Unintelligible codepoint {codepoint:?} at line {i}: {e}"),
                    )
                }))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let glyph_file = glyph_file(glyph_dir, &glyph_name);
        if !glyph_file.is_file() {
            return Err(Error::FileExpected(glyph_file));
        }

        if glyph_info
            .insert(glyph_name.clone(), (glyph_file, codepoints))
            .is_some()
        {
            return Err(Error::ParseError(
                glyphinfo_file.to_path_buf(),
                format!("Multiple definitions of '{glyph_name}'"),
            ));
        }
    }
    Ok(glyph_info)
}

impl ReadableFontSource for FontraBackend {
    fn axes(&self) -> Result<Vec<Axis>, Error> {
        self.font_data
            .axes
            .axes()
            .iter()
            .map(FontraAxis::to_axis)
            .collect()
    }

    fn sources(&self) -> Result<IndexMap<String, FontSource>, Error> {
        Ok(self.font_data.sources.clone())
    }

    fn glyph_map(&self) -> Result<BTreeMap<GlyphName, Vec<u32>>, Error> {
        Ok(self
            .glyph_info
            .iter()
            .map(|(name, (_, codepoints))| (name.clone(), codepoints.clone()))
            .collect())
    }

    fn glyph(&self, name: &GlyphName) -> Result<Option<VariableGlyph>, Error> {
        let Some((glyph_file, _)) = self.glyph_info.get(name) else {
            return Ok(None);
        };
        let glyph: VariableGlyph = from_file(glyph_file)?;
        if glyph.name != *name {
            return Err(Error::ParseError(
                glyph_file.clone(),
                format!("Expected a glyph named '{name}', found '{}'", glyph.name),
            ));
        }
        Ok(Some(glyph))
    }

    fn units_per_em(&self) -> Result<u16, Error> {
        Ok(self.font_data.units_per_em)
    }

    fn font_info(&self) -> Result<FontInfo, Error> {
        Ok(self.font_data.font_info.clone())
    }

    fn custom_data(&self) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
        Ok(self.font_data.custom_data.clone())
    }
}
