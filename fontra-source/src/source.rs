//! The read interface every font source backend provides.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    axis::Axis, coords::DesignLocation, error::Error, glyph::VariableGlyph, types::GlyphName,
};

/// Read access to a font source, independent of how it is stored.
///
/// Implementations are expected to be cheap to query repeatedly; callers
/// generally ask for axes and sources once and glyphs one at a time.
pub trait ReadableFontSource {
    fn axes(&self) -> Result<Vec<Axis>, Error>;

    /// Font-level sources (masters) keyed by identifier
    fn sources(&self) -> Result<IndexMap<String, FontSource>, Error>;

    /// Every glyph name and its codepoints
    fn glyph_map(&self) -> Result<BTreeMap<GlyphName, Vec<u32>>, Error>;

    /// `Ok(None)` if there is no such glyph
    fn glyph(&self, name: &GlyphName) -> Result<Option<VariableGlyph>, Error>;

    fn units_per_em(&self) -> Result<u16, Error>;

    fn font_info(&self) -> Result<FontInfo, Error>;

    /// Arbitrary library data, e.g. `public.glyphOrder`
    fn custom_data(&self) -> Result<serde_json::Map<String, serde_json::Value>, Error>;
}

impl<S: ReadableFontSource + ?Sized> ReadableFontSource for &S {
    fn axes(&self) -> Result<Vec<Axis>, Error> {
        (**self).axes()
    }

    fn sources(&self) -> Result<IndexMap<String, FontSource>, Error> {
        (**self).sources()
    }

    fn glyph_map(&self) -> Result<BTreeMap<GlyphName, Vec<u32>>, Error> {
        (**self).glyph_map()
    }

    fn glyph(&self, name: &GlyphName) -> Result<Option<VariableGlyph>, Error> {
        (**self).glyph(name)
    }

    fn units_per_em(&self) -> Result<u16, Error> {
        (**self).units_per_em()
    }

    fn font_info(&self) -> Result<FontInfo, Error> {
        (**self).font_info()
    }

    fn custom_data(&self) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
        (**self).custom_data()
    }
}

impl<S: ReadableFontSource + ?Sized> ReadableFontSource for Box<S> {
    fn axes(&self) -> Result<Vec<Axis>, Error> {
        (**self).axes()
    }

    fn sources(&self) -> Result<IndexMap<String, FontSource>, Error> {
        (**self).sources()
    }

    fn glyph_map(&self) -> Result<BTreeMap<GlyphName, Vec<u32>>, Error> {
        (**self).glyph_map()
    }

    fn glyph(&self, name: &GlyphName) -> Result<Option<VariableGlyph>, Error> {
        (**self).glyph(name)
    }

    fn units_per_em(&self) -> Result<u16, Error> {
        (**self).units_per_em()
    }

    fn font_info(&self) -> Result<FontInfo, Error> {
        (**self).font_info()
    }

    fn custom_data(&self) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
        (**self).custom_data()
    }
}

/// A font-level source, what a designspace calls a source and others call a master.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontSource {
    pub name: String,
    /// Design space
    #[serde(default)]
    pub location: DesignLocation,
    #[serde(rename = "isSparse", default)]
    pub is_sparse: bool,
    #[serde(rename = "lineMetricsHorizontalLayout", default)]
    pub line_metrics: BTreeMap<String, LineMetric>,
}

impl FontSource {
    pub fn new(name: impl Into<String>, location: DesignLocation) -> FontSource {
        FontSource {
            name: name.into(),
            location,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineMetric {
    pub value: f64,
    #[serde(default)]
    pub zone: f64,
}

/// Naming and versioning metadata.
///
/// Field names follow Fontra's `FontInfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontInfo {
    pub family_name: Option<String>,
    pub version_major: Option<i64>,
    pub version_minor: Option<i64>,
    pub copyright: Option<String>,
    pub trademark: Option<String>,
    pub description: Option<String>,
    pub sample_text: Option<String>,
    pub designer: Option<String>,
    #[serde(rename = "designerURL")]
    pub designer_url: Option<String>,
    pub manufacturer: Option<String>,
    #[serde(rename = "manufacturerURL")]
    pub manufacturer_url: Option<String>,
    pub license_description: Option<String>,
    #[serde(rename = "licenseInfoURL")]
    pub license_info_url: Option<String>,
    #[serde(rename = "vendorID")]
    pub vendor_id: Option<String>,
}

/// A font held entirely in memory.
///
/// Useful for tests and for embedders that build sources programmatically.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFont {
    pub units_per_em: u16,
    pub axes: Vec<Axis>,
    pub sources: IndexMap<String, FontSource>,
    pub glyphs: BTreeMap<GlyphName, (Vec<u32>, VariableGlyph)>,
    pub font_info: FontInfo,
    pub custom_data: serde_json::Map<String, serde_json::Value>,
}

impl InMemoryFont {
    pub fn new(units_per_em: u16) -> InMemoryFont {
        InMemoryFont {
            units_per_em,
            ..Default::default()
        }
    }

    pub fn add_glyph(&mut self, codepoints: Vec<u32>, glyph: VariableGlyph) -> &mut Self {
        self.glyphs.insert(glyph.name.clone(), (codepoints, glyph));
        self
    }

    /// Copy everything a source exposes into memory.
    pub fn read_from(source: &dyn ReadableFontSource) -> Result<InMemoryFont, Error> {
        let mut glyphs = BTreeMap::new();
        for (name, codepoints) in source.glyph_map()? {
            let glyph = source.glyph(&name)?.ok_or_else(|| Error::NoGlyph(name.clone()))?;
            glyphs.insert(name, (codepoints, glyph));
        }
        Ok(InMemoryFont {
            units_per_em: source.units_per_em()?,
            axes: source.axes()?,
            sources: source.sources()?,
            glyphs,
            font_info: source.font_info()?,
            custom_data: source.custom_data()?,
        })
    }
}

impl ReadableFontSource for InMemoryFont {
    fn axes(&self) -> Result<Vec<Axis>, Error> {
        Ok(self.axes.clone())
    }

    fn sources(&self) -> Result<IndexMap<String, FontSource>, Error> {
        Ok(self.sources.clone())
    }

    fn glyph_map(&self) -> Result<BTreeMap<GlyphName, Vec<u32>>, Error> {
        Ok(self
            .glyphs
            .iter()
            .map(|(name, (codepoints, _))| (name.clone(), codepoints.clone()))
            .collect())
    }

    fn glyph(&self, name: &GlyphName) -> Result<Option<VariableGlyph>, Error> {
        Ok(self.glyphs.get(name).map(|(_, glyph)| glyph.clone()))
    }

    fn units_per_em(&self) -> Result<u16, Error> {
        Ok(self.units_per_em)
    }

    fn font_info(&self) -> Result<FontInfo, Error> {
        Ok(self.font_info.clone())
    }

    fn custom_data(&self) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
        Ok(self.custom_data.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::glyph::{GlyphSource, Layer, StaticGlyph};

    use super::*;

    fn glyph(name: &str) -> VariableGlyph {
        VariableGlyph {
            name: name.into(),
            axes: Vec::new(),
            sources: vec![GlyphSource::new("default", "foreground")],
            layers: BTreeMap::from([(
                "foreground".to_string(),
                Layer {
                    glyph: StaticGlyph {
                        x_advance: 500.0,
                        ..Default::default()
                    },
                },
            )]),
        }
    }

    #[test]
    fn in_memory_round_trip_through_trait() {
        let mut font = InMemoryFont::new(1000);
        font.add_glyph(vec![0x41], glyph("A"))
            .add_glyph(vec![], glyph(".notdef"));

        let copy = InMemoryFont::read_from(&font).unwrap();
        assert_eq!(
            vec![(GlyphName::NOTDEF, vec![]), ("A".into(), vec![0x41])],
            copy.glyph_map().unwrap().into_iter().collect::<Vec<_>>()
        );
        assert_eq!(1000, copy.units_per_em().unwrap());
        assert!(copy.glyph(&"B".into()).unwrap().is_none());
    }

    #[test]
    fn font_info_uses_fontra_names() {
        let info: FontInfo = serde_json::from_str(
            r#"{"familyName": "Mutator Sans", "versionMajor": 1, "designerURL": "https://example.com"}"#,
        )
        .unwrap();
        assert_eq!(Some("Mutator Sans".to_string()), info.family_name);
        assert_eq!(Some(1), info.version_major);
        assert_eq!(Some("https://example.com".to_string()), info.designer_url);
    }
}
