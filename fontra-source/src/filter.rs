//! Filters wrap a [`ReadableFontSource`] and present a modified view of it.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, HashSet},
};

use indexmap::IndexMap;
use log::{debug, trace};

use crate::{
    axis::{default_location, Axis},
    coords::{DesignCoord, DesignLocation},
    error::Error,
    glyph::VariableGlyph,
    source::{FontInfo, FontSource, ReadableFontSource},
    types::GlyphName,
};

/// Drops whatever nothing can reach.
///
/// Layers no glyph source draws from are removed from each glyph. Font sources
/// survive only if they sit at the default location, are named as the
/// `location_base` of some glyph source, or coincide with the location of some
/// glyph source.
///
/// Finding the used sources reads every glyph; those glyphs are kept and
/// served by [`ReadableFontSource::glyph`] rather than read again.
#[derive(Debug)]
pub struct DropUnusedSourcesAndLayers<S> {
    inner: S,
    glyphs: RefCell<HashMap<GlyphName, Option<VariableGlyph>>>,
}

impl<S: ReadableFontSource> DropUnusedSourcesAndLayers<S> {
    pub fn new(inner: S) -> Self {
        DropUnusedSourcesAndLayers {
            inner,
            glyphs: Default::default(),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn inner_glyph(&self, name: &GlyphName) -> Result<Option<VariableGlyph>, Error> {
        if let Some(glyph) = self.glyphs.borrow().get(name) {
            return Ok(glyph.clone());
        }
        let glyph = self.inner.glyph(name)?;
        self.glyphs.borrow_mut().insert(name.clone(), glyph.clone());
        Ok(glyph)
    }
}

/// Restrict a location to the global axes and fill in the defaults for the rest.
fn global_location(
    location: &DesignLocation,
    defaults: &DesignLocation,
    glyph: Option<&VariableGlyph>,
) -> DesignLocation {
    location
        .iter()
        .filter(|(name, _)| defaults.contains(name))
        .filter(|(name, _)| !glyph.is_some_and(|g| g.is_local_axis(name)))
        .map(|(name, pos)| (name.clone(), *pos))
        .collect::<DesignLocation>()
        .with_defaults(defaults)
}

fn drop_unreferenced_layers(glyph: &mut VariableGlyph) {
    let used: HashSet<_> = glyph.sources.iter().map(|s| s.layer_name.clone()).collect();
    let before = glyph.layers.len();
    glyph.layers.retain(|name, _| used.contains(name));
    if glyph.layers.len() != before {
        trace!(
            "{}: dropped {} unused layers",
            glyph.name,
            before - glyph.layers.len()
        );
    }
}

impl<S: ReadableFontSource> ReadableFontSource for DropUnusedSourcesAndLayers<S> {
    fn axes(&self) -> Result<Vec<Axis>, Error> {
        self.inner.axes()
    }

    fn sources(&self) -> Result<IndexMap<String, FontSource>, Error> {
        let defaults = default_location(&self.inner.axes()?);

        let mut bases = HashSet::new();
        let mut locations = HashSet::new();
        locations.insert(defaults.clone());
        for name in self.inner.glyph_map()?.keys() {
            let Some(glyph) = self.inner_glyph(name)? else {
                continue;
            };
            for source in glyph.sources.iter() {
                if let Some(base) = &source.location_base {
                    bases.insert(base.clone());
                }
                locations.insert(global_location(&source.location, &defaults, Some(&glyph)));
            }
        }

        let mut sources = self.inner.sources()?;
        sources.retain(|id, source| {
            let keep = bases.contains(id)
                || locations.contains(&global_location(&source.location, &defaults, None));
            if !keep {
                debug!("Dropping unused font source '{id}' ({})", source.name);
            }
            keep
        });
        Ok(sources)
    }

    fn glyph_map(&self) -> Result<BTreeMap<GlyphName, Vec<u32>>, Error> {
        self.inner.glyph_map()
    }

    fn glyph(&self, name: &GlyphName) -> Result<Option<VariableGlyph>, Error> {
        let Some(mut glyph) = self.inner_glyph(name)? else {
            return Ok(None);
        };
        drop_unreferenced_layers(&mut glyph);
        Ok(Some(glyph))
    }

    fn units_per_em(&self) -> Result<u16, Error> {
        self.inner.units_per_em()
    }

    fn font_info(&self) -> Result<FontInfo, Error> {
        self.inner.font_info()
    }

    fn custom_data(&self) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
        self.inner.custom_data()
    }
}

/// Keeps only the named axes, instancing the others at their default.
///
/// Sources off the default of a dropped axis are removed. An empty list of
/// axis names makes a variable source static.
#[derive(Debug)]
pub struct SubsetAxes<S> {
    inner: S,
    /// Design space default of each axis we drop
    dropped: BTreeMap<String, DesignCoord>,
}

impl<S: ReadableFontSource> SubsetAxes<S> {
    pub fn new(inner: S, axis_names: &[String]) -> Result<Self, Error> {
        let axes = inner.axes()?;
        if let Some(unknown) = axis_names
            .iter()
            .find(|name| !axes.iter().any(|a| &a.name == *name))
        {
            return Err(Error::UnknownAxis(unknown.clone()));
        }
        let dropped: BTreeMap<_, _> = axes
            .iter()
            .filter(|a| !axis_names.contains(&a.name))
            .map(|a| (a.name.clone(), a.default_design()))
            .collect();
        debug!("Subsetting axes, dropping {dropped:?}");
        Ok(SubsetAxes { inner, dropped })
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// `None` if the location is off the default of a dropped axis.
    fn subset_location(&self, location: &DesignLocation) -> Option<DesignLocation> {
        let mut location = location.clone();
        for (name, default) in self.dropped.iter() {
            match location.remove(name) {
                Some(pos) if pos != *default => return None,
                _ => (),
            }
        }
        Some(location)
    }
}

impl<S: ReadableFontSource> ReadableFontSource for SubsetAxes<S> {
    fn axes(&self) -> Result<Vec<Axis>, Error> {
        Ok(self
            .inner
            .axes()?
            .into_iter()
            .filter(|a| !self.dropped.contains_key(&a.name))
            .collect())
    }

    fn sources(&self) -> Result<IndexMap<String, FontSource>, Error> {
        Ok(self
            .inner
            .sources()?
            .into_iter()
            .filter_map(|(id, mut source)| {
                let location = self.subset_location(&source.location)?;
                source.location = location;
                Some((id, source))
            })
            .collect())
    }

    fn glyph_map(&self) -> Result<BTreeMap<GlyphName, Vec<u32>>, Error> {
        self.inner.glyph_map()
    }

    fn glyph(&self, name: &GlyphName) -> Result<Option<VariableGlyph>, Error> {
        let Some(mut glyph) = self.inner.glyph(name)? else {
            return Ok(None);
        };
        let sources = std::mem::take(&mut glyph.sources);
        glyph.sources = sources
            .into_iter()
            .filter_map(|mut source| {
                // glyph-local axes shadow global ones of the same name
                let mut location = source.location.clone();
                let local: Vec<_> = location
                    .iter()
                    .filter(|(n, _)| glyph.is_local_axis(n))
                    .map(|(n, p)| (n.clone(), *p))
                    .collect();
                for (n, _) in local.iter() {
                    location.remove(n);
                }
                let mut location = self.subset_location(&location)?;
                for (n, p) in local {
                    location.insert(n, p);
                }
                source.location = location;
                Some(source)
            })
            .collect();
        drop_unreferenced_layers(&mut glyph);
        Ok(Some(glyph))
    }

    fn units_per_em(&self) -> Result<u16, Error> {
        self.inner.units_per_em()
    }

    fn font_info(&self) -> Result<FontInfo, Error> {
        self.inner.font_info()
    }

    fn custom_data(&self) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
        self.inner.custom_data()
    }
}
