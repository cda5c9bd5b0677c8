//! Reads and writes the designspace 5 documents the external compilers consume.
//!
//! Only the parts the pipeline produces or edits are modelled: axes (with
//! mappings and labels), sources and instances. See
//! <https://fonttools.readthedocs.io/en/latest/designspaceLib/xml.html>

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use fontra_source::{
    axis::{Axis, AxisValueLabel},
    coords::{DesignCoord, DesignLocation},
};
use log::debug;
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, Event},
    Reader, Writer,
};
use write_fonts::types::Tag;

use crate::error::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesignSpaceDocument {
    pub axes: Vec<DsAxis>,
    /// Style name for an instance whose labels are all elided
    pub elided_fallback_name: Option<String>,
    pub sources: Vec<DsSource>,
    pub instances: Vec<DsInstance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DsAxis {
    pub name: String,
    pub tag: Tag,
    /// User space
    pub minimum: f64,
    pub default: f64,
    pub maximum: f64,
    pub hidden: bool,
    /// Set for discrete axes
    pub values: Option<Vec<f64>>,
    /// (input/user, output/design)
    pub map: Vec<(f64, f64)>,
    pub labels: Vec<DsAxisLabel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DsAxisLabel {
    pub name: String,
    pub user_value: f64,
    pub elidable: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DsSource {
    pub name: String,
    /// Relative to the designspace file
    pub filename: String,
    pub layer: Option<String>,
    pub style_name: Option<String>,
    pub location: DesignLocation,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DsInstance {
    pub name: Option<String>,
    pub family_name: String,
    pub style_name: String,
    pub location: DesignLocation,
}

impl From<&Axis> for DsAxis {
    fn from(axis: &Axis) -> Self {
        DsAxis {
            name: axis.name.clone(),
            tag: axis.tag,
            minimum: axis.min.to_f64(),
            default: axis.default.to_f64(),
            maximum: axis.max.to_f64(),
            hidden: axis.hidden,
            values: axis.values.clone(),
            map: axis.mapping.iter().map(|[u, d]| (*u, *d)).collect(),
            labels: axis
                .value_labels
                .iter()
                .map(|l| DsAxisLabel {
                    name: l.name.clone(),
                    user_value: l.value,
                    elidable: l.elidable,
                })
                .collect(),
        }
    }
}

impl DsAxis {
    /// The axis with unit conversion and labels, as the source model has it.
    pub fn to_axis(&self) -> Axis {
        let mut axis = Axis::new(
            self.name.clone(),
            self.tag,
            self.minimum,
            self.default,
            self.maximum,
        )
        .with_mapping(self.map.iter().map(|(u, d)| [*u, *d]).collect())
        .with_labels(
            self.labels
                .iter()
                .map(|l| AxisValueLabel::new(l.name.clone(), l.user_value, l.elidable))
                .collect(),
        );
        axis.hidden = self.hidden;
        axis.values = self.values.clone();
        axis
    }
}

impl DesignSpaceDocument {
    pub fn load(path: &Path) -> Result<DesignSpaceDocument, Error> {
        let xml = fs::read_to_string(path).map_err(|source| Error::FileIo {
            path: path.to_path_buf(),
            source,
        })?;
        let root = parse_xml(&xml).map_err(|e| Error::ParseError(path.to_path_buf(), e))?;
        DesignSpaceDocument::from_element(&root)
            .map_err(|e| Error::ParseError(path.to_path_buf(), e))
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let xml = write_xml(&self.to_element())
            .map_err(|e| Error::WriteError(path.to_path_buf(), e))?;
        debug!("Write {path:?}");
        fs::write(path, xml).map_err(|source| Error::FileIo {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Where every axis is at its default, in design space
    pub fn default_location(&self) -> DesignLocation {
        self.axes
            .iter()
            .map(|a| (a.name.clone(), a.to_axis().default_design()))
            .collect()
    }

    /// The source at the default location
    pub fn find_default(&self) -> Option<&DsSource> {
        let default = self.default_location();
        self.sources
            .iter()
            .find(|s| s.location.with_defaults(&default) == default && s.layer.is_none())
            .or_else(|| {
                self.sources
                    .iter()
                    .find(|s| s.location.with_defaults(&default) == default)
            })
    }

    /// Resolve a source's filename relative to the document
    pub fn source_path(designspace_file: &Path, source: &DsSource) -> PathBuf {
        designspace_file
            .parent()
            .unwrap_or(Path::new(""))
            .join(&source.filename)
    }

    fn from_element(root: &Element) -> Result<DesignSpaceDocument, String> {
        if root.name != "designspace" {
            return Err(format!("Expected <designspace>, got <{}>", root.name));
        }
        let mut doc = DesignSpaceDocument::default();
        if let Some(axes) = root.child("axes") {
            doc.elided_fallback_name = axes.attr("elidedfallbackname").map(str::to_string);
            for axis in axes.children_named("axis") {
                doc.axes.push(parse_axis(axis)?);
            }
        }
        if let Some(sources) = root.child("sources") {
            for (i, source) in sources.children_named("source").enumerate() {
                doc.sources.push(DsSource {
                    name: source
                        .attr("name")
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("source{i}")),
                    filename: source.required_attr("filename")?.to_string(),
                    layer: source.attr("layer").map(str::to_string),
                    style_name: source.attr("stylename").map(str::to_string),
                    location: parse_location(source)?,
                });
            }
        }
        if let Some(instances) = root.child("instances") {
            for instance in instances.children_named("instance") {
                doc.instances.push(DsInstance {
                    name: instance.attr("name").map(str::to_string),
                    family_name: instance.attr("familyname").unwrap_or_default().to_string(),
                    style_name: instance.attr("stylename").unwrap_or_default().to_string(),
                    location: parse_location(instance)?,
                });
            }
        }
        Ok(doc)
    }

    fn to_element(&self) -> Element {
        let mut root = Element::new("designspace").with_attr("format", "5.0");

        let mut axes = Element::new("axes");
        if let Some(name) = &self.elided_fallback_name {
            axes.attrs
                .push(("elidedfallbackname".to_string(), name.clone()));
        }
        for axis in self.axes.iter() {
            axes.children.push(axis_element(axis));
        }
        root.children.push(axes);

        let mut sources = Element::new("sources");
        for source in self.sources.iter() {
            let mut el = Element::new("source")
                .with_attr("filename", &source.filename)
                .with_attr("name", &source.name);
            if let Some(style_name) = &source.style_name {
                el = el.with_attr("stylename", style_name);
            }
            if let Some(layer) = &source.layer {
                el = el.with_attr("layer", layer);
            }
            el.children.push(location_element(&source.location));
            sources.children.push(el);
        }
        root.children.push(sources);

        if !self.instances.is_empty() {
            let mut instances = Element::new("instances");
            for instance in self.instances.iter() {
                let mut el = Element::new("instance");
                if let Some(name) = &instance.name {
                    el = el.with_attr("name", name);
                }
                el = el
                    .with_attr("familyname", &instance.family_name)
                    .with_attr("stylename", &instance.style_name);
                el.children.push(location_element(&instance.location));
                instances.children.push(el);
            }
            root.children.push(instances);
        }
        root
    }
}

fn parse_f64(el: &Element, attr: &str) -> Result<f64, String> {
    let raw = el.required_attr(attr)?;
    f64::from_str(raw).map_err(|e| format!("<{} {attr}=\"{raw}\">: {e}", el.name))
}

fn parse_axis(el: &Element) -> Result<DsAxis, String> {
    let name = el.required_attr("name")?.to_string();
    let tag = el.required_attr("tag")?;
    let tag = Tag::new_checked(tag.as_bytes()).map_err(|e| format!("Bad tag {tag:?}: {e}"))?;
    let default = parse_f64(el, "default")?;
    let values = el
        .attr("values")
        .map(|raw| {
            raw.split_whitespace()
                .map(|v| f64::from_str(v).map_err(|e| format!("Bad value {v:?}: {e}")))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;
    let (minimum, maximum) = match &values {
        Some(values) => values
            .iter()
            .fold((default, default), |(lo, hi), v| (lo.min(*v), hi.max(*v))),
        None => (parse_f64(el, "minimum")?, parse_f64(el, "maximum")?),
    };
    let map = el
        .children_named("map")
        .map(|m| Ok::<_, String>((parse_f64(m, "input")?, parse_f64(m, "output")?)))
        .collect::<Result<Vec<_>, String>>()?;
    let labels = el
        .child("labels")
        .map(|labels| {
            labels
                .children_named("label")
                .map(|l| {
                    Ok::<_, String>(DsAxisLabel {
                        name: l.required_attr("name")?.to_string(),
                        user_value: parse_f64(l, "uservalue")?,
                        elidable: l.attr("elidable") == Some("true"),
                    })
                })
                .collect::<Result<Vec<_>, String>>()
        })
        .transpose()?
        .unwrap_or_default();
    Ok(DsAxis {
        name,
        tag,
        minimum,
        default,
        maximum,
        hidden: el.attr("hidden") == Some("1"),
        values,
        map,
        labels,
    })
}

fn parse_location(el: &Element) -> Result<DesignLocation, String> {
    let Some(location) = el.child("location") else {
        return Ok(DesignLocation::new());
    };
    location
        .children_named("dimension")
        .map(|d| {
            Ok::<_, String>((
                d.required_attr("name")?.to_string(),
                DesignCoord::new(parse_f64(d, "xvalue")?),
            ))
        })
        .collect()
}

/// Shortest text that reads back as the same number, "400" rather than "400.0"
fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn axis_element(axis: &DsAxis) -> Element {
    let mut el = Element::new("axis")
        .with_attr("tag", &axis.tag.to_string())
        .with_attr("name", &axis.name);
    match &axis.values {
        Some(values) => {
            el = el.with_attr(
                "values",
                &values.iter().map(|v| fmt_num(*v)).collect::<Vec<_>>().join(" "),
            );
        }
        None => {
            el = el
                .with_attr("minimum", &fmt_num(axis.minimum))
                .with_attr("maximum", &fmt_num(axis.maximum));
        }
    }
    el = el.with_attr("default", &fmt_num(axis.default));
    if axis.hidden {
        el = el.with_attr("hidden", "1");
    }
    for (input, output) in axis.map.iter() {
        el.children.push(
            Element::new("map")
                .with_attr("input", &fmt_num(*input))
                .with_attr("output", &fmt_num(*output)),
        );
    }
    if !axis.labels.is_empty() {
        let mut labels = Element::new("labels");
        for label in axis.labels.iter() {
            let mut l = Element::new("label")
                .with_attr("uservalue", &fmt_num(label.user_value))
                .with_attr("name", &label.name);
            if label.elidable {
                l = l.with_attr("elidable", "true");
            }
            labels.children.push(l);
        }
        el.children.push(labels);
    }
    el
}

fn location_element(location: &DesignLocation) -> Element {
    let mut el = Element::new("location");
    for (name, pos) in location.iter() {
        el.children.push(
            Element::new("dimension")
                .with_attr("name", name)
                .with_attr("xvalue", &fmt_num(pos.to_f64())),
        );
    }
    el
}

/// Just enough of an xml tree to walk designspace files.
#[derive(Debug, Clone, Default, PartialEq)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn new(name: &str) -> Element {
        Element {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn with_attr(mut self, key: &str, value: &str) -> Element {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn required_attr(&self, key: &str) -> Result<&str, String> {
        self.attr(key)
            .ok_or_else(|| format!("<{}> is missing '{key}'", self.name))
    }

    fn child<'a>(&'a self, name: &'a str) -> Option<&'a Element> {
        self.children_named(name).next()
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn element_from(start: &BytesStart) -> Result<Element, String> {
    let mut el = Element::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| format!("{e}"))?;
        let value = attr.unescape_value().map_err(|e| format!("{e}"))?;
        el.attrs.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(el)
}

fn parse_xml(xml: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(xml);
    // open elements, innermost last
    let mut stack: Vec<Element> = Vec::new();
    loop {
        match reader.read_event().map_err(|e| format!("{e}"))? {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let el = element_from(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => return Ok(el),
                }
            }
            Event::End(_) => {
                let Some(el) = stack.pop() else {
                    return Err("Unbalanced end tag".to_string());
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => return Ok(el),
                }
            }
            Event::Eof => return Err("No root element".to_string()),
            // text, comments, the declaration and so on carry nothing we use
            _ => (),
        }
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<(), String> {
    let start = BytesStart::new(el.name.as_str())
        .with_attributes(el.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    if el.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| format!("{e}"))?;
        return Ok(());
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| format!("{e}"))?;
    for child in el.children.iter() {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(|e| format!("{e}"))?;
    Ok(())
}

fn write_xml(root: &Element) -> Result<String, String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| format!("{e}"))?;
    write_element(&mut writer, root)?;
    let mut xml = String::from_utf8(writer.into_inner()).map_err(|e| format!("{e}"))?;
    xml.push('\n');
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    const MUTATOR: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<designspace format="5.0">
  <axes elidedfallbackname="Regular">
    <axis tag="wght" name="Weight" minimum="400" maximum="900" default="400">
      <map input="400" output="0"/>
      <map input="900" output="1000"/>
      <labels>
        <label uservalue="400" name="Regular" elidable="true"/>
        <label uservalue="700" name="Bold"/>
      </labels>
    </axis>
    <axis tag="ital" name="Italic" values="0 1" default="0"/>
  </axes>
  <sources>
    <source filename="Light.ufo" name="light">
      <location>
        <dimension name="Weight" xvalue="0"/>
      </location>
    </source>
    <source filename="Bold.ufo" name="bold">
      <location>
        <dimension name="Weight" xvalue="1000"/>
      </location>
    </source>
    <source filename="Light.ufo" name="light-mid" layer="mid">
      <location>
        <dimension name="Weight" xvalue="500"/>
      </location>
    </source>
  </sources>
</designspace>
"#;

    fn loc(pairs: &[(&str, f64)]) -> DesignLocation {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), DesignCoord::new(*v)))
            .collect()
    }

    fn mutator() -> DesignSpaceDocument {
        let dir = tempdir().unwrap();
        let file = dir.path().join("test.designspace");
        fs::write(&file, MUTATOR).unwrap();
        DesignSpaceDocument::load(&file).unwrap()
    }

    #[test]
    fn read_axes() {
        let doc = mutator();
        assert_eq!(Some("Regular".to_string()), doc.elided_fallback_name);
        assert_eq!(
            vec![
                ("Weight", 400.0, 400.0, 900.0, None),
                ("Italic", 0.0, 0.0, 1.0, Some(vec![0.0, 1.0])),
            ],
            doc.axes
                .iter()
                .map(|a| (
                    a.name.as_str(),
                    a.minimum,
                    a.default,
                    a.maximum,
                    a.values.clone()
                ))
                .collect::<Vec<_>>()
        );
        assert_eq!(vec![(400.0, 0.0), (900.0, 1000.0)], doc.axes[0].map);
        assert_eq!(
            vec![
                DsAxisLabel {
                    name: "Regular".to_string(),
                    user_value: 400.0,
                    elidable: true
                },
                DsAxisLabel {
                    name: "Bold".to_string(),
                    user_value: 700.0,
                    elidable: false
                },
            ],
            doc.axes[0].labels
        );
    }

    #[test]
    fn read_sources() {
        let doc = mutator();
        assert_eq!(
            vec![
                ("light", None, loc(&[("Weight", 0.0)])),
                ("bold", None, loc(&[("Weight", 1000.0)])),
                ("light-mid", Some("mid"), loc(&[("Weight", 500.0)])),
            ],
            doc.sources
                .iter()
                .map(|s| (s.name.as_str(), s.layer.as_deref(), s.location.clone()))
                .collect::<Vec<_>>()
        );
        assert!(doc.instances.is_empty());
    }

    #[test]
    fn default_source() {
        let doc = mutator();
        assert_eq!(
            loc(&[("Weight", 0.0), ("Italic", 0.0)]),
            doc.default_location()
        );
        assert_eq!("light", doc.find_default().unwrap().name);
    }

    #[test]
    fn save_and_load() {
        let mut doc = mutator();
        doc.instances.push(DsInstance {
            name: None,
            family_name: "Mutator & Sons".to_string(),
            style_name: "Bold".to_string(),
            location: loc(&[("Weight", 600.0), ("Italic", 0.0)]),
        });
        let dir = tempdir().unwrap();
        let file = dir.path().join("saved.designspace");
        doc.save(&file).unwrap();
        assert_eq!(doc, DesignSpaceDocument::load(&file).unwrap());
    }

    #[test]
    fn writes_integers_plainly() {
        assert_eq!("400", fmt_num(400.0));
        assert_eq!("-12.5", fmt_num(-12.5));
    }

    #[test]
    fn not_a_designspace() {
        assert!(parse_xml("<plist/>")
            .and_then(|root| DesignSpaceDocument::from_element(&root))
            .is_err());
    }
}
