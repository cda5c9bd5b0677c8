//! Generates a [name](https://learn.microsoft.com/en-us/typography/opentype/spec/name) table.

use fontra_source::source::FontInfo;
use write_fonts::{
    tables::name::{Name, NameRecord},
    types::NameId,
    OffsetMarker,
};

use crate::fvar::{FvarAxis, FIRST_AXIS_NAME_ID};

const WINDOWS: u16 = 3;
const UNICODE_BMP: u16 = 1;
const ENGLISH_US: u16 = 0x409;

const DEFAULT_FAMILY: &str = "Untitled";
const DEFAULT_STYLE: &str = "Regular";

/// "Version 1.002" for major 1, minor 2
pub fn version_string(info: &FontInfo) -> String {
    format!(
        "Version {}.{:03}",
        info.version_major.unwrap_or(1),
        info.version_minor.unwrap_or_default()
    )
}

/// Family, style, version and whatever else the font info has, then axis names.
pub fn build_name(info: &FontInfo, axes: &[FvarAxis]) -> Name {
    let family = info
        .family_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_FAMILY);
    let full_name = format!("{family} {DEFAULT_STYLE}");
    let postscript_name: String = format!("{family}-{DEFAULT_STYLE}")
        .chars()
        .filter(|c| c.is_ascii_graphic() && !"[](){}<>/%".contains(*c))
        .collect();
    let version = version_string(info);

    let mut entries: Vec<(u16, String)> = vec![
        (1, family.to_string()),
        (2, DEFAULT_STYLE.to_string()),
        (3, format!("{version};{postscript_name}")),
        (4, full_name),
        (5, version),
        (6, postscript_name),
    ];
    let optional = [
        (0, &info.copyright),
        (7, &info.trademark),
        (8, &info.manufacturer),
        (9, &info.designer),
        (10, &info.description),
        (11, &info.manufacturer_url),
        (12, &info.designer_url),
        (13, &info.license_description),
        (14, &info.license_info_url),
    ];
    entries.extend(
        optional
            .into_iter()
            .filter_map(|(id, value)| value.as_ref().map(|v| (id, v.clone())))
            .filter(|(_, v)| !v.is_empty()),
    );
    entries.extend(
        axes.iter()
            .enumerate()
            .map(|(i, axis)| (FIRST_AXIS_NAME_ID + i as u16, axis.name.clone())),
    );
    entries.sort_by_key(|(id, _)| *id);

    let records = entries
        .into_iter()
        .map(|(id, value)| NameRecord {
            name_id: NameId::new(id),
            platform_id: WINDOWS,
            encoding_id: UNICODE_BMP,
            language_id: ENGLISH_US,
            string: OffsetMarker::new(value),
        })
        .collect();
    Name::new(records)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use write_fonts::types::Tag;

    use super::*;

    fn strings(name: &Name) -> Vec<(u16, String)> {
        name.name_record
            .iter()
            .map(|r| (r.name_id.to_u16(), r.string.as_str().to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_font_info() {
        let name = build_name(&FontInfo::default(), &[]);
        assert_eq!(
            vec![
                (1, "Untitled".to_string()),
                (2, "Regular".to_string()),
                (3, "Version 1.000;Untitled-Regular".to_string()),
                (4, "Untitled Regular".to_string()),
                (5, "Version 1.000".to_string()),
                (6, "Untitled-Regular".to_string()),
            ],
            strings(&name)
        );
    }

    #[test]
    fn font_info_and_axes() {
        let info = FontInfo {
            family_name: Some("Mutator Sans".to_string()),
            version_major: Some(2),
            version_minor: Some(5),
            copyright: Some("(c) Someone".to_string()),
            designer: Some("".to_string()),
            ..Default::default()
        };
        let axes = [FvarAxis::local(Tag::new(b"V000"))];
        let name = strings(&build_name(&info, &axes));
        assert_eq!((0, "(c) Someone".to_string()), name[0]);
        assert!(name.contains(&(5, "Version 2.005".to_string())));
        assert!(name.contains(&(6, "MutatorSans-Regular".to_string())));
        assert!(!name.iter().any(|(id, _)| *id == 9), "empty designer is skipped");
        assert_eq!(Some(&(256, "V000".to_string())), name.last());
    }
}
