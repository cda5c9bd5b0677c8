//! Generates a [OS/2](https://learn.microsoft.com/en-us/typography/opentype/spec/os2) table.

use fontra_source::source::FontSource;
use write_fonts::{
    tables::os2::{Os2, SelectionFlags},
    types::Tag,
    OtRound,
};

const FALLBACK_VENDOR: Tag = Tag::new(b"NONE");

/// What OS/2 needs from the rest of the font
#[derive(Debug, Clone, Default)]
pub struct Os2Inputs<'a> {
    pub advances: &'a [u16],
    pub codepoints: &'a [u32],
    /// The font source at the default location, for line metrics
    pub default_source: Option<&'a FontSource>,
    pub units_per_em: u16,
    pub y_min: i16,
    pub y_max: i16,
    pub vendor_id: Option<&'a str>,
}

/// <https://github.com/fonttools/fonttools/blob/115275cbf429d91b75ac5536f5f0b2d6fe9d823a/Lib/fontTools/ttLib/tables/O_S_2f_2.py#L336-L348>
fn x_avg_char_width(advances: &[u16]) -> i16 {
    let (count, total) = advances
        .iter()
        .filter(|advance| **advance > 0)
        .fold((0_u64, 0_u64), |(count, total), advance| {
            (count + 1, total + *advance as u64)
        });
    if count == 0 {
        return 0;
    }
    (total as f64 / count as f64).ot_round()
}

/// Four characters, space padded; anything else falls back to `NONE`.
fn vendor_tag(vendor_id: Option<&str>) -> Tag {
    let Some(vendor_id) = vendor_id.filter(|v| !v.is_empty() && v.len() <= 4) else {
        return FALLBACK_VENDOR;
    };
    let padded = format!("{vendor_id:<4}");
    Tag::new_checked(padded.as_bytes()).unwrap_or(FALLBACK_VENDOR)
}

pub fn build_os2(inputs: &Os2Inputs) -> Os2 {
    let upm = inputs.units_per_em as f64;
    let metric = |name: &str, fallback: f64| {
        inputs
            .default_source
            .and_then(|s| s.line_metrics.get(name))
            .map(|m| m.value)
            .unwrap_or(fallback)
    };
    let char_index = |codepoint: Option<&u32>| codepoint.map(|c| (*c).min(0xFFFF) as u16);

    Os2 {
        x_avg_char_width: x_avg_char_width(inputs.advances),
        us_weight_class: 400,
        us_width_class: 5,
        fs_type: 0,
        ach_vend_id: vendor_tag(inputs.vendor_id),
        fs_selection: SelectionFlags::REGULAR,
        us_first_char_index: char_index(inputs.codepoints.iter().min()).unwrap_or_default(),
        us_last_char_index: char_index(inputs.codepoints.iter().max()).unwrap_or_default(),
        s_typo_ascender: metric("ascender", 0.8 * upm).ot_round(),
        s_typo_descender: metric("descender", -0.2 * upm).ot_round(),
        s_typo_line_gap: 0,
        us_win_ascent: inputs.y_max.max(0) as u16,
        us_win_descent: (-(inputs.y_min as i32)).max(0) as u16,

        // Avoid "field must be present for version 2" caused by default to None
        ul_code_page_range_1: Some(1),
        ul_code_page_range_2: Some(0),
        sx_height: Some(metric("xHeight", 0.5 * upm).ot_round()),
        s_cap_height: Some(metric("capHeight", 0.7 * upm).ot_round()),
        us_default_char: Some(0),
        us_break_char: Some(32),
        us_max_context: Some(0),

        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use fontra_source::source::LineMetric;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, "NONE")]
    #[case(Some(""), "NONE")]
    #[case(Some("DUCK"), "DUCK")]
    #[case(Some("AB"), "AB  ")]
    #[case(Some("TOOLONG"), "NONE")]
    fn vendor(#[case] vendor_id: Option<&str>, #[case] expected: &str) {
        assert_eq!(expected, vendor_tag(vendor_id).to_string());
    }

    #[test]
    fn zero_advances_are_not_averaged() {
        assert_eq!(550, x_avg_char_width(&[0, 500, 600, 0]));
        assert_eq!(0, x_avg_char_width(&[0]));
    }

    #[test]
    fn build_basic_os2() {
        let mut default_source = FontSource::default();
        default_source.line_metrics.insert(
            "xHeight".to_string(),
            LineMetric {
                value: 112.2,
                zone: 0.0,
            },
        );
        let os2 = build_os2(&Os2Inputs {
            advances: &[500, 250],
            codepoints: &[0x41, 0x20, 0x1F600],
            default_source: Some(&default_source),
            units_per_em: 1000,
            y_min: -120,
            y_max: 730,
            vendor_id: Some("DUCK"),
        });
        assert_eq!(Tag::new(b"DUCK"), os2.ach_vend_id);
        assert_eq!(375, os2.x_avg_char_width);
        assert_eq!(Some(112), os2.sx_height);
        assert_eq!(Some(700), os2.s_cap_height);
        assert_eq!(800, os2.s_typo_ascender);
        assert_eq!(0x20, os2.us_first_char_index);
        assert_eq!(0xFFFF, os2.us_last_char_index);
        assert_eq!((730, 120), (os2.us_win_ascent, os2.us_win_descent));
    }
}
