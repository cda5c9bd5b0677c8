//! A gasp table that asks for gridfit and smoothing at every size.

use log::debug;
use plist::{Dictionary, Value};

use crate::{error::Error, project::Project, ufo};

/// Covers every ppem
pub const MAX_PPEM: i64 = 0xFFFF;

/// gridfit, do gray, symmetric gridfit, symmetric smoothing
pub const ALL_BEHAVIORS: [i64; 4] = [0, 1, 2, 3];

fn minimal_gasp_records() -> Value {
    let mut record = Dictionary::new();
    record.insert("rangeMaxPPEM".to_string(), Value::from(MAX_PPEM));
    record.insert(
        "rangeGaspBehavior".to_string(),
        Value::Array(ALL_BEHAVIORS.iter().map(|b| Value::from(*b)).collect()),
    );
    Value::Array(vec![Value::Dictionary(record)])
}

/// Set `openTypeGaspRangeRecords` of the default UFO, replacing whatever was there.
pub fn add_minimal_gasp_table(project: &Project) -> Result<(), Error> {
    let ufo_dir = project.default_ufo()?;
    debug!("Add minimal gasp table to {ufo_dir:?}");
    ufo::update_dict(&ufo::fontinfo_file(&ufo_dir), |info| {
        info.insert(ufo::GASP_KEY.to_string(), minimal_gasp_records());
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn replaces_existing_records() {
        let dir = tempdir().unwrap();
        let ufo_dir = dir.path().join("temp.ufo");
        std::fs::create_dir_all(&ufo_dir).unwrap();
        let info_file = ufo::fontinfo_file(&ufo_dir);
        ufo::update_dict(&info_file, |info| {
            info.insert("familyName".to_string(), Value::from("Keep"));
            info.insert(
                ufo::GASP_KEY.to_string(),
                Value::Array(vec![Value::from("junk")]),
            );
        })
        .unwrap();

        let project = Project::Ufo(ufo_dir);
        add_minimal_gasp_table(&project).unwrap();
        add_minimal_gasp_table(&project).unwrap();

        let info = ufo::read_dict(&info_file).unwrap();
        assert_eq!(Some(&minimal_gasp_records()), info.get(ufo::GASP_KEY));
        assert_eq!(Some(&Value::from("Keep")), info.get("familyName"));

        let Some(Value::Array(records)) = info.get(ufo::GASP_KEY) else {
            panic!("No gasp records");
        };
        assert_eq!(1, records.len());
        let record = records[0].as_dictionary().unwrap();
        assert_eq!(
            Some(65535),
            record
                .get("rangeMaxPPEM")
                .and_then(Value::as_signed_integer)
        );
    }
}
