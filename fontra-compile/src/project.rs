//! The intermediate project an external compiler consumes.

use std::path::{Path, PathBuf};

use crate::{designspace::DesignSpaceDocument, error::Error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Project {
    /// A single static source
    Ufo(PathBuf),
    /// Several sources and the axes they interpolate along
    Designspace(PathBuf),
}

impl Project {
    pub fn path(&self) -> &Path {
        match self {
            Project::Ufo(path) | Project::Designspace(path) => path,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Project::Designspace(..))
    }

    /// The UFO holding the default source.
    pub fn default_ufo(&self) -> Result<PathBuf, Error> {
        match self {
            Project::Ufo(path) => Ok(path.clone()),
            Project::Designspace(path) => {
                let doc = DesignSpaceDocument::load(path)?;
                let source = doc
                    .find_default()
                    .ok_or_else(|| Error::NoDefaultSource(path.clone()))?;
                Ok(DesignSpaceDocument::source_path(path, source))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use fontra_source::coords::DesignLocation;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use crate::designspace::{DsAxis, DsSource};

    use super::*;

    #[test]
    fn ufo_is_its_own_default() {
        let project = Project::Ufo(PathBuf::from("/tmp/x/temp.ufo"));
        assert!(!project.is_variable());
        assert_eq!(
            PathBuf::from("/tmp/x/temp.ufo"),
            project.default_ufo().unwrap()
        );
    }

    #[test]
    fn designspace_default_is_resolved() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("temp.designspace");
        let axis = fontra_source::axis::Axis::new(
            "Weight",
            write_fonts::types::Tag::new(b"wght"),
            100.0,
            400.0,
            900.0,
        );
        let doc = DesignSpaceDocument {
            axes: vec![DsAxis::from(&axis)],
            sources: vec![
                DsSource {
                    name: "light".to_string(),
                    filename: "temp_light.ufo".to_string(),
                    location: [("Weight", fontra_source::coords::DesignCoord::new(100.0))]
                        .into_iter()
                        .collect::<DesignLocation>(),
                    ..Default::default()
                },
                DsSource {
                    name: "regular".to_string(),
                    filename: "temp_regular.ufo".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        doc.save(&file).unwrap();

        let project = Project::Designspace(file);
        assert!(project.is_variable());
        assert_eq!(
            dir.path().join("temp_regular.ufo"),
            project.default_ufo().unwrap()
        );
    }

    #[test]
    fn designspace_without_default() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("temp.designspace");
        DesignSpaceDocument::default().save(&file).unwrap();
        assert!(matches!(
            Project::Designspace(file).default_ufo(),
            Err(Error::NoDefaultSource(..))
        ));
    }
}
