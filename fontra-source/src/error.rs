use std::{io, path::PathBuf};

use thiserror::Error;

use crate::types::GlyphName;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Directory expected: {0}")]
    DirectoryExpected(PathBuf),
    #[error("File expected: {0}")]
    FileExpected(PathBuf),
    #[error("io failed for '{path}': '{source}'")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unable to parse {0:?}: {1}")]
    ParseError(PathBuf, String),
    #[error("Invalid input data: {0}")]
    InvalidInputData(String),
    #[error("Inconsistent axis definition: {0}")]
    InconsistentAxisDefinitions(String),
    #[error("Location refers to undefined axis '{0}'")]
    UnknownAxis(String),
    #[error("No glyph named '{0}'")]
    NoGlyph(GlyphName),
    #[error("Unable to build a path: {0}")]
    PathConversion(String),
}
