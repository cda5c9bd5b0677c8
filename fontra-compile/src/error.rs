use std::{io, path::PathBuf};

use fontra_source::GlyphName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("'{0}' exists but is not a directory")]
    ExpectedDirectory(PathBuf),
    #[error("Missing file '{0}'")]
    FileExpected(PathBuf),
    #[error("io failed for '{path}': '{source}'")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    YamlSerError(#[from] serde_yaml::Error),
    #[error(transparent)]
    Source(#[from] fontra_source::Error),
    #[error("Unable to parse {0:?}: {1}")]
    ParseError(PathBuf, String),
    #[error("Unable to write {0:?}: {1}")]
    WriteError(PathBuf, String),
    #[error("Failed to copy glyph '{0}': {1}")]
    GlyphCopy(GlyphName, String),
    #[error("No source at the default location of {0:?}")]
    NoDefaultSource(PathBuf),
    #[error("Location {0} does not specify axis '{1}'")]
    IncompleteLocation(String, String),
    #[error("Unknown action '{0}'")]
    UnknownAction(String),
    #[error("Invalid workflow step: {0}")]
    InvalidStep(String),
    #[error("Workflow has no input step")]
    NoInput,
    #[error("'{tool}' failed with {status}")]
    CompilerFailed { tool: String, status: String },
    #[error("Unable to run '{tool}': '{source}'")]
    CompilerNotRun {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("'{0}' uses itself as a component")]
    ComponentCycle(GlyphName),
    #[error("{0}: sources are not compatible, {1}")]
    Interpolation(GlyphName, String),
    #[error("A required base glyph is not available: '{0}'")]
    MissingBaseGlyph(GlyphName),
    #[error("Bad variation model: {0}")]
    VariationModel(String),
    #[error("Unable to build font: {0}")]
    FontBuild(String),
}
