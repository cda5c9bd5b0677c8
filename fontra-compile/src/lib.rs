//! Compiles fonts read through `fontra-source` into binary fonts.
//!
//! The main path writes a UFO or designspace project and hands it to an
//! external compiler; [`varc`] builds a font directly instead. A [`Workflow`]
//! strings the two together with inputs and filters.

pub mod actions;
#[cfg(feature = "cli")]
mod args;
pub mod cff2;
pub mod designspace;
pub mod driver;
mod error;
mod fvar;
pub mod gasp;
pub mod glyph_order;
mod gvar;
mod hvar;
pub mod instances;
pub mod materialize;
mod name;
mod os2;
pub mod project;
pub mod registry;
pub mod ufo;
pub mod varc;
pub mod varc_table;
pub mod variations;
pub mod workflow;

#[cfg(feature = "cli")]
pub use args::Args;
pub use error::Error;
pub use workflow::Workflow;

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;

/// Create `dir` if it doesn't exist, fail if something else is there.
pub fn require_dir(dir: &Path) -> Result<PathBuf, Error> {
    if dir.exists() && !dir.is_dir() {
        return Err(Error::ExpectedDirectory(dir.to_path_buf()));
    }
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| Error::FileIo {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    debug!("require_dir {:?}", dir);
    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    pub(crate) fn testdata_dir() -> PathBuf {
        let dir = Path::new("../resources/testdata/fontra");
        assert!(dir.is_dir());
        dir.to_path_buf()
    }

    pub(crate) fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
