//! Command line arguments

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Compile a font by running a workflow.
#[derive(Serialize, Deserialize, Parser, Debug, Clone, PartialEq)]
pub struct Args {
    /// A workflow yaml file listing an input, filters and outputs
    pub workflow: PathBuf,

    /// Output destinations are relative to this directory
    #[arg(short, long)]
    #[clap(default_value = ".")]
    pub output_dir: PathBuf,

    /// Skip glyphs that fail to copy rather than failing the whole compile
    #[arg(long)]
    #[clap(default_value = "false")]
    pub continue_on_error: bool,
}
