//! Runs the external compiler over a materialized project.

use std::{
    ffi::OsString,
    fmt::{self, Display},
    path::Path,
    process::Command,
};

use indexmap::IndexMap;
use log::{debug, info};

use crate::{error::Error, project::Project};

/// The compiler [`compile`] runs
pub const FONTMAKE: &str = "fontmake";

pub const FONTC: &str = "fontc";

/// Extra `--name [value]` flags, in the order they were configured.
///
/// A `None` or empty value produces a bare flag.
pub type CompilerOptions = IndexMap<String, Option<String>>;

/// The `-o` token passed to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Otf,
    Ttf,
    Variable,
    VariableCff2,
}

impl OutputFormat {
    /// Pick the format from the project shape and the destination suffix.
    ///
    /// Only a `.ttf` suffix, in any case, selects TrueType outlines.
    pub fn select(is_variable: bool, destination: &Path) -> OutputFormat {
        let truetype = destination
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("ttf"))
            .unwrap_or_default();
        match (is_variable, truetype) {
            (false, false) => OutputFormat::Otf,
            (false, true) => OutputFormat::Ttf,
            (true, false) => OutputFormat::VariableCff2,
            (true, true) => OutputFormat::Variable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Otf => "otf",
            OutputFormat::Ttf => "ttf",
            OutputFormat::Variable => "variable",
            OutputFormat::VariableCff2 => "variable-cff2",
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn push_options(args: &mut Vec<OsString>, options: &CompilerOptions) {
    for (name, value) in options.iter() {
        args.push(format!("--{name}").into());
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            args.push(value.into());
        }
    }
}

/// `-u|-m <project> -o <format> --output-path <destination>` then the options.
pub fn compile_arguments(
    project: &Project,
    destination: &Path,
    options: &CompilerOptions,
) -> Vec<OsString> {
    let source_flag = if project.is_variable() { "-m" } else { "-u" };
    let format = OutputFormat::select(project.is_variable(), destination);
    let mut args: Vec<OsString> = vec![
        source_flag.into(),
        project.path().into(),
        "-o".into(),
        format.as_str().into(),
        "--output-path".into(),
        destination.into(),
    ];
    push_options(&mut args, options);
    args
}

/// Arguments for fontc, which reads the designspace or UFO directly.
pub fn fontc_arguments(
    project: &Project,
    destination: &Path,
    build_dir: &Path,
    options: &CompilerOptions,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        project.path().into(),
        "--output-file".into(),
        destination.into(),
        "--build-dir".into(),
        build_dir.into(),
    ];
    push_options(&mut args, options);
    args
}

/// Something that can run a compiler to completion.
///
/// Output is not interpreted, only success or failure.
pub trait Compiler {
    fn run(&self, tool: &str, args: &[OsString]) -> Result<(), Error>;
}

/// Spawns the tool as a child process and waits for it.
#[derive(Debug, Clone, Default)]
pub struct ExternalCompiler;

impl Compiler for ExternalCompiler {
    fn run(&self, tool: &str, args: &[OsString]) -> Result<(), Error> {
        debug!("Run {tool} {args:?}");
        let status = Command::new(tool)
            .args(args)
            .status()
            .map_err(|source| Error::CompilerNotRun {
                tool: tool.to_string(),
                source,
            })?;
        if !status.success() {
            return Err(Error::CompilerFailed {
                tool: tool.to_string(),
                status: status.to_string(),
            });
        }
        info!("{tool} finished");
        Ok(())
    }
}

/// Compile `project` to `destination` with fontmake.
pub fn compile(
    compiler: &dyn Compiler,
    project: &Project,
    destination: &Path,
    options: &CompilerOptions,
) -> Result<(), Error> {
    compiler.run(
        FONTMAKE,
        &compile_arguments(project, destination, options),
    )
}

#[cfg(test)]
pub(crate) mod test {
    use std::cell::RefCell;

    use super::*;

    /// Remembers what it was asked to run
    #[derive(Default)]
    pub(crate) struct RecordingCompiler {
        pub(crate) runs: RefCell<Vec<(String, Vec<OsString>)>>,
        pub(crate) fail: bool,
    }

    impl Compiler for RecordingCompiler {
        fn run(&self, tool: &str, args: &[OsString]) -> Result<(), Error> {
            self.runs.borrow_mut().push((tool.to_string(), args.to_vec()));
            if self.fail {
                return Err(Error::CompilerFailed {
                    tool: tool.to_string(),
                    status: "exit status: 1".to_string(),
                });
            }
            Ok(())
        }
    }
}
