//! A workflow file: one input, then filters and outputs in the order given.
//!
//! ```yaml
//! steps:
//!   - input: fontra-read
//!     source: MyFont.fontra
//!   - filter: subset-axes
//!     axisNames: [Weight]
//!   - output: compile-fontmake
//!     destination: MyFont.ttf
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use fontra_source::source::ReadableFontSource;
use log::{debug, warn};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::{
    actions::{Connection, FilterAction, InputAction, OutputAction, ProcessContext},
    driver::Compiler,
    error::Error,
    materialize::CopyFailures,
    registry,
};

const STEP_KINDS: [&str; 3] = ["input", "filter", "output"];

pub enum Step {
    Input(Box<dyn InputAction>),
    Filter(Box<dyn FilterAction>),
    Output(Box<dyn OutputAction>),
}

impl Step {
    /// A step is a mapping with exactly one of `input`, `filter` or `output`
    /// naming the action, the other keys are its config.
    pub fn from_mapping(mut mapping: Mapping) -> Result<Step, Error> {
        let kinds: Vec<_> = STEP_KINDS
            .iter()
            .filter(|kind| mapping.contains_key(**kind))
            .collect();
        let [kind] = kinds[..] else {
            return Err(Error::InvalidStep(format!(
                "expected exactly one of {STEP_KINDS:?}, got {kinds:?}"
            )));
        };
        let name = match mapping.remove(*kind) {
            Some(Value::String(name)) => name,
            other => {
                return Err(Error::InvalidStep(format!(
                    "{kind} should name an action, got {other:?}"
                )))
            }
        };
        let config = Value::Mapping(mapping);
        debug!("{kind} step '{name}'");
        Ok(match *kind {
            "input" => Step::Input(registry::input_action(&name, config)?),
            "filter" => Step::Filter(registry::filter_action(&name, config)?),
            _ => Step::Output(registry::output_action(&name, config)?),
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Workflow {
    pub steps: Vec<Mapping>,
    /// Relative paths in step configs are resolved against this
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Workflow {
    pub fn load(path: &Path) -> Result<Workflow, Error> {
        let yaml = fs::read_to_string(path).map_err(|source| Error::FileIo {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or(Path::new("")).to_path_buf();
        Workflow::from_yaml(&yaml, base_dir)
    }

    pub fn from_yaml(yaml: &str, base_dir: PathBuf) -> Result<Workflow, Error> {
        let mut workflow: Workflow = serde_yaml::from_str(yaml)?;
        workflow.base_dir = base_dir;
        Ok(workflow)
    }

    /// Build every step, failing on the first bad one.
    pub fn parse_steps(&self) -> Result<Vec<Step>, Error> {
        self.steps.iter().cloned().map(Step::from_mapping).collect()
    }

    /// Run the steps in order, returning every glyph that was skipped along the way.
    pub fn run(
        &self,
        output_dir: &Path,
        continue_on_error: bool,
        compiler: &dyn Compiler,
    ) -> Result<CopyFailures, Error> {
        let mut steps = self.parse_steps()?.into_iter();
        let mut source: Box<dyn ReadableFontSource> = match steps.next() {
            Some(Step::Input(input)) => input.open(&self.base_dir)?,
            _ => return Err(Error::NoInput),
        };

        let context = ProcessContext {
            output_dir,
            continue_on_error,
            compiler,
        };
        let mut failures = CopyFailures::default();
        let mut outputs = 0;
        for step in steps {
            match step {
                Step::Input(input) => {
                    return Err(Error::InvalidStep(format!(
                        "only the first step may be an input, got {input:?}"
                    )))
                }
                Step::Filter(filter) => source = filter.apply(source)?,
                Step::Output(output) => {
                    outputs += 1;
                    let connection = Connection::connect(output.as_ref(), source.as_ref());
                    failures.extend(connection.process(&context)?);
                }
            }
        }
        if outputs == 0 {
            warn!("Workflow has no output steps, nothing was written");
        }
        Ok(failures)
    }
}
