//! The steps of a workflow: where fonts come from, how they are filtered, what they become.

use std::{
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
};

use fontra_source::{
    filter::{DropUnusedSourcesAndLayers, SubsetAxes},
    source::ReadableFontSource,
    FontraBackend, GlyphName,
};
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::{
    driver::{self, Compiler, CompilerOptions},
    error::Error,
    gasp::add_minimal_gasp_table,
    glyph_order::add_glyph_order,
    instances::add_instances,
    materialize::{materialize, CopyFailures, MaterializeOptions},
    project::Project,
    require_dir,
    varc::{self, VarcOptions},
};

/// Family name for synthesized instances when the source has none
pub const FALLBACK_FAMILY_NAME: &str = "Untitled";

/// Produces the font a workflow starts from.
pub trait InputAction: Debug {
    /// Relative paths are resolved against `base_dir`, the workflow's directory.
    fn open(&self, base_dir: &Path) -> Result<Box<dyn ReadableFontSource>, Error>;
}

/// Wraps a font in a view of it.
pub trait FilterAction: Debug {
    fn apply(
        &self,
        source: Box<dyn ReadableFontSource>,
    ) -> Result<Box<dyn ReadableFontSource>, Error>;
}

/// What every output is given besides the font.
pub struct ProcessContext<'a> {
    pub output_dir: &'a Path,
    pub continue_on_error: bool,
    pub compiler: &'a dyn Compiler,
}

/// Turns a font into a file.
///
/// Use [`Connection`] to bind a font and process it.
pub trait OutputAction: Debug {
    fn process_source(
        &self,
        source: &dyn ReadableFontSource,
        context: &ProcessContext,
    ) -> Result<CopyFailures, Error>;
}

/// An output action bound to a font for as long as this lives.
///
/// There is no way to process without a font, and nothing outlives the binding.
pub struct Connection<'a> {
    action: &'a dyn OutputAction,
    source: &'a dyn ReadableFontSource,
}

impl<'a> Connection<'a> {
    pub fn connect(action: &'a dyn OutputAction, source: &'a dyn ReadableFontSource) -> Self {
        trace!("Attach {action:?}");
        Connection { action, source }
    }

    pub fn process(&self, context: &ProcessContext) -> Result<CopyFailures, Error> {
        self.action.process_source(self.source, context)
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        trace!("Detach {:?}", self.action);
    }
}

/// `fontra-read`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FontraReadAction {
    pub source: PathBuf,
}

impl InputAction for FontraReadAction {
    fn open(&self, base_dir: &Path) -> Result<Box<dyn ReadableFontSource>, Error> {
        let path = base_dir.join(&self.source);
        debug!("Read {path:?}");
        Ok(Box::new(FontraBackend::new(path)?))
    }
}

/// `drop-unused-sources-and-layers`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DropUnusedSourcesAndLayersAction {}

impl FilterAction for DropUnusedSourcesAndLayersAction {
    fn apply(
        &self,
        source: Box<dyn ReadableFontSource>,
    ) -> Result<Box<dyn ReadableFontSource>, Error> {
        Ok(Box::new(DropUnusedSourcesAndLayers::new(source)))
    }
}

/// `subset-axes`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubsetAxesAction {
    pub axis_names: Vec<String>,
}

impl FilterAction for SubsetAxesAction {
    fn apply(
        &self,
        source: Box<dyn ReadableFontSource>,
    ) -> Result<Box<dyn ReadableFontSource>, Error> {
        Ok(Box::new(SubsetAxes::new(source, &self.axis_names)?))
    }
}

/// Configuration shared by the outputs that compile through a UFO project.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompileOptions {
    /// Output file, relative to the output directory
    pub destination: PathBuf,
    /// Passed to the compiler as `--name [value]`
    #[serde(default)]
    pub options: CompilerOptions,
    #[serde(default)]
    pub set_overlap_simple_flag: bool,
    #[serde(default)]
    pub add_minimal_gasp_table: bool,
    /// Keep the project here rather than in a temporary directory
    #[serde(default)]
    pub ufo_temp_dir: Option<PathBuf>,
}

/// Where the project is written, removed on drop unless pinned.
enum ProjectDir {
    Pinned(PathBuf),
    Disposable(TempDir),
}

impl ProjectDir {
    fn new(pinned: Option<&Path>) -> Result<ProjectDir, Error> {
        match pinned {
            Some(dir) => Ok(ProjectDir::Pinned(require_dir(dir)?)),
            None => tempfile::tempdir()
                .map(ProjectDir::Disposable)
                .map_err(|source| Error::FileIo {
                    path: std::env::temp_dir(),
                    source,
                }),
        }
    }

    fn path(&self) -> &Path {
        match self {
            ProjectDir::Pinned(path) => path,
            ProjectDir::Disposable(dir) => dir.path(),
        }
    }
}

fn family_name(source: &dyn ReadableFontSource) -> Result<String, Error> {
    Ok(source
        .font_info()?
        .family_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_FAMILY_NAME.to_string()))
}

impl CompileOptions {
    /// Materialize `source` into `dir` and get it ready for a compiler.
    fn prepare_project(
        &self,
        source: &dyn ReadableFontSource,
        dir: &Path,
        continue_on_error: bool,
    ) -> Result<(Project, CopyFailures), Error> {
        let options = MaterializeOptions {
            set_overlap_simple_flag: self.set_overlap_simple_flag,
            continue_on_error,
        };
        let (project, failures) = materialize(source, dir, &options)?;
        if !failures.is_empty() {
            warn!("{failures}");
        }
        if project.is_variable() {
            add_instances(project.path(), &family_name(source)?)?;
        }
        add_glyph_order(&project)?;
        if self.add_minimal_gasp_table {
            add_minimal_gasp_table(&project)?;
        }
        debug!("Project ready at {:?}", project.path());
        Ok((project, failures))
    }

    /// Prepare a project in a scratch directory and hand it to `compile`.
    fn compile_with(
        &self,
        source: &dyn ReadableFontSource,
        context: &ProcessContext,
        compile: impl FnOnce(&Project, &Path, &Path) -> Result<(), Error>,
    ) -> Result<CopyFailures, Error> {
        require_dir(context.output_dir)?;
        let destination = context.output_dir.join(&self.destination);
        let project_dir = ProjectDir::new(self.ufo_temp_dir.as_deref())?;
        let (project, failures) =
            self.prepare_project(source, project_dir.path(), context.continue_on_error)?;
        compile(&project, &destination, project_dir.path())?;
        info!("Wrote {destination:?}");
        Ok(failures)
    }
}

/// `compile-fontmake`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct CompileFontMakeAction(pub CompileOptions);

impl OutputAction for CompileFontMakeAction {
    fn process_source(
        &self,
        source: &dyn ReadableFontSource,
        context: &ProcessContext,
    ) -> Result<CopyFailures, Error> {
        self.0
            .compile_with(source, context, |project, destination, _| {
                driver::compile(context.compiler, project, destination, &self.0.options)
            })
    }
}

/// `compile-fontc`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct CompileFontcAction(pub CompileOptions);

impl OutputAction for CompileFontcAction {
    fn process_source(
        &self,
        source: &dyn ReadableFontSource,
        context: &ProcessContext,
    ) -> Result<CopyFailures, Error> {
        self.0
            .compile_with(source, context, |project, destination, project_dir| {
                let build_dir = project_dir.join("fontc-build");
                context.compiler.run(
                    driver::FONTC,
                    &driver::fontc_arguments(project, destination, &build_dir, &self.0.options),
                )
            })
    }
}

fn default_true() -> bool {
    true
}

/// `compile-varc`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompileVarcAction {
    pub destination: PathBuf,
    #[serde(default = "default_true")]
    pub subroutinize: bool,
    #[serde(default)]
    pub use_extended_gvar: bool,
    /// Glyphs to compile, in order; all of them when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glyph_names: Vec<GlyphName>,
}

impl OutputAction for CompileVarcAction {
    fn process_source(
        &self,
        source: &dyn ReadableFontSource,
        context: &ProcessContext,
    ) -> Result<CopyFailures, Error> {
        require_dir(context.output_dir)?;
        let destination = context.output_dir.join(&self.destination);
        let mut options =
            VarcOptions::for_destination(&destination, self.subroutinize, self.use_extended_gvar);
        options.glyph_names = self.glyph_names.clone();
        let (bytes, failures) = varc::build_font(source, &options)?;
        fs::write(&destination, bytes).map_err(|source| Error::FileIo {
            path: destination.clone(),
            source,
        })?;
        info!("Wrote {destination:?}");
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use crate::{
        designspace::DesignSpaceDocument, driver::test::RecordingCompiler, test::testdata_dir, ufo,
    };

    use super::*;

    fn compile_options(destination: &str) -> CompileOptions {
        CompileOptions {
            destination: PathBuf::from(destination),
            options: CompilerOptions::new(),
            set_overlap_simple_flag: false,
            add_minimal_gasp_table: false,
            ufo_temp_dir: None,
        }
    }

    fn read(name: &str) -> Box<dyn ReadableFontSource> {
        FontraReadAction {
            source: PathBuf::from(name),
        }
        .open(&testdata_dir())
        .unwrap()
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn config_uses_camel_case() {
        let action: CompileOptions = serde_yaml::from_str(
            r#"
            destination: out.ttf
            setOverlapSimpleFlag: true
            ufoTempDir: /tmp/ufo
            options:
              flatten-components:
              filter: DecomposeTransformedComponentsFilter
            "#,
        )
        .unwrap();
        assert!(action.set_overlap_simple_flag);
        assert!(!action.add_minimal_gasp_table);
        assert_eq!(Some(PathBuf::from("/tmp/ufo")), action.ufo_temp_dir);
        assert_eq!(
            vec![
                ("flatten-components", None),
                ("filter", Some("DecomposeTransformedComponentsFilter")),
            ],
            action
                .options
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_deref()))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn unknown_config_is_rejected() {
        let result: Result<CompileOptions, _> =
            serde_yaml::from_str("destination: out.ttf\nsetOverlapFlag: true");
        assert!(result.is_err());
    }

    #[test]
    fn varc_defaults() {
        let action: CompileVarcAction = serde_yaml::from_str("destination: out.ttf").unwrap();
        assert!(action.subroutinize);
        assert!(!action.use_extended_gvar);
    }

    #[test]
    fn static_ttf_compiles_from_ufo() {
        let output = tempdir().unwrap();
        let source = read("minimal.fontra");
        let compiler = RecordingCompiler::default();
        let context = ProcessContext {
            output_dir: output.path(),
            continue_on_error: false,
            compiler: &compiler,
        };
        let action = CompileFontMakeAction(compile_options("Minimal.ttf"));
        let failures = Connection::connect(&action, source.as_ref())
            .process(&context)
            .unwrap();
        assert!(failures.is_empty());

        let runs = compiler.runs.borrow();
        assert_eq!(1, runs.len());
        let (tool, args) = &runs[0];
        assert_eq!(driver::FONTMAKE, tool);
        let args = strings(args);
        assert_eq!("-u", args[0]);
        assert!(args[1].ends_with("temp.ufo"), "{args:?}");
        assert_eq!(
            vec![
                "-o".to_string(),
                "ttf".to_string(),
                "--output-path".to_string(),
                output.path().join("Minimal.ttf").to_string_lossy().into_owned(),
            ],
            args[2..].to_vec()
        );
    }

    #[test]
    fn pinned_dir_keeps_the_project() {
        let output = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let source = read("MutatorSansLite.fontra");
        let compiler = RecordingCompiler::default();
        let context = ProcessContext {
            output_dir: output.path(),
            continue_on_error: false,
            compiler: &compiler,
        };
        let action = CompileFontMakeAction(CompileOptions {
            add_minimal_gasp_table: true,
            ufo_temp_dir: Some(scratch.path().join("project")),
            ..compile_options("Mutator.otf")
        });
        Connection::connect(&action, source.as_ref())
            .process(&context)
            .unwrap();

        let designspace = scratch.path().join("project").join("temp.designspace");
        let doc = DesignSpaceDocument::load(&designspace).unwrap();
        assert_eq!(
            vec!["Regular", "Bold"],
            doc.instances
                .iter()
                .map(|i| i.style_name.as_str())
                .collect::<Vec<_>>()
        );
        assert!(doc
            .instances
            .iter()
            .all(|i| i.family_name == "MutatorSans Lite"));

        let default_ufo = Project::Designspace(designspace.clone())
            .default_ufo()
            .unwrap();
        let lib = ufo::read_dict(&ufo::lib_file(&default_ufo)).unwrap();
        assert!(lib.contains_key(ufo::GLYPH_ORDER_KEY));
        let info = ufo::read_dict(&ufo::fontinfo_file(&default_ufo)).unwrap();
        assert!(info.contains_key(ufo::GASP_KEY));

        let runs = compiler.runs.borrow();
        let args = strings(&runs[0].1);
        assert_eq!(
            vec!["-m", designspace.to_str().unwrap(), "-o", "variable-cff2"],
            args[..4].to_vec()
        );
    }

    #[test]
    fn fontc_gets_a_build_dir() {
        let output = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let source = read("minimal.fontra");
        let compiler = RecordingCompiler::default();
        let context = ProcessContext {
            output_dir: output.path(),
            continue_on_error: false,
            compiler: &compiler,
        };
        let action = CompileFontcAction(CompileOptions {
            ufo_temp_dir: Some(scratch.path().to_path_buf()),
            ..compile_options("Minimal.ttf")
        });
        Connection::connect(&action, source.as_ref())
            .process(&context)
            .unwrap();
        let runs = compiler.runs.borrow();
        assert_eq!(driver::FONTC, runs[0].0);
        assert_eq!(
            vec![
                scratch.path().join("temp.ufo").to_string_lossy().into_owned(),
                "--output-file".to_string(),
                output.path().join("Minimal.ttf").to_string_lossy().into_owned(),
                "--build-dir".to_string(),
                scratch.path().join("fontc-build").to_string_lossy().into_owned(),
            ],
            strings(&runs[0].1)
        );
    }

    #[test]
    fn compiler_failure_is_surfaced() {
        let output = tempdir().unwrap();
        let source = read("minimal.fontra");
        let compiler = RecordingCompiler {
            fail: true,
            ..Default::default()
        };
        let context = ProcessContext {
            output_dir: output.path(),
            continue_on_error: true,
            compiler: &compiler,
        };
        let action = CompileFontMakeAction(compile_options("Minimal.otf"));
        let result = Connection::connect(&action, source.as_ref()).process(&context);
        assert!(matches!(result, Err(Error::CompilerFailed { .. })), "{result:?}");
    }

    #[test]
    fn varc_writes_a_font() {
        let output = tempdir().unwrap();
        let source = read("minimal.fontra");
        let compiler = RecordingCompiler::default();
        let context = ProcessContext {
            output_dir: output.path(),
            continue_on_error: false,
            compiler: &compiler,
        };
        let action: CompileVarcAction = serde_yaml::from_str("destination: Minimal.ttf").unwrap();
        Connection::connect(&action, source.as_ref())
            .process(&context)
            .unwrap();
        assert!(output.path().join("Minimal.ttf").is_file());
        assert!(compiler.runs.borrow().is_empty());
    }

    #[test]
    fn varc_compiles_requested_glyphs() {
        let output = tempdir().unwrap();
        let source = read("MutatorSansLite.fontra");
        let compiler = RecordingCompiler::default();
        let context = ProcessContext {
            output_dir: output.path(),
            continue_on_error: false,
            compiler: &compiler,
        };
        let action: CompileVarcAction =
            serde_yaml::from_str("destination: Subset.ttf\nglyphNames: [B]").unwrap();
        assert_eq!(vec![GlyphName::new("B")], action.glyph_names);
        Connection::connect(&action, source.as_ref())
            .process(&context)
            .unwrap();

        let bytes = fs::read(output.path().join("Subset.ttf")).unwrap();
        let font = write_fonts::read::FontRef::new(&bytes).unwrap();
        let post = write_fonts::read::TableProvider::post(&font).unwrap();
        // B pulls in its component base
        let names: Vec<_> = (0..3)
            .map(|gid| post.glyph_name(write_fonts::types::GlyphId16::new(gid)).unwrap())
            .collect();
        assert_eq!(vec![".notdef", "B", "A"], names);
    }

    #[test]
    fn subset_axes_filter() {
        let source = read("MutatorSansLite.fontra");
        let filtered = SubsetAxesAction {
            axis_names: Vec::new(),
        }
        .apply(source)
        .unwrap();
        assert!(filtered.axes().unwrap().is_empty());
    }
}
