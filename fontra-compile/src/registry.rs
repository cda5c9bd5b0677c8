//! Every action a workflow can name, and how to build it from its config.

use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::{
    actions::{
        CompileFontMakeAction, CompileFontcAction, CompileVarcAction,
        DropUnusedSourcesAndLayersAction, FilterAction, FontraReadAction, InputAction,
        OutputAction, SubsetAxesAction,
    },
    error::Error,
};

type Constructor<T> = fn(Value) -> Result<Box<T>, Error>;

fn input<A: InputAction + DeserializeOwned + 'static>(
    config: Value,
) -> Result<Box<dyn InputAction>, Error> {
    Ok(Box::new(serde_yaml::from_value::<A>(config)?))
}

fn filter<A: FilterAction + DeserializeOwned + 'static>(
    config: Value,
) -> Result<Box<dyn FilterAction>, Error> {
    Ok(Box::new(serde_yaml::from_value::<A>(config)?))
}

fn output<A: OutputAction + DeserializeOwned + 'static>(
    config: Value,
) -> Result<Box<dyn OutputAction>, Error> {
    Ok(Box::new(serde_yaml::from_value::<A>(config)?))
}

static INPUT_ACTIONS: &[(&str, Constructor<dyn InputAction>)] =
    &[("fontra-read", input::<FontraReadAction>)];

static FILTER_ACTIONS: &[(&str, Constructor<dyn FilterAction>)] = &[
    (
        "drop-unused-sources-and-layers",
        filter::<DropUnusedSourcesAndLayersAction>,
    ),
    ("subset-axes", filter::<SubsetAxesAction>),
];

static OUTPUT_ACTIONS: &[(&str, Constructor<dyn OutputAction>)] = &[
    ("compile-fontmake", output::<CompileFontMakeAction>),
    ("compile-fontc", output::<CompileFontcAction>),
    ("compile-varc", output::<CompileVarcAction>),
];

fn lookup<T: ?Sized>(
    registry: &[(&str, Constructor<T>)],
    name: &str,
    config: Value,
) -> Result<Box<T>, Error> {
    let (_, constructor) = registry
        .iter()
        .find(|(registered, _)| *registered == name)
        .ok_or_else(|| Error::UnknownAction(name.to_string()))?;
    constructor(config)
}

pub fn input_action(name: &str, config: Value) -> Result<Box<dyn InputAction>, Error> {
    lookup(INPUT_ACTIONS, name, config)
}

pub fn filter_action(name: &str, config: Value) -> Result<Box<dyn FilterAction>, Error> {
    lookup(FILTER_ACTIONS, name, config)
}

pub fn output_action(name: &str, config: Value) -> Result<Box<dyn OutputAction>, Error> {
    lookup(OUTPUT_ACTIONS, name, config)
}

/// Names of the registered input, filter and output actions
pub fn action_names() -> impl Iterator<Item = &'static str> {
    INPUT_ACTIONS
        .iter()
        .map(|(name, _)| *name)
        .chain(FILTER_ACTIONS.iter().map(|(name, _)| *name))
        .chain(OUTPUT_ACTIONS.iter().map(|(name, _)| *name))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn config(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[rstest]
    #[case::fontmake("compile-fontmake", "destination: a.ttf")]
    #[case::fontc("compile-fontc", "destination: a.ttf\nufoTempDir: build")]
    #[case::varc("compile-varc", "destination: a.ttf\nsubroutinize: false")]
    fn outputs_are_registered(#[case] name: &str, #[case] yaml: &str) {
        assert!(output_action(name, config(yaml)).is_ok());
    }

    #[test]
    fn filters_are_registered() {
        assert!(filter_action("drop-unused-sources-and-layers", config("{}")).is_ok());
        assert!(filter_action("subset-axes", config("axisNames: [Weight]")).is_ok());
    }

    #[test]
    fn unknown_name() {
        let result = output_action("compile-magic", config("destination: a.ttf"));
        assert!(
            matches!(&result, Err(Error::UnknownAction(name)) if name == "compile-magic"),
            "{result:?}"
        );
    }

    #[test]
    fn bad_config() {
        let result = input_action("fontra-read", config("path: a.fontra"));
        assert!(
            matches!(result, Err(Error::YamlSerError(..))),
            "{result:?}"
        );
    }

    #[test]
    fn every_name_once() {
        let mut names: Vec<_> = action_names().collect();
        let count = names.len();
        names.sort();
        names.dedup();
        assert_eq!(count, names.len());
        assert_eq!(6, count);
    }
}
