//! A global variation axis with enough self-awareness to convert units.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use write_fonts::types::Tag;

use crate::{
    coords::{DesignCoord, DesignLocation, UserCoord},
    error::Error,
    piecewise_linear_map::PiecewiseLinearMap,
};

/// A named stop on an axis, e.g. "Bold" at wght 700.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AxisValueLabel {
    pub name: String,
    /// In user space
    pub value: f64,
    #[serde(default)]
    pub elidable: bool,
}

impl AxisValueLabel {
    pub fn new(name: impl Into<String>, value: f64, elidable: bool) -> Self {
        AxisValueLabel {
            name: name.into(),
            value,
            elidable,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Axis {
    pub name: String,
    pub tag: Tag,
    pub min: UserCoord,
    pub default: UserCoord,
    pub max: UserCoord,
    pub hidden: bool,
    /// Pairs of [user, design] defining a piecewise linear map
    pub mapping: Vec<[f64; 2]>,
    /// Set for discrete axes, the only user values the axis may take
    pub values: Option<Vec<f64>>,
    pub value_labels: Vec<AxisValueLabel>,
}

impl Axis {
    /// A continuous axis without mapping or labels.
    pub fn new(name: impl Into<String>, tag: Tag, min: f64, default: f64, max: f64) -> Axis {
        Axis {
            name: name.into(),
            tag,
            min: UserCoord::new(min),
            default: UserCoord::new(default),
            max: UserCoord::new(max),
            hidden: false,
            mapping: Vec::new(),
            values: None,
            value_labels: Vec::new(),
        }
    }

    pub fn with_mapping(mut self, mapping: Vec<[f64; 2]>) -> Axis {
        self.mapping = mapping;
        self
    }

    pub fn with_labels(mut self, value_labels: Vec<AxisValueLabel>) -> Axis {
        self.value_labels = value_labels;
        self
    }

    pub fn is_discrete(&self) -> bool {
        self.values.is_some()
    }

    /// Fail if min <= default <= max doesn't hold.
    pub fn validate(&self) -> Result<(), Error> {
        if self.min > self.default || self.max < self.default {
            return Err(Error::InconsistentAxisDefinitions(format!(
                "{} ({}): min {} default {} max {}",
                self.name, self.tag, self.min, self.default, self.max
            )));
        }
        Ok(())
    }

    fn user_to_design(&self) -> PiecewiseLinearMap {
        PiecewiseLinearMap::new(
            self.mapping
                .iter()
                .map(|[user, design]| (OrderedFloat(*user), OrderedFloat(*design)))
                .collect(),
        )
    }

    /// Map a user space value to design space.
    pub fn map_forward(&self, value: UserCoord) -> DesignCoord {
        DesignCoord::new(self.user_to_design().map(value.to_f64()))
    }

    /// Map a design space value to user space.
    pub fn map_backward(&self, value: DesignCoord) -> UserCoord {
        UserCoord::new(self.user_to_design().reverse().map(value.to_f64()))
    }

    pub fn default_design(&self) -> DesignCoord {
        self.map_forward(self.default)
    }

    pub fn min_design(&self) -> DesignCoord {
        self.map_forward(self.min)
    }

    pub fn max_design(&self) -> DesignCoord {
        self.map_forward(self.max)
    }
}

/// The location where every axis is at its default, in design space.
pub fn default_location(axes: &[Axis]) -> DesignLocation {
    axes.iter()
        .map(|a| (a.name.clone(), a.default_design()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight() -> Axis {
        Axis::new("Weight", Tag::new(b"wght"), 100.0, 400.0, 900.0).with_mapping(vec![
            [100.0, 0.0],
            [400.0, 100.0],
            [900.0, 1000.0],
        ])
    }

    #[test]
    fn forward_and_back() {
        let axis = weight();
        assert_eq!(DesignCoord::new(100.0), axis.map_forward(UserCoord::new(400.0)));
        assert_eq!(DesignCoord::new(550.0), axis.map_forward(UserCoord::new(650.0)));
        assert_eq!(UserCoord::new(650.0), axis.map_backward(DesignCoord::new(550.0)));
        assert_eq!(DesignCoord::new(100.0), axis.default_design());
    }

    #[test]
    fn unmapped_is_identity() {
        let axis = Axis::new("Width", Tag::new(b"wdth"), 50.0, 100.0, 200.0);
        assert_eq!(DesignCoord::new(75.0), axis.map_forward(UserCoord::new(75.0)));
    }

    #[test]
    fn default_out_of_range_is_rejected() {
        let axis = Axis::new("Width", Tag::new(b"wdth"), 50.0, 300.0, 200.0);
        assert!(axis.validate().is_err());
        assert!(weight().validate().is_ok());
    }

    #[test]
    fn default_location_is_in_design_space() {
        let loc = default_location(&[weight()]);
        assert_eq!(Some(DesignCoord::new(100.0)), loc.get("Weight"));
    }
}
