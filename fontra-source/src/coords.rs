//! Using confusable types for coords is an endless source of confusion; don't.
//!
//! Axis values are either in user space (what a font user sees, e.g. CSS weight)
//! or in design space (what sources are drawn at). Locations here are keyed by
//! axis name, as they are in Fontra and designspace files.

use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    marker::PhantomData,
};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// The coordinate space used by the type designer/editing software.
///
/// In a [.designspace file][dspace], this is an 'xvalue'.
///
/// [dspace]: https://fonttools.readthedocs.io/en/latest/designspaceLib/xml.html#dimension-element
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DesignSpace;

/// A coordinate space that may be visible to the end user.
///
/// In a [.designspace file][dspace], this is a 'uservalue'.
///
/// [dspace]: https://fonttools.readthedocs.io/en/latest/designspaceLib/xml.html#dimension-element
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserSpace;

/// A coordinate in some coordinate space.
#[derive(Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent, bound = "")]
pub struct Coord<Space> {
    coord: OrderedFloat<f64>,
    // we want to be covariant but also Send + Sync. See
    // <https://doc.rust-lang.org/1.74.0/nomicon/phantom-data.html#table-of-phantomdata-patterns>
    #[serde(skip)]
    space: PhantomData<fn() -> Space>,
}

/// A coordinate in design space.
pub type DesignCoord = Coord<DesignSpace>;
/// A coordinate in user space
pub type UserCoord = Coord<UserSpace>;

impl<Space> Coord<Space> {
    /// Create a new coordinate.
    ///
    /// Note that we do *not* impl From because we want conversion to be explicit.
    pub fn new(value: impl Into<OrderedFloat<f64>>) -> Self {
        Coord {
            coord: value.into(),
            space: PhantomData,
        }
    }

    pub fn into_inner(self) -> OrderedFloat<f64> {
        self.coord
    }

    pub fn to_f64(&self) -> f64 {
        self.coord.into_inner()
    }
}

// derive would require Space: Clone
impl<Space> Clone for Coord<Space> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Space> Copy for Coord<Space> {}

impl<Space> Debug for Coord<Space> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.coord)
    }
}

impl<Space> Display for Coord<Space> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.coord)
    }
}

/// A set of per-axis coordinates, keyed by axis name.
#[derive(Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent, bound = "")]
pub struct Location<Space>(BTreeMap<String, Coord<Space>>);

/// A location in [`DesignSpace`].
pub type DesignLocation = Location<DesignSpace>;
/// A location in [`UserSpace`].
pub type UserLocation = Location<UserSpace>;

impl<Space> Location<Space> {
    pub fn new() -> Self {
        Location(BTreeMap::new())
    }

    /// Set the position on an axis, replacing whatever was there.
    pub fn insert(&mut self, axis_name: impl Into<String>, pos: Coord<Space>) -> &mut Self {
        self.0.insert(axis_name.into(), pos);
        self
    }

    pub fn get(&self, axis_name: &str) -> Option<Coord<Space>> {
        self.0.get(axis_name).copied()
    }

    pub fn remove(&mut self, axis_name: &str) -> Option<Coord<Space>> {
        self.0.remove(axis_name)
    }

    pub fn contains(&self, axis_name: &str) -> bool {
        self.0.contains_key(axis_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Coord<Space>)> {
        self.0.iter()
    }

    pub fn axis_names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A copy of `self` with every axis of `defaults` that we don't specify filled in.
    pub fn with_defaults(&self, defaults: &Location<Space>) -> Location<Space> {
        let mut filled = defaults.clone();
        for (name, pos) in self.iter() {
            filled.insert(name.clone(), *pos);
        }
        filled
    }
}

impl<Space> Clone for Location<Space> {
    fn clone(&self) -> Self {
        Location(self.0.clone())
    }
}

impl<Space> Debug for Location<Space> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<Space, S: Into<String>> FromIterator<(S, Coord<Space>)> for Location<Space> {
    fn from_iter<T: IntoIterator<Item = (S, Coord<Space>)>>(iter: T) -> Self {
        Location(iter.into_iter().map(|(n, c)| (n.into(), c)).collect())
    }
}

impl<Space> IntoIterator for Location<Space> {
    type Item = (String, Coord<Space>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Coord<Space>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
