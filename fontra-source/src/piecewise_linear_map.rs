//! Remaps values using a series of linear mappings.
//!
//! Used for axis user : design mappings. For example, from a userspace
//! (fvar) weight of 400 to the designspace value the sources are drawn at.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiecewiseLinearMap {
    // these two mappings have identical lengths, by construction
    from: Vec<OrderedFloat<f64>>, // sorted, ||'s to
    to: Vec<OrderedFloat<f64>>,   // sorted, ||'s from
}

impl PiecewiseLinearMap {
    /// Create a new map from a series of (from, to) values.
    ///
    /// Duplicate `from` values keep the first mapping given for them.
    pub fn new(mappings: Vec<(OrderedFloat<f64>, OrderedFloat<f64>)>) -> PiecewiseLinearMap {
        let mut mappings: Vec<_> = mappings
            .into_iter()
            .enumerate()
            .map(|(i, (from, to))| (from, i, to))
            .collect();
        mappings.sort();
        mappings.dedup_by_key(|(from, _, _)| *from);
        let (from, to): (Vec<_>, Vec<_>) = mappings
            .into_iter()
            .map(|(from, _, to)| (from, to))
            .unzip();
        PiecewiseLinearMap { from, to }
    }

    /// A map that returns every value unchanged.
    pub fn identity() -> PiecewiseLinearMap {
        PiecewiseLinearMap {
            from: Vec::new(),
            to: Vec::new(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.from.is_empty()
    }

    pub fn reverse(&self) -> PiecewiseLinearMap {
        let mappings = self
            .to
            .iter()
            .copied()
            .zip(self.from.iter().copied())
            .collect();
        PiecewiseLinearMap::new(mappings)
    }

    /// An iterator over (from, to) values.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.from
            .iter()
            .zip(self.to.iter())
            .map(|(from, to)| (from.0, to.0))
    }

    /// Map `value`, extrapolating with slope 1 past either end.
    ///
    /// Matches fontTools `piecewiseLinearMap`.
    pub fn map(&self, value: f64) -> f64 {
        let (Some(first), Some(last)) = (self.from.first(), self.from.last()) else {
            return value;
        };
        if value.is_nan() {
            return value;
        }
        if value <= first.0 {
            return value + self.to[0].0 - first.0;
        }
        if value >= last.0 {
            return value + self.to[self.to.len() - 1].0 - last.0;
        }
        match self.from.binary_search(&OrderedFloat(value)) {
            Ok(idx) => self.to[idx].0,
            // strictly inside, so 0 < idx < len
            Err(idx) => {
                let (lo, hi) = (self.from[idx - 1].0, self.from[idx].0);
                lerp(self.to[idx - 1].0, self.to[idx].0, (value - lo) / (hi - lo))
            }
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    debug_assert!((0_f64..=1_f64).contains(&t));
    a + t * (b - a)
}
