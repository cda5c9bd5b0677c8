//! Turns a stream of typed points into a [`BezPath`].

use kurbo::{BezPath, PathEl, Point};

use crate::error::Error;

/// Accumulates one contour's worth of points.
///
/// A contour that begins with [`GlyphPathBuilder::move_to`] is open, any other is closed.
/// Closed contours start and end on their first on-curve point, as fontTools'
/// PointToSegmentPen does.
#[derive(Debug, Default)]
pub struct GlyphPathBuilder {
    offcurve: Vec<Point>,
    leading_offcurve: Vec<Point>,
    path: Vec<PathEl>,
    first_oncurve: Option<OnCurve>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum OnCurve {
    Move(Point),
    Line(Point),
    Quad(Point),
    Cubic(Point),
}

impl OnCurve {
    fn point(&self) -> Point {
        match self {
            OnCurve::Move(p) | OnCurve::Line(p) | OnCurve::Quad(p) | OnCurve::Cubic(p) => *p,
        }
    }
}

impl GlyphPathBuilder {
    pub fn new() -> GlyphPathBuilder {
        Default::default()
    }

    fn too_many_offcurves(&self) -> Error {
        Error::PathConversion(format!(
            "{} off-curve points before {:?}",
            self.offcurve.len(),
            self.path.last()
        ))
    }

    fn begin_path(&mut self, oncurve: OnCurve) {
        self.path.push(PathEl::MoveTo(oncurve.point()));
        self.first_oncurve = Some(oncurve);
    }

    /// Start an open contour
    pub fn move_to(&mut self, p: impl Into<Point>) -> Result<(), Error> {
        if self.first_oncurve.is_some() || !self.leading_offcurve.is_empty() {
            return Err(Error::PathConversion(
                "Move must be the first point of a contour".to_string(),
            ));
        }
        self.begin_path(OnCurve::Move(p.into()));
        Ok(())
    }

    pub fn line_to(&mut self, p: impl Into<Point>) -> Result<(), Error> {
        if !self.offcurve.is_empty() {
            return Err(self.too_many_offcurves());
        }
        if self.first_oncurve.is_none() {
            self.begin_path(OnCurve::Line(p.into()));
        } else {
            self.path.push(PathEl::LineTo(p.into()));
        }
        Ok(())
    }

    /// Quadratic spline through the pending off-curves, with implied on-curves between them.
    pub fn qcurve_to(&mut self, p: impl Into<Point>) -> Result<(), Error> {
        let p = p.into();
        if self.first_oncurve.is_none() {
            self.begin_path(OnCurve::Quad(p));
            return Ok(());
        }
        let Some(last) = self.offcurve.last().copied() else {
            return self.line_to(p);
        };
        for pair in self.offcurve.windows(2) {
            self.path
                .push(PathEl::QuadTo(pair[0], pair[0].midpoint(pair[1])));
        }
        self.path.push(PathEl::QuadTo(last, p));
        self.offcurve.clear();
        Ok(())
    }

    /// Line, quadratic or cubic depending on whether 0, 1 or 2 off-curves are pending.
    pub fn curve_to(&mut self, p: impl Into<Point>) -> Result<(), Error> {
        let p = p.into();
        if self.first_oncurve.is_none() {
            self.begin_path(OnCurve::Cubic(p));
            return Ok(());
        }
        match self.offcurve.as_slice() {
            [] => self.path.push(PathEl::LineTo(p)),
            [c] => self.path.push(PathEl::QuadTo(*c, p)),
            [c0, c1] => self.path.push(PathEl::CurveTo(*c0, *c1, p)),
            _ => return Err(self.too_many_offcurves()),
        }
        self.offcurve.clear();
        Ok(())
    }

    pub fn offcurve(&mut self, p: impl Into<Point>) {
        if self.first_oncurve.is_some() {
            self.offcurve.push(p.into());
        } else {
            self.leading_offcurve.push(p.into());
        }
    }

    fn close_path(&mut self) -> Result<(), Error> {
        self.offcurve.append(&mut self.leading_offcurve);
        match self.first_oncurve {
            Some(OnCurve::Line(p)) => self.line_to(p)?,
            Some(OnCurve::Quad(p)) => self.qcurve_to(p)?,
            Some(OnCurve::Cubic(p)) => self.curve_to(p)?,
            Some(OnCurve::Move(_)) => return Ok(()),
            None => {
                // all off-curve quadratic; start between the last and the first
                let (Some(first), Some(last)) =
                    (self.offcurve.first().copied(), self.offcurve.last().copied())
                else {
                    return Ok(());
                };
                self.begin_path(OnCurve::Quad(last.midpoint(first)));
                return self.close_path();
            }
        }
        self.path.push(PathEl::ClosePath);
        Ok(())
    }

    pub fn build(mut self) -> Result<BezPath, Error> {
        self.close_path()?;
        if !self.offcurve.is_empty() {
            return Err(self.too_many_offcurves());
        }
        Ok(BezPath::from_vec(self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_line() {
        let mut builder = GlyphPathBuilder::new();
        builder.move_to((2.0, 2.0)).unwrap();
        builder.curve_to((4.0, 2.0)).unwrap();
        assert_eq!("M2,2 L4,2", builder.build().unwrap().to_svg());
    }

    #[test]
    fn closed_cubic_with_leading_offcurves() {
        let mut builder = GlyphPathBuilder::new();
        builder.offcurve((0.0, 10.0));
        builder.curve_to((10.0, 10.0)).unwrap();
        builder.line_to((10.0, 0.0)).unwrap();
        builder.offcurve((5.0, -5.0));
        assert_eq!(
            "M10,10 L10,0 C5,-5 0,10 10,10 Z",
            builder.build().unwrap().to_svg()
        );
    }

    #[test]
    fn quad_spline_implies_oncurves() {
        let mut builder = GlyphPathBuilder::new();
        builder.move_to((2.0, 2.0)).unwrap();
        builder.offcurve((3.0, 0.0));
        builder.offcurve((5.0, 4.0));
        builder.qcurve_to((6.0, 2.0)).unwrap();
        assert_eq!("M2,2 Q3,0 4,2 Q5,4 6,2", builder.build().unwrap().to_svg());
    }

    #[test]
    fn all_offcurve_quadratic() {
        let mut builder = GlyphPathBuilder::new();
        builder.offcurve((0.0, 0.0));
        builder.offcurve((0.0, 2.0));
        builder.offcurve((2.0, 2.0));
        builder.offcurve((2.0, 0.0));
        assert_eq!(
            "M1,0 Q0,0 0,1 Q0,2 1,2 Q2,2 2,1 Q2,0 1,0 Z",
            builder.build().unwrap().to_svg()
        );
    }

    #[test]
    fn three_cubic_offcurves_is_an_error() {
        let mut builder = GlyphPathBuilder::new();
        builder.move_to((0.0, 0.0)).unwrap();
        builder.offcurve((1.0, 1.0));
        builder.offcurve((2.0, 1.0));
        builder.offcurve((3.0, 1.0));
        assert!(builder.curve_to((4.0, 0.0)).is_err());
    }
}
