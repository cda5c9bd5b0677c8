//! Reads font sources, Fontra's in particular, through a backend-agnostic interface

pub mod axis;
pub mod coords;
mod error;
pub mod filter;
mod fontra;
pub mod glyph;
pub mod paths;
mod path_builder;
mod piecewise_linear_map;
pub mod source;
mod types;

pub use error::Error;
pub use fontra::FontraBackend;
pub use piecewise_linear_map::PiecewiseLinearMap;
pub use types::GlyphName;
