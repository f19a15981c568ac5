//! Typed geometry for detections.
//!
//! Vision models report boxes in whatever convention they feel like:
//! pixel or normalized, corner pairs or origin plus size. Everything that
//! leaves the parser is a [`BBoxXYXY<Pixel>`], and the coordinate space is
//! tracked in the type so a normalized box cannot be drawn by accident.
//!
//! # Example
//!
//! ```
//! use boxsight::geometry::{BBoxXYXY, Normalized, Pixel};
//!
//! let normalized: BBoxXYXY<Normalized> = BBoxXYXY::from_xyxy(0.1, 0.2, 0.5, 0.6);
//! let pixel: BBoxXYXY<Pixel> = normalized.to_pixel(200.0, 100.0);
//! assert_eq!(pixel.xmin(), 20.0);
//! assert_eq!(pixel.ymax(), 60.0);
//! ```

mod bbox;
mod coord;
mod space;

pub use bbox::BBoxXYXY;
pub use coord::Coord;
pub use space::{Normalized, Pixel};
