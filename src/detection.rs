//! The validated detection record shared by the parser and the renderer.

use serde::Serialize;

use crate::color::Color;
use crate::geometry::{BBoxXYXY, Pixel};

/// One object reported by the vision model, after validation.
///
/// Invariants (upheld by [`crate::parse`]): `confidence` is in `[0, 1]`,
/// the box corners are whole pixel indices inside the image, and
/// `xmin < xmax`, `ymin < ymax`. The max corner is inclusive.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    pub bbox: BBoxXYXY<Pixel>,
    pub color: Color,
}

impl Detection {
    /// The text drawn next to the box, e.g. `cat 97%`.
    pub fn caption(&self) -> String {
        format!("{} {:.0}%", self.label, self.confidence * 100.0)
    }
}
