//! Bounding box types in canonical XYXY format.

use serde::Serialize;

use super::coord::Coord;
use super::{Normalized, Pixel};

/// An axis-aligned bounding box in XYXY format (xmin, ymin, xmax, ymax).
///
/// The constructor does not enforce `min < max`; model output is often
/// inverted or out of frame, and the parser reports those cases instead of
/// refusing to represent them.
#[derive(Clone, Copy, PartialEq)]
pub struct BBoxXYXY<TSpace> {
    pub min: Coord<TSpace>,
    pub max: Coord<TSpace>,
}

impl<TSpace> BBoxXYXY<TSpace> {
    /// Creates a new bounding box from min and max coordinates.
    #[inline]
    pub fn new(min: Coord<TSpace>, max: Coord<TSpace>) -> Self {
        Self { min, max }
    }

    /// Creates a new bounding box from explicit coordinates.
    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            min: Coord::new(xmin, ymin),
            max: Coord::new(xmax, ymax),
        }
    }

    /// Converts from XYWH format (x, y, width, height) where (x, y) is the top-left corner.
    #[inline]
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::from_xyxy(x, y, x + width, y + height)
    }

    /// Converts to XYWH format (x, y, width, height).
    #[inline]
    pub fn to_xywh(&self) -> (f64, f64, f64, f64) {
        (self.xmin(), self.ymin(), self.width(), self.height())
    }

    #[inline]
    pub fn xmin(&self) -> f64 {
        self.min.x
    }

    #[inline]
    pub fn ymin(&self) -> f64 {
        self.min.y
    }

    #[inline]
    pub fn xmax(&self) -> f64 {
        self.max.x
    }

    #[inline]
    pub fn ymax(&self) -> f64 {
        self.max.y
    }

    /// Returns the width of the bounding box.
    ///
    /// May be negative if the box is malformed (xmax < xmin).
    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Returns the height of the bounding box.
    ///
    /// May be negative if the box is malformed (ymax < ymin).
    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Returns the area of the bounding box.
    ///
    /// May be negative if the box is malformed.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns true if all coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Returns true if the box is properly ordered (min <= max for both axes).
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y
    }

    /// Returns true if every coordinate lies in `[0, 1]`.
    #[inline]
    pub fn is_unit(&self) -> bool {
        self.min.is_unit() && self.max.is_unit()
    }

    /// Returns a copy with inverted corners swapped so that min <= max on both axes.
    pub fn ordered(&self) -> Self {
        Self::from_xyxy(
            self.min.x.min(self.max.x),
            self.min.y.min(self.max.y),
            self.min.x.max(self.max.x),
            self.min.y.max(self.max.y),
        )
    }
}

impl BBoxXYXY<Pixel> {
    /// Converts pixel coordinates to normalized coordinates.
    pub fn to_normalized(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Normalized> {
        BBoxXYXY::from_xyxy(
            self.min.x / image_width,
            self.min.y / image_height,
            self.max.x / image_width,
            self.max.y / image_height,
        )
    }

    /// Expands the box to whole pixels: min corner floored, max corner ceiled.
    pub fn snap_outward(&self) -> Self {
        Self::from_xyxy(
            self.min.x.floor(),
            self.min.y.floor(),
            self.max.x.ceil(),
            self.max.y.ceil(),
        )
    }

    /// Clamps every corner into the pixel grid `[0, width - 1] x [0, height - 1]`.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Self {
        let max_x = image_width.saturating_sub(1) as f64;
        let max_y = image_height.saturating_sub(1) as f64;
        Self::from_xyxy(
            self.min.x.clamp(0.0, max_x),
            self.min.y.clamp(0.0, max_y),
            self.max.x.clamp(0.0, max_x),
            self.max.y.clamp(0.0, max_y),
        )
    }

    /// Returns true if the box has positive area and lies inside `[0, width) x [0, height)`.
    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        let (w, h) = (image_width as f64, image_height as f64);
        self.is_finite()
            && self.min.x >= 0.0
            && self.min.y >= 0.0
            && self.max.x < w
            && self.max.y < h
            && self.min.x < self.max.x
            && self.min.y < self.max.y
    }
}

impl BBoxXYXY<Normalized> {
    /// Converts normalized coordinates to pixel coordinates.
    pub fn to_pixel(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Pixel> {
        BBoxXYXY::from_xyxy(
            self.min.x * image_width,
            self.min.y * image_height,
            self.max.x * image_width,
            self.max.y * image_height,
        )
    }
}

impl<TSpace> std::fmt::Debug for BBoxXYXY<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBoxXYXY")
            .field("xmin", &self.min.x)
            .field("ymin", &self.min.y)
            .field("xmax", &self.max.x)
            .field("ymax", &self.max.y)
            .finish()
    }
}

impl<TSpace> Default for BBoxXYXY<TSpace> {
    fn default() -> Self {
        Self::from_xyxy(0.0, 0.0, 0.0, 0.0)
    }
}

// Hand-written to avoid a `TSpace: Serialize` bound.
impl<TSpace> Serialize for BBoxXYXY<TSpace> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BBoxXYXY", 4)?;
        state.serialize_field("xmin", &self.min.x)?;
        state.serialize_field("ymin", &self.min.y)?;
        state.serialize_field("xmax", &self.max.x)?;
        state.serialize_field("ymax", &self.max.y)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_from_xywh() {
        let bbox: BBoxXYXY<Pixel> = BBoxXYXY::from_xywh(10.0, 20.0, 90.0, 60.0);
        assert_eq!(bbox.xmin(), 10.0);
        assert_eq!(bbox.ymin(), 20.0);
        assert_eq!(bbox.xmax(), 100.0);
        assert_eq!(bbox.ymax(), 80.0);
        assert_eq!(bbox.area(), 5400.0);
        assert_eq!(bbox.to_xywh(), (10.0, 20.0, 90.0, 60.0));
    }

    #[test]
    fn test_bbox_ordered_swaps_inverted_corners() {
        let inverted: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(100.0, 20.0, 10.0, 80.0);
        assert!(!inverted.is_ordered());

        let fixed = inverted.ordered();
        assert!(fixed.is_ordered());
        assert_eq!(fixed, BBoxXYXY::from_xyxy(10.0, 20.0, 100.0, 80.0));
    }

    #[test]
    fn test_bbox_normalized_to_pixel() {
        let bbox: BBoxXYXY<Normalized> = BBoxXYXY::from_xyxy(0.25, 0.5, 0.75, 1.0);
        assert!(bbox.is_unit());
        let pixel = bbox.to_pixel(400.0, 200.0);
        assert_eq!(pixel, BBoxXYXY::from_xyxy(100.0, 100.0, 300.0, 200.0));
        assert_eq!(pixel.to_normalized(400.0, 200.0), bbox);
    }

    #[test]
    fn test_bbox_snap_outward() {
        let bbox: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(10.2, 20.7, 30.1, 40.0);
        assert_eq!(
            bbox.snap_outward(),
            BBoxXYXY::from_xyxy(10.0, 20.0, 31.0, 40.0)
        );
    }

    #[test]
    fn test_bbox_clamp_to_pixel_grid() {
        let bbox: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(-5.0, 10.0, 700.0, 480.0);
        let clamped = bbox.clamp_to(640, 480);
        assert_eq!(clamped, BBoxXYXY::from_xyxy(0.0, 10.0, 639.0, 479.0));
        assert!(clamped.fits_within(640, 480));
        assert!(!bbox.fits_within(640, 480));
    }

    #[test]
    fn test_bbox_fits_within_rejects_zero_area() {
        let flat: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(10.0, 10.0, 10.0, 50.0);
        assert!(!flat.fits_within(100, 100));
    }
}
