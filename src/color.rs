//! Visually distinct box colors.
//!
//! Hues walk the circle in steps of the golden-ratio conjugate, which keeps
//! any run of consecutive colors spread out. Saturation and value are drawn
//! from a narrow bright band so every color reads well on photos.

use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

/// Golden-ratio conjugate, `(sqrt(5) - 1) / 2`.
pub const GOLDEN_RATIO_CONJUGATE: f64 = 0.618033988749895;

const SATURATION_RANGE: std::ops::RangeInclusive<f64> = 0.85..=1.0;
const VALUE_RANGE: std::ops::RangeInclusive<f64> = 0.85..=1.0;

/// An 8-bit RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Formats the color as `#rrggbb`.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Relative luminance in `[0, 1]` (Rec. 709 weights on the raw channels).
    pub fn luminance(&self) -> f64 {
        (0.2126 * self.r as f64 + 0.7152 * self.g as f64 + 0.0722 * self.b as f64) / 255.0
    }

    /// Converts HSV (each component in `[0, 1]`) to RGB.
    ///
    /// Channels are truncated, not rounded, after scaling by 255.
    pub fn from_hsv(hue: f64, saturation: f64, value: f64) -> Self {
        let (r, g, b) = hsv_to_rgb(hue, saturation, value);
        Self::new(
            (r * 255.0) as u8,
            (g * 255.0) as u8,
            (b * 255.0) as u8,
        )
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl From<Color> for image::Rgba<u8> {
    fn from(color: Color) -> Self {
        image::Rgba([color.r, color.g, color.b, 255])
    }
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (v, v, v);
    }
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (sector as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

/// A stream of well separated colors.
///
/// One palette is shared by every image in a run so that colors keep
/// varying from one image to the next.
#[derive(Clone, Debug)]
pub struct ColorPalette {
    hue: f64,
    seed: u64,
    rng: StdRng,
}

impl ColorPalette {
    /// Creates a reproducible palette. The starting hue comes from the seed.
    pub fn seeded(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let hue = rng.random::<f64>();
        Self { hue, seed, rng }
    }

    /// Creates a palette from a freshly drawn seed.
    pub fn from_entropy() -> Self {
        let seed = rand::rng().random::<u64>();
        Self::seeded(seed)
    }

    /// The seed this palette was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The hue most recently handed out (or the starting hue).
    pub fn hue(&self) -> f64 {
        self.hue
    }

    /// Advances the hue cursor and returns the next color.
    pub fn next_color(&mut self) -> Color {
        self.hue = (self.hue + GOLDEN_RATIO_CONJUGATE) % 1.0;
        let saturation = self.rng.random_range(SATURATION_RANGE);
        let value = self.rng.random_range(VALUE_RANGE);
        Color::from_hsv(self.hue, saturation, value)
    }
}
