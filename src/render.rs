//! Drawing detections onto a copy of the source image.
//!
//! Each detection gets a hollow rectangle in its color, drawn inward from
//! the box edge, and a filled caption tab with `label NN%` text. The tab sits
//! above the box when there is room and tucks inside the top edge when the
//! box touches the top of the frame.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::detection::Detection;

/// Font files tried when none is configured, in order.
const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const MIN_FONT_PX: u32 = 12;
const LIGHT_BACKGROUND_LUMINANCE: f64 = 0.6;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("cannot draw on an empty {width}x{height} image")]
    EmptyCanvas { width: u32, height: u32 },
    #[error("failed to load font {path}: {message}")]
    Font { path: PathBuf, message: String },
}

/// An annotated copy of a source image.
#[derive(Debug)]
pub struct RenderedImage {
    pub image: RgbaImage,
    /// Detections that were drawn.
    pub drawn: usize,
    /// Detections skipped because their box did not fit the image.
    pub skipped: usize,
}

/// Where a caption tab goes, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelPlacement {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Draws boxes and captions.
///
/// Without a font the caption tabs are still drawn, only the text is missing.
pub struct BoxRenderer {
    font: Option<FontVec>,
}

impl std::fmt::Debug for BoxRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxRenderer")
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl BoxRenderer {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    /// A renderer that draws caption backgrounds only.
    pub fn without_font() -> Self {
        Self { font: None }
    }

    /// Loads a TrueType/OpenType font from disk.
    pub fn with_font_file(path: &Path) -> Result<Self, RenderError> {
        let font = load_font(path)?;
        Ok(Self::new(Some(font)))
    }

    /// Uses `configured` when given, otherwise the first system font that loads.
    ///
    /// Falls back to a font-less renderer with a single warning.
    pub fn discover(configured: Option<&Path>) -> Self {
        if let Some(path) = configured {
            match load_font(path) {
                Ok(font) => return Self::new(Some(font)),
                Err(e) => warn!("{e}; falling back to system fonts"),
            }
        }

        for candidate in SYSTEM_FONT_PATHS {
            let path = Path::new(candidate);
            if !path.is_file() {
                continue;
            }
            match load_font(path) {
                Ok(font) => {
                    debug!(font = %path.display(), "using system font");
                    return Self::new(Some(font));
                }
                Err(e) => debug!("{e}"),
            }
        }

        warn!("no usable font found; captions will be drawn without text (set `font` in the config)");
        Self::without_font()
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Returns an annotated copy of `image`. The input is never modified.
    pub fn render(
        &self,
        image: &DynamicImage,
        detections: &[Detection],
    ) -> Result<RenderedImage, RenderError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyCanvas { width, height });
        }

        let mut canvas = image.to_rgba8();
        let thickness = line_thickness(width, height);
        let font_px = font_px(height);
        let mut drawn = 0;
        let mut skipped = 0;

        for detection in detections {
            if !detection.bbox.fits_within(width, height) {
                warn!(
                    label = %detection.label,
                    "skipping box outside the {}x{} image: {:?}",
                    width,
                    height,
                    detection.bbox
                );
                skipped += 1;
                continue;
            }
            self.draw_box(&mut canvas, detection, thickness);
            self.draw_caption(&mut canvas, detection, font_px);
            drawn += 1;
        }

        Ok(RenderedImage {
            image: canvas,
            drawn,
            skipped,
        })
    }

    fn draw_box(&self, canvas: &mut RgbaImage, detection: &Detection, thickness: u32) {
        let color: Rgba<u8> = detection.color.into();
        let bbox = &detection.bbox;
        let (x0, y0) = (bbox.xmin() as i32, bbox.ymin() as i32);
        // The max corner is inclusive.
        let outer_w = (bbox.xmax() - bbox.xmin()) as u32 + 1;
        let outer_h = (bbox.ymax() - bbox.ymin()) as u32 + 1;

        for inset in 0..thickness {
            let (w, h) = (
                outer_w.saturating_sub(2 * inset),
                outer_h.saturating_sub(2 * inset),
            );
            if w == 0 || h == 0 {
                break;
            }
            let offset = inset as i32;
            draw_hollow_rect_mut(canvas, Rect::at(x0 + offset, y0 + offset).of_size(w, h), color);
        }
    }

    fn draw_caption(&self, canvas: &mut RgbaImage, detection: &Detection, font_px: u32) {
        let caption = detection.caption();
        let scale = PxScale::from(font_px as f32);
        let padding = (font_px / 5).max(2);

        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, &caption),
            None => estimate_text_size(&caption, font_px),
        };

        let placement = label_placement(
            detection,
            text_w + 2 * padding,
            text_h + 2 * padding,
            canvas.width(),
            canvas.height(),
        );

        let background: Rgba<u8> = detection.color.into();
        draw_filled_rect_mut(
            canvas,
            Rect::at(placement.x, placement.y).of_size(placement.width, placement.height),
            background,
        );

        if let Some(font) = &self.font {
            draw_text_mut(
                canvas,
                text_color(detection),
                placement.x + padding as i32,
                placement.y + padding as i32,
                scale,
                font,
                &caption,
            );
        }
    }
}

fn load_font(path: &Path) -> Result<FontVec, RenderError> {
    let bytes = std::fs::read(path).map_err(|e| RenderError::Font {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    FontVec::try_from_vec(bytes).map_err(|e| RenderError::Font {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Box outline width: `max(1, round(min(w, h) / 250))`.
pub fn line_thickness(image_width: u32, image_height: u32) -> u32 {
    let shorter = image_width.min(image_height) as f64;
    ((shorter / 250.0).round() as u32).max(1)
}

/// Caption height in pixels: `max(12, round(h * 0.015))`.
pub fn font_px(image_height: u32) -> u32 {
    ((image_height as f64 * 0.015).round() as u32).max(MIN_FONT_PX)
}

/// Rough text extent when no font metrics are available.
fn estimate_text_size(text: &str, font_px: u32) -> (u32, u32) {
    let width = (text.chars().count() as f64 * font_px as f64 * 0.6).ceil() as u32;
    (width, font_px)
}

/// Positions a `tab_w` x `tab_h` caption tab for a detection.
///
/// The tab goes directly above the box when it fits, otherwise just inside
/// the box's top edge. It is shifted left to stay in frame and cut to the
/// image size when larger than the image.
pub fn label_placement(
    detection: &Detection,
    tab_w: u32,
    tab_h: u32,
    image_width: u32,
    image_height: u32,
) -> LabelPlacement {
    let width = tab_w.min(image_width).max(1);
    let height = tab_h.min(image_height).max(1);
    let (xmin, ymin) = (detection.bbox.xmin() as i64, detection.bbox.ymin() as i64);

    let x = xmin.min(image_width as i64 - width as i64).max(0);
    let y = if ymin >= height as i64 {
        ymin - height as i64
    } else {
        ymin.min(image_height as i64 - height as i64).max(0)
    };

    LabelPlacement {
        x: x as i32,
        y: y as i32,
        width,
        height,
    }
}

/// Black on light backgrounds, white on dark ones.
fn text_color(detection: &Detection) -> Rgba<u8> {
    if detection.color.luminance() > LIGHT_BACKGROUND_LUMINANCE {
        Rgba([0, 0, 0, 255])
    } else {
        Rgba([255, 255, 255, 255])
    }
}
