//! Per-image orchestration.
//!
//! Every image moves through `Loaded -> Queried -> Parsed -> Rendered ->
//! Saved`. Any step can end it in `Failed`, and a failed image never stops
//! the batch. When the model's answer yields no usable detections the
//! original file is still copied to the output location so every input has
//! a counterpart there.

mod report;

pub use report::{BatchSummary, ImageOutcome, JobState};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::{debug, info, warn};

use crate::color::ColorPalette;
use crate::error::{ImageError, SaveError};
use crate::job::{load_image, output_path, ImageKind, ImageJob};
use crate::parse::{parse_response, ParseMode, Severity};
use crate::render::BoxRenderer;
use crate::vision::{detection_prompt, EncodedImage, VisionApi};

/// Drives images through query, parse, render and save.
pub struct Pipeline {
    api: Box<dyn VisionApi>,
    renderer: BoxRenderer,
    palette: ColorPalette,
    output_dir: PathBuf,
    cancel: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(
        api: Box<dyn VisionApi>,
        renderer: BoxRenderer,
        palette: ColorPalette,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api,
            renderer,
            palette,
            output_dir: output_dir.into(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Uses an externally owned cancel flag (e.g. one set from a Ctrl-C handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle that stops the batch before the next request when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Processes every path in order and collects the outcomes.
    pub fn run(&mut self, paths: &[PathBuf]) -> BatchSummary {
        let total = paths.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, path) in paths.iter().enumerate() {
            info!("[{}/{}] {}", index + 1, total, path.display());
            outcomes.push(self.process_image(path));
        }
        BatchSummary::new(outcomes, self.palette.seed())
    }

    /// Runs one image to a terminal state.
    pub fn process_image(&mut self, path: &Path) -> ImageOutcome {
        if self.is_cancelled() {
            return ImageOutcome::failed(path, ImageError::Cancelled);
        }

        let loaded = match load_image(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                return ImageOutcome::failed(path, e.into());
            }
        };

        let mut outcome = ImageOutcome::new(path);
        self.drive(&loaded, &mut outcome);
        outcome
    }

    fn drive(&mut self, loaded: &ImageJob, outcome: &mut ImageOutcome) {
        let (width, height) = (loaded.width(), loaded.height());

        if self.is_cancelled() {
            outcome.fail(ImageError::Cancelled);
            return;
        }

        let encoded = EncodedImage::encode(&loaded.bytes, loaded.kind.media_type(), width, height);
        let raw = match self.api.describe(&encoded, &detection_prompt(width, height)) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("vision request for {} failed: {e}", loaded.path.display());
                outcome.fail(e.into());
                return;
            }
        };
        outcome.advance(JobState::Queried);
        debug!(chars = raw.len(), "received response");

        let parsed = parse_response(&raw, width, height, &mut self.palette);
        for issue in &parsed.report.issues {
            match issue.severity {
                Severity::Error => warn!("{}: {issue}", loaded.path.display()),
                Severity::Warning => debug!("{}: {issue}", loaded.path.display()),
            }
        }
        outcome.note_issues(&parsed.report);

        let destination = output_path(&self.output_dir, &loaded.path);
        let (detections, mode) = match parsed.into_result() {
            Ok(found) => found,
            Err(failure) => {
                warn!(
                    "{}: {failure}; saving an unannotated copy",
                    loaded.path.display()
                );
                match save_original(loaded, &destination) {
                    Ok(()) => outcome.output_path = Some(destination),
                    Err(e) => outcome.warnings.push(e.to_string()),
                }
                outcome.fail(failure.into());
                return;
            }
        };
        if mode == ParseMode::TextualFallback {
            warn!(
                "{}: no JSON in the response, boxes were read from plain text",
                loaded.path.display()
            );
            outcome
                .warnings
                .push("partial parse: boxes were read from plain text".to_string());
        }
        outcome.parse_mode = Some(mode);
        outcome.advance(JobState::Parsed);

        let rendered = match self.renderer.render(&loaded.image, &detections) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!("{}: {e}", loaded.path.display());
                outcome.fail(e.into());
                return;
            }
        };
        outcome.detections_drawn = rendered.drawn;
        outcome.advance(JobState::Rendered);

        if let Err(e) = save_rendered(rendered.image, loaded.kind, &destination) {
            warn!("{e}");
            outcome.fail(e.into());
            return;
        }
        info!(
            "saved {} with {} box(es)",
            destination.display(),
            outcome.detections_drawn
        );
        outcome.output_path = Some(destination);
        outcome.advance(JobState::Saved);
    }
}

fn ensure_parent(path: &Path) -> Result<(), SaveError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|source| SaveError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

fn save_original(loaded: &ImageJob, destination: &Path) -> Result<(), SaveError> {
    ensure_parent(destination)?;
    fs::write(destination, &loaded.bytes).map_err(|source| SaveError::Write {
        path: destination.to_path_buf(),
        source,
    })
}

/// Encodes in the source's format. JPEG has no alpha, so it is dropped first.
fn save_rendered(image: RgbaImage, kind: ImageKind, destination: &Path) -> Result<(), SaveError> {
    ensure_parent(destination)?;
    let result = match kind {
        ImageKind::Jpeg => DynamicImage::ImageRgba8(image)
            .to_rgb8()
            .save_with_format(destination, ImageFormat::Jpeg),
        other => image.save_with_format(destination, other.image_format()),
    };
    result.map_err(|source| SaveError::Encode {
        path: destination.to_path_buf(),
        source,
    })
}
