//! Per-image outcomes and the batch summary.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::ImageError;
use crate::parse::{ParseMode, ParseReport};

/// Where an image is in its lifecycle.
#[derive(Debug)]
pub enum JobState {
    Loaded,
    Queried,
    Parsed,
    Rendered,
    Saved,
    Failed(ImageError),
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Loaded => "loaded",
            JobState::Queried => "queried",
            JobState::Parsed => "parsed",
            JobState::Rendered => "rendered",
            JobState::Saved => "saved",
            JobState::Failed(_) => "failed",
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, JobState::Saved)
    }
}

impl Serialize for JobState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JobState::Failed(reason) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("status", "failed")?;
                map.serialize_entry("kind", reason.kind())?;
                map.serialize_entry("reason", &reason.to_string())?;
                map.end()
            }
            other => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("status", other.name())?;
                map.end()
            }
        }
    }
}

/// What happened to one input image.
#[derive(Debug, Serialize)]
pub struct ImageOutcome {
    pub source: PathBuf,
    pub state: JobState,
    pub detections_drawn: usize,
    pub output_path: Option<PathBuf>,
    pub parse_mode: Option<ParseMode>,
    pub warnings: Vec<String>,
}

impl ImageOutcome {
    /// An image that was read and decoded.
    pub fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            state: JobState::Loaded,
            detections_drawn: 0,
            output_path: None,
            parse_mode: None,
            warnings: Vec::new(),
        }
    }

    /// An image that never got past loading.
    pub fn failed(source: &Path, reason: ImageError) -> Self {
        let mut outcome = Self::new(source);
        outcome.state = JobState::Failed(reason);
        outcome
    }

    pub fn advance(&mut self, next: JobState) {
        debug!(
            source = %self.source.display(),
            "{} -> {}",
            self.state.name(),
            next.name()
        );
        self.state = next;
    }

    pub fn fail(&mut self, reason: ImageError) {
        self.advance(JobState::Failed(reason));
    }

    /// Copies the parser's issues into `warnings`.
    pub fn note_issues(&mut self, report: &ParseReport) {
        self.warnings
            .extend(report.issues.iter().map(ToString::to_string));
    }
}

/// Outcomes for a whole run.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub images: Vec<ImageOutcome>,
    /// Seed of the color palette, for reproducing the colors.
    pub color_seed: u64,
}

impl BatchSummary {
    pub fn new(images: Vec<ImageOutcome>, color_seed: u64) -> Self {
        Self { images, color_seed }
    }

    pub fn total(&self) -> usize {
        self.images.len()
    }

    pub fn succeeded(&self) -> usize {
        self.images.iter().filter(|o| o.state.is_saved()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// True when there was at least one image and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.total() > 0 && self.succeeded() == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed {} image(s): {} succeeded, {} skipped",
            self.total(),
            self.succeeded(),
            self.failed()
        )?;

        for outcome in &self.images {
            let source = outcome.source.display();
            match &outcome.state {
                JobState::Failed(reason) => {
                    write!(f, "  skipped {source}: {reason}")?;
                    if let Some(path) = &outcome.output_path {
                        write!(f, " (copied to {})", path.display())?;
                    }
                    writeln!(f)?;
                }
                _ => {
                    let tag = match outcome.parse_mode {
                        Some(ParseMode::TextualFallback) => "partial",
                        _ => "ok     ",
                    };
                    let target = outcome
                        .output_path
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    writeln!(
                        f,
                        "  {tag} {source} -> {target} ({} box(es))",
                        outcome.detections_drawn
                    )?;
                }
            }
        }

        write!(f, "Color seed: {}", self.color_seed)
    }
}
