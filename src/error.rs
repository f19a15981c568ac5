use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::job::InputError;
use crate::parse::ParseFailure;
use crate::render::RenderError;
use crate::vision::VisionError;

/// Errors that end the whole run.
#[derive(Debug, Error)]
pub enum BoxsightError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid input path {path}: {message}")]
    InputPath { path: PathBuf, message: String },

    #[error("No files found in {path}")]
    NoImagesFound { path: PathBuf },

    #[error("All {count} image(s) failed")]
    AllImagesFailed { count: usize },

    #[error("Failed to write JSON report: {0}")]
    Report(#[source] serde_json::Error),
}

impl BoxsightError {
    /// Process exit code for this error: 2 for configuration problems, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            BoxsightError::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Writing an output image failed.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Why a single image did not make it to `Saved`.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("vision request failed: {0}")]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Parse(#[from] ParseFailure),

    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("cancelled before the request was sent")]
    Cancelled,
}

impl ImageError {
    /// Short machine-readable category used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ImageError::Input(_) => "input",
            ImageError::Vision(_) => "vision",
            ImageError::Parse(_) => "parse",
            ImageError::Render(_) => "render",
            ImageError::Save(_) => "save",
            ImageError::Cancelled => "cancelled",
        }
    }
}
