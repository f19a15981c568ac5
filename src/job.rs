//! Input images: what counts as one, how it is found, and how it is loaded.

use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::BoxsightError;

/// Extensions accepted as input, lowercase.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Prefix added to the file name of every output image.
pub const OUTPUT_PREFIX: &str = "detected_";

#[derive(Debug, Error)]
pub enum InputError {
    #[error("unsupported file type '{extension}' for {path} (expected one of jpg, jpeg, png, gif, webp)")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a JPEG, PNG, GIF or WebP image")]
    NotAnImage { path: PathBuf },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// The image formats that can be sent to the vision API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageKind {
    /// Looks up the kind from a file extension, ignoring case.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            "gif" => Some(ImageKind::Gif),
            "webp" => Some(ImageKind::WebP),
            _ => None,
        }
    }

    /// Identifies the kind from the file's leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match imagesize::image_type(bytes).ok()? {
            imagesize::ImageType::Jpeg => Some(ImageKind::Jpeg),
            imagesize::ImageType::Png => Some(ImageKind::Png),
            imagesize::ImageType::Gif => Some(ImageKind::Gif),
            imagesize::ImageType::Webp => Some(ImageKind::WebP),
            _ => None,
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
            ImageKind::WebP => "image/webp",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Gif => ImageFormat::Gif,
            ImageKind::WebP => ImageFormat::WebP,
        }
    }
}

/// A decoded source image together with its original bytes.
#[derive(Debug)]
pub struct ImageJob {
    pub path: PathBuf,
    /// Kind detected from the content.
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
}

impl ImageJob {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Reads and decodes one image.
///
/// The extension is checked before the file is opened. After reading, the
/// content decides the kind; a mismatch with the extension is only logged.
pub fn load_image(path: &Path) -> Result<ImageJob, InputError> {
    let Some(claimed) = ImageKind::from_extension(path) else {
        return Err(InputError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default(),
        });
    };

    let bytes = fs::read(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let kind = ImageKind::sniff(&bytes).ok_or_else(|| InputError::NotAnImage {
        path: path.to_path_buf(),
    })?;
    if kind != claimed {
        warn!(
            path = %path.display(),
            "extension says {:?} but content is {:?}; using {:?}",
            claimed,
            kind,
            kind
        );
    }

    let image =
        image::load_from_memory_with_format(&bytes, kind.image_format()).map_err(|source| {
            InputError::Decode {
                path: path.to_path_buf(),
                source,
            }
        })?;

    debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "loaded image"
    );

    Ok(ImageJob {
        path: path.to_path_buf(),
        kind,
        bytes,
        image,
    })
}

/// Output location for a source image: `<output_dir>/detected_<file name>`.
pub fn output_path(output_dir: &Path, source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    output_dir.join(format!("{OUTPUT_PREFIX}{name}"))
}

/// Lists the files to process under `input`.
///
/// A file is returned as is. A directory is scanned in file-name order,
/// descending into subdirectories only when `recursive` is set. Hidden
/// entries and `skip_dir` (normally the output directory) are left out.
/// Files with unsupported extensions are still returned so they can be
/// reported.
pub fn discover(
    input: &Path,
    recursive: bool,
    skip_dir: Option<&Path>,
) -> Result<Vec<PathBuf>, BoxsightError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(BoxsightError::InputPath {
            path: input.to_path_buf(),
            message: "no such file or directory".to_string(),
        });
    }

    let skip_dir = skip_dir.and_then(|dir| fs::canonicalize(dir).ok());
    let is_skipped = |entry: &DirEntry| {
        skip_dir.as_deref().is_some_and(|skip| {
            entry.file_type().is_dir()
                && fs::canonicalize(entry.path()).is_ok_and(|path| path == skip)
        })
    };

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    let walker = WalkDir::new(input)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry) && !is_skipped(entry));

    for entry in walker {
        let entry = entry.map_err(|source| BoxsightError::InputPath {
            path: input.to_path_buf(),
            message: format!("failed while traversing directory: {source}"),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        return Err(BoxsightError::NoImagesFound {
            path: input.to_path_buf(),
        });
    }
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}
