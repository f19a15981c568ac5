//! Boxsight: labelled bounding boxes from a hosted vision model.
//!
//! Boxsight sends each input image to a vision-capable model, asks for the
//! objects it can see as a JSON list of labels, confidences and pixel
//! boxes, and draws the result onto a copy of the image. The model's answer
//! is treated as untrusted text: it is searched for JSON, falls back to a
//! line-oriented scan, and every box is validated against the image before
//! anything is drawn.
//!
//! # Modules
//!
//! - [`geometry`]: Bounding box and coordinate types
//! - [`color`]: Golden-ratio color palette
//! - [`parse`]: Model response parsing and validation
//! - [`render`]: Drawing boxes and captions
//! - [`vision`]: Vision API trait and HTTP clients
//! - [`job`]: Input discovery and image loading
//! - [`pipeline`]: Per-image orchestration and batch reporting
//! - [`config`]: Configuration file, CLI overrides and credentials
//! - [`error`]: Error types

pub mod color;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod job;
pub mod parse;
pub mod pipeline;
pub mod render;
pub mod vision;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use tracing::{debug, info, warn, Level};

pub use color::{Color, ColorPalette};
pub use config::{Config, ConfigError};
pub use detection::Detection;
pub use error::BoxsightError;
pub use parse::{parse_response, ParseFailure, ParseHit, ParsedResponse};
pub use pipeline::{BatchSummary, ImageOutcome, JobState, Pipeline};
pub use render::BoxRenderer;
pub use vision::{EncodedImage, VisionApi, VisionError};

/// Exit code used when the run is interrupted with Ctrl-C.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// How long an interrupted run may keep going before it is killed.
const FORCED_EXIT_GRACE: Duration = Duration::from_secs(30);

/// The boxsight CLI application.
#[derive(Parser)]
#[command(name = "boxsight")]
#[command(version, author, about)]
struct Cli {
    /// Image file or directory of images. Asked for on stdin when omitted.
    path: Option<PathBuf>,

    /// YAML configuration file.
    #[arg(long, env = "BOXSIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Vision API to use.
    #[arg(long, value_enum)]
    provider: Option<vision::Provider>,

    /// Model name sent with each request.
    #[arg(long)]
    model: Option<String>,

    /// Base URL of the API (e.g. https://api.anthropic.com).
    #[arg(long)]
    endpoint: Option<String>,

    /// Directory for annotated images [default: output].
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Request timeout in seconds [default: 120].
    #[arg(long)]
    timeout: Option<u64>,

    /// Retries for transient API failures [default: 2].
    #[arg(long)]
    retries: Option<u32>,

    /// Seed for the box color sequence.
    #[arg(long)]
    seed: Option<u64>,

    /// TrueType/OpenType font for captions.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Descend into subdirectories.
    #[arg(long)]
    recursive: bool,

    /// Format of the summary printed at the end.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,

    /// More log output (repeat for trace).
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

/// Run the boxsight CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), BoxsightError> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let overrides = config::Overrides {
        provider: cli.provider,
        model: cli.model,
        endpoint: cli.endpoint,
        output_dir: cli.output_dir,
        timeout_secs: cli.timeout,
        retries: cli.retries,
        seed: cli.seed,
        font: cli.font,
        recursive: cli.recursive,
    };
    // Configuration problems stop the run before any image is touched.
    let config = Config::load(cli.config.as_deref(), overrides)?;
    debug!(
        provider = %config.client.provider,
        model = %config.client.model,
        endpoint = %config.client.endpoint,
        "configuration resolved"
    );

    let input = match cli.path {
        Some(path) => path,
        None => prompt_for_path()?,
    };
    let paths = job::discover(&input, config.recursive, Some(&config.output_dir))?;
    info!("found {} file(s) under {}", paths.len(), input.display());

    let client = vision::connect(&config.client).map_err(|source| {
        ConfigError::InvalidEndpoint {
            endpoint: config.client.endpoint.to_string(),
            source,
        }
    })?;
    let cancel = install_cancel_handler();
    let api = vision::Retrying::new(client, config.retries).with_cancel_flag(Arc::clone(&cancel));

    let palette = match config.seed {
        Some(seed) => ColorPalette::seeded(seed),
        None => ColorPalette::from_entropy(),
    };
    debug!(seed = palette.seed(), "color palette ready");

    let renderer = BoxRenderer::discover(config.font.as_deref());
    if !renderer.has_font() {
        debug!("captions will be drawn without text");
    }
    let mut pipeline = Pipeline::new(Box::new(api), renderer, palette, config.output_dir)
        .with_cancel_flag(cancel);
    info!("writing annotated images to {}", pipeline.output_dir().display());

    let summary = pipeline.run(&paths);

    match cli.report {
        ReportFormat::Text => println!("{summary}"),
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&summary).map_err(BoxsightError::Report)?;
            println!("{json}");
        }
    }

    if summary.all_failed() {
        return Err(BoxsightError::AllImagesFailed {
            count: summary.total(),
        });
    }
    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Sets the returned flag on Ctrl-C so the batch stops before the next request.
///
/// A second Ctrl-C, or a request that is still running after
/// [`FORCED_EXIT_GRACE`], ends the process with exit code 130.
fn install_cancel_handler() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let installed = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            warn!("interrupted again; exiting now");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        warn!("interrupted; finishing the current image and skipping the rest (Ctrl-C again to exit now)");
        thread::spawn(|| {
            thread::sleep(FORCED_EXIT_GRACE);
            warn!("still busy {}s after interrupt; exiting", FORCED_EXIT_GRACE.as_secs());
            std::process::exit(INTERRUPTED_EXIT_CODE);
        });
    });
    if let Err(e) = installed {
        warn!("could not install Ctrl-C handler: {e}");
    }
    cancel
}

fn prompt_for_path() -> Result<PathBuf, BoxsightError> {
    let mut stdout = io::stdout();
    write!(stdout, "Enter the path to an image or a directory of images: ")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let trimmed = line.trim().trim_matches(|c| c == '"' || c == '\'');
    if trimmed.is_empty() {
        return Err(BoxsightError::InputPath {
            path: PathBuf::new(),
            message: "no path given".to_string(),
        });
    }
    Ok(PathBuf::from(trimmed))
}
