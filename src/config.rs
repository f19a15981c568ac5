//! Run configuration.
//!
//! Resolution order, later wins: built-in defaults, the optional YAML file,
//! command-line overrides. The API key is looked up last: `api_key` from the
//! file, else the environment variable named by `api_key_env` (a `.env` file
//! in the working directory is loaded first).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::vision::{ClientSettings, Provider};

pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no API key found: set `api_key` in the config file or the {var} environment variable")]
    MissingCredential { var: String },

    #[error("invalid endpoint URL '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("endpoint '{endpoint}' must use http or https")]
    UnsupportedScheme { endpoint: String },

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// The YAML config file. Every field is optional.
///
/// ```yaml
/// provider: anthropic
/// model: claude-3-5-sonnet-20241022
/// api_key_env: ANTHROPIC_API_KEY
/// timeout_secs: 60
/// output_dir: annotated
/// font: /usr/share/fonts/truetype/dejavu/DejaVuSans.ttf
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub font: Option<PathBuf>,
    pub seed: Option<u64>,
    pub recursive: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        // An empty file deserializes to a YAML null.
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values given on the command line.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub seed: Option<u64>,
    pub font: Option<PathBuf>,
    pub recursive: bool,
}

/// Fully resolved settings for one run.
#[derive(Clone, Debug)]
pub struct Config {
    pub client: ClientSettings,
    pub retries: u32,
    pub output_dir: PathBuf,
    pub font: Option<PathBuf>,
    pub seed: Option<u64>,
    pub recursive: bool,
}

impl Config {
    /// Reads the config file (if any), `.env` and the process environment.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) => {
                debug!(path = %path.display(), "reading config file");
                FileConfig::read(path)?
            }
            None => FileConfig::default(),
        };
        dotenv::dotenv().ok();
        Self::resolve(file, overrides, |var| std::env::var(var).ok())
    }

    /// Merges the layers. `env` looks up environment variables.
    pub fn resolve(
        file: FileConfig,
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let provider = overrides.provider.or(file.provider).unwrap_or_default();

        let endpoint_text = overrides
            .endpoint
            .or(file.endpoint)
            .unwrap_or_else(|| provider.default_endpoint().to_string());
        let endpoint = parse_endpoint(&endpoint_text)?;

        let timeout_secs = overrides
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout",
                message: "must be at least 1 second".to_string(),
            });
        }

        let max_tokens = file.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_tokens",
                message: "must be positive".to_string(),
            });
        }

        let model = overrides
            .model
            .or(file.model)
            .unwrap_or_else(|| provider.default_model().to_string());

        let key_var = file
            .api_key_env
            .unwrap_or_else(|| provider.default_key_env().to_string());
        let api_key = file
            .api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env(&key_var).filter(|key| !key.trim().is_empty()))
            .ok_or(ConfigError::MissingCredential { var: key_var })?;

        Ok(Self {
            client: ClientSettings {
                provider,
                endpoint,
                api_key,
                model,
                max_tokens,
                timeout: Duration::from_secs(timeout_secs),
            },
            retries: overrides.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES),
            output_dir: overrides
                .output_dir
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            font: overrides.font.or(file.font),
            seed: overrides.seed.or(file.seed),
            recursive: overrides.recursive || file.recursive.unwrap_or(false),
        })
    }
}

fn parse_endpoint(text: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(text).map_err(|source| ConfigError::InvalidEndpoint {
        endpoint: text.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::UnsupportedScheme {
            endpoint: text.to_string(),
        }),
    }
}
