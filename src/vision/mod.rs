//! Vision model access.
//!
//! The rest of the crate only sees the [`VisionApi`] trait: image plus prompt
//! in, response text out. Two HTTP implementations are provided, one for the
//! Anthropic Messages API and one for OpenAI-compatible chat completions.
//! Any `Fn(&EncodedImage, &str) -> Result<String, VisionError>` closure is
//! also a `VisionApi`, which is how tests stand in for the network.

mod anthropic;
mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// Delay before the first retry; doubled for every further attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// An image ready to be sent to a vision model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    /// Standard base64 of the original file bytes.
    pub data: String,
    /// MIME type, e.g. `image/jpeg`.
    pub media_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn encode(bytes: &[u8], media_type: &'static str, width: u32, height: u32) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            media_type,
            width,
            height,
        }
    }

    /// `data:<media type>;base64,<data>`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("could not reach {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("authentication rejected (HTTP {0}); check the API key")]
    Authentication(u16),
    #[error("rate limited by the API (HTTP 429)")]
    RateLimited,
    #[error("API returned HTTP {0}")]
    Http(u16),
    #[error("malformed API response: {0}")]
    MalformedResponse(String),
}

impl VisionError {
    /// Transport failures, timeouts, rate limiting and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            VisionError::Transport { .. } | VisionError::Timeout(_) | VisionError::RateLimited => {
                true
            }
            VisionError::Http(status) => *status >= 500,
            VisionError::Authentication(_) | VisionError::MalformedResponse(_) => false,
        }
    }

    fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => VisionError::Authentication(status),
            429 => VisionError::RateLimited,
            _ => VisionError::Http(status),
        }
    }

    fn from_ureq(err: ureq::Error, endpoint: &Url, timeout: Duration) -> Self {
        match err {
            ureq::Error::StatusCode(status) => Self::from_status(status),
            ureq::Error::Timeout(_) => VisionError::Timeout(timeout),
            ureq::Error::Json(e) => VisionError::MalformedResponse(e.to_string()),
            other => VisionError::Transport {
                endpoint: endpoint.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Something that can look at an image and answer a prompt.
pub trait VisionApi {
    fn describe(&self, image: &EncodedImage, prompt: &str) -> Result<String, VisionError>;
}

impl<F> VisionApi for F
where
    F: Fn(&EncodedImage, &str) -> Result<String, VisionError>,
{
    fn describe(&self, image: &EncodedImage, prompt: &str) -> Result<String, VisionError> {
        self(image, prompt)
    }
}

/// Which HTTP API to talk to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Anthropic Messages API.
    #[default]
    Anthropic,
    /// OpenAI-compatible chat completions.
    #[value(name = "openai")]
    OpenAi,
}

impl Provider {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com/",
            Provider::OpenAi => "https://api.openai.com/",
        }
    }

    /// Environment variable that holds the API key when the config file has none.
    pub fn default_key_env(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-3-5-sonnet-20241022",
            Provider::OpenAi => "gpt-4o",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

/// Everything an HTTP client needs to make requests.
#[derive(Clone, Debug)]
pub struct ClientSettings {
    pub provider: Provider,
    pub endpoint: Url,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Builds the HTTP client for `settings.provider`.
pub fn connect(settings: &ClientSettings) -> Result<Box<dyn VisionApi>, url::ParseError> {
    Ok(match settings.provider {
        Provider::Anthropic => Box::new(AnthropicClient::new(settings)?),
        Provider::OpenAi => Box::new(OpenAiClient::new(settings)?),
    })
}

/// Joins `path` onto `base`, treating `base` as a directory even without a
/// trailing slash.
pub(crate) fn api_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path)
}

pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    config.into()
}

/// The instruction sent with every image.
pub fn detection_prompt(width: u32, height: u32) -> String {
    format!(
        "Detect every distinct object in this image. The image is {width} pixels wide and \
         {height} pixels tall.\n\
         \n\
         Respond with only a JSON array, no prose and no markdown. Each element must be:\n\
         {{\"label\": \"<short object name>\", \"confidence\": <number between 0 and 1>, \
         \"box\": [x_min, y_min, x_max, y_max]}}\n\
         \n\
         Box coordinates are integer pixels with the origin at the top-left corner, \
         0 <= x_min < x_max <= {max_x} and 0 <= y_min < y_max <= {max_y}. \
         Boxes should tightly wrap each object. \
         If nothing is recognizable, respond with [].",
        max_x = width.saturating_sub(1),
        max_y = height.saturating_sub(1),
    )
}

/// Longest single sleep between cancel checks while backing off.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Retries transient failures with exponential backoff.
///
/// When the cancel flag is set, the last error is returned instead of
/// sleeping or sending another request.
pub struct Retrying {
    inner: Box<dyn VisionApi>,
    retries: u32,
    base_delay: Duration,
    cancel: Arc<AtomicBool>,
}

impl Retrying {
    pub fn new(inner: Box<dyn VisionApi>, retries: u32) -> Self {
        Self {
            inner,
            retries,
            base_delay: DEFAULT_RETRY_DELAY,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Shares a cancel flag, normally the one the pipeline checks.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Sleeps for `delay`, waking early when cancelled. Returns false if cancelled.
    fn back_off(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}

impl VisionApi for Retrying {
    fn describe(&self, image: &EncodedImage, prompt: &str) -> Result<String, VisionError> {
        let mut attempt = 0;
        loop {
            match self.inner.describe(image, prompt) {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.retries && !self.is_cancelled() => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        "vision request failed ({e}); retry {attempt}/{} in {}ms",
                        self.retries,
                        delay.as_millis()
                    );
                    if !self.back_off(delay) {
                        warn!("cancelled; not retrying");
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn image() -> EncodedImage {
        EncodedImage::encode(b"not really a png", "image/png", 4, 3)
    }

    #[test]
    fn data_url_embeds_media_type() {
        let encoded = EncodedImage::encode(b"hi", "image/gif", 1, 1);
        assert_eq!(encoded.data, "aGk=");
        assert_eq!(encoded.data_url(), "data:image/gif;base64,aGk=");
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(
            VisionError::from_status(401),
            VisionError::Authentication(401)
        ));
        assert!(matches!(VisionError::from_status(429), VisionError::RateLimited));
        assert!(VisionError::from_status(503).is_transient());
        assert!(!VisionError::from_status(400).is_transient());
        assert!(!VisionError::Authentication(403).is_transient());
        assert!(!VisionError::MalformedResponse("x".into()).is_transient());
    }

    #[test]
    fn closures_are_vision_apis() {
        let api = |image: &EncodedImage, prompt: &str| -> Result<String, VisionError> {
            Ok(format!("{} {}", image.width, prompt.len()))
        };
        assert_eq!(api.describe(&image(), "abc").unwrap(), "4 3");
    }

    #[test]
    fn retries_transient_errors_up_to_the_limit() {
        let calls = std::rc::Rc::new(Cell::new(0));
        let counter = calls.clone();
        let flaky = move |_: &EncodedImage, _: &str| -> Result<String, VisionError> {
            counter.set(counter.get() + 1);
            Err(VisionError::RateLimited)
        };
        let retrying = Retrying::new(Box::new(flaky), 2).with_base_delay(Duration::ZERO);
        assert!(matches!(
            retrying.describe(&image(), "p"),
            Err(VisionError::RateLimited)
        ));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn recovers_after_a_transient_error() {
        let calls = std::rc::Rc::new(Cell::new(0));
        let counter = calls.clone();
        let flaky = move |_: &EncodedImage, _: &str| -> Result<String, VisionError> {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                Err(VisionError::Http(502))
            } else {
                Ok("[]".to_string())
            }
        };
        let retrying = Retrying::new(Box::new(flaky), 2).with_base_delay(Duration::ZERO);
        assert_eq!(retrying.describe(&image(), "p").unwrap(), "[]");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn stops_retrying_once_cancelled() {
        let cancel = Arc::new(AtomicBool::new(false));
        let calls = std::rc::Rc::new(Cell::new(0));
        let counter = calls.clone();
        let flag = Arc::clone(&cancel);
        let flaky = move |_: &EncodedImage, _: &str| -> Result<String, VisionError> {
            counter.set(counter.get() + 1);
            flag.store(true, Ordering::SeqCst);
            Err(VisionError::RateLimited)
        };
        let retrying = Retrying::new(Box::new(flaky), 3)
            .with_base_delay(Duration::ZERO)
            .with_cancel_flag(cancel);
        assert!(matches!(
            retrying.describe(&image(), "p"),
            Err(VisionError::RateLimited)
        ));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cancel_cuts_the_backoff_short() {
        let cancel = Arc::new(AtomicBool::new(false));
        let answer = |_: &EncodedImage, _: &str| -> Result<String, VisionError> { Ok(String::new()) };
        let retrying =
            Retrying::new(Box::new(answer), 1).with_cancel_flag(Arc::clone(&cancel));
        assert!(retrying.back_off(Duration::ZERO));

        cancel.store(true, Ordering::SeqCst);
        let started = Instant::now();
        assert!(!retrying.back_off(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn does_not_retry_authentication_errors() {
        let calls = std::rc::Rc::new(Cell::new(0));
        let counter = calls.clone();
        let denied = move |_: &EncodedImage, _: &str| -> Result<String, VisionError> {
            counter.set(counter.get() + 1);
            Err(VisionError::Authentication(401))
        };
        let retrying = Retrying::new(Box::new(denied), 5).with_base_delay(Duration::ZERO);
        assert!(retrying.describe(&image(), "p").is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn api_url_keeps_base_path() {
        let base = Url::parse("http://localhost:8080/proxy").unwrap();
        assert_eq!(
            api_url(&base, "v1/messages").unwrap().as_str(),
            "http://localhost:8080/proxy/v1/messages"
        );
        let root = Url::parse("https://api.anthropic.com").unwrap();
        assert_eq!(
            api_url(&root, "v1/messages").unwrap().as_str(),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn prompt_states_size_and_format() {
        let prompt = detection_prompt(640, 480);
        assert!(prompt.contains("640 pixels wide"));
        assert!(prompt.contains("480 pixels tall"));
        assert!(prompt.contains("x_max <= 639"));
        assert!(prompt.contains("\"box\": [x_min, y_min, x_max, y_max]"));
    }
}
