//! Client for OpenAI-compatible `/v1/chat/completions` endpoints.
//!
//! Works against OpenAI itself and against local servers (vLLM, llama.cpp,
//! Ollama) that expose the same API with image content parts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{agent, api_url, ClientSettings, EncodedImage, VisionApi, VisionError};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    agent: ureq::Agent,
    url: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, url::ParseError> {
        Ok(Self {
            agent: agent(settings.timeout),
            url: api_url(&settings.endpoint, "v1/chat/completions")?,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            timeout: settings.timeout,
        })
    }

    fn request_body(&self, image: &EncodedImage, prompt: &str) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: json!([
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": image.data_url()}}
                ]),
            }],
            max_tokens: self.max_tokens,
            temperature: 0.0,
        }
    }
}

impl VisionApi for OpenAiClient {
    fn describe(&self, image: &EncodedImage, prompt: &str) -> Result<String, VisionError> {
        debug!(url = %self.url, model = %self.model, "sending chat completion request");

        let mut response = self
            .agent
            .post(self.url.as_str())
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(self.request_body(image, prompt))
            .map_err(|e| VisionError::from_ureq(e, &self.url, self.timeout))?;

        let body: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| VisionError::from_ureq(e, &self.url, self.timeout))?;

        first_choice_text(body)
    }
}

fn first_choice_text(body: ChatResponse) -> Result<String, VisionError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| VisionError::MalformedResponse("no message content in choices".to_string()))
}
