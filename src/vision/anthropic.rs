//! Anthropic Messages API client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{agent, api_url, ClientSettings, EncodedImage, VisionApi, VisionError};

const API_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicClient {
    agent: ureq::Agent,
    url: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, url::ParseError> {
        Ok(Self {
            agent: agent(settings.timeout),
            url: api_url(&settings.endpoint, "v1/messages")?,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            timeout: settings.timeout,
        })
    }

    fn request_body(&self, image: &EncodedImage, prompt: &str) -> MessagesRequest<'_> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: json!([
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.media_type,
                            "data": image.data,
                        }
                    },
                    {"type": "text", "text": prompt}
                ]),
            }],
        }
    }
}

impl VisionApi for AnthropicClient {
    fn describe(&self, image: &EncodedImage, prompt: &str) -> Result<String, VisionError> {
        debug!(url = %self.url, model = %self.model, "sending messages request");

        let mut response = self
            .agent
            .post(self.url.as_str())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .send_json(self.request_body(image, prompt))
            .map_err(|e| VisionError::from_ureq(e, &self.url, self.timeout))?;

        let body: MessagesResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| VisionError::from_ureq(e, &self.url, self.timeout))?;

        if body.stop_reason.as_deref() == Some("max_tokens") {
            debug!("response was cut off at max_tokens");
        }

        join_text_blocks(body)
    }
}

fn join_text_blocks(body: MessagesResponse) -> Result<String, VisionError> {
    let text: Vec<String> = body
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();
    if text.is_empty() {
        return Err(VisionError::MalformedResponse(
            "no text content in messages response".to_string(),
        ));
    }
    Ok(text.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::Provider;

    fn client() -> AnthropicClient {
        AnthropicClient::new(&ClientSettings {
            provider: Provider::Anthropic,
            endpoint: Url::parse("https://api.anthropic.com").unwrap(),
            api_key: "sk-test".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 1024,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn request_carries_image_then_prompt() {
        let client = client();
        assert_eq!(client.url.as_str(), "https://api.anthropic.com/v1/messages");

        let image = EncodedImage::encode(b"abc", "image/png", 2, 2);
        let body = serde_json::to_value(client.request_body(&image, "find things")).unwrap();
        assert_eq!(body["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(body["max_tokens"], 1024);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert_eq!(content[0]["source"]["data"], "YWJj");
        assert_eq!(content[1]["text"], "find things");
    }

    #[test]
    fn joins_text_blocks() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"[{\"label\":"},{"type":"tool_use","id":"x"},{"type":"text","text":"\"cat\"}]"}],"stop_reason":"end_turn"}"#,
        )
        .unwrap();
        assert_eq!(
            join_text_blocks(body).unwrap(),
            "[{\"label\":\n\"cat\"}]"
        );
    }

    #[test]
    fn empty_content_is_malformed() {
        let body: MessagesResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert!(matches!(
            join_text_blocks(body),
            Err(VisionError::MalformedResponse(_))
        ));
    }
}
