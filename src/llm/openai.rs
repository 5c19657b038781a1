use std::time::Duration;

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatModel, ModelError};
use crate::config::ModelConfig;
use crate::vision::{downscale, encode_png_base64};

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint (vLLM, llama.cpp, etc).
pub struct OpenAiChatModel {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_image_side: u32,
    http_client: reqwest::blocking::Client,
}

impl OpenAiChatModel {
    pub fn new(config: &ModelConfig, model_id: String) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build model HTTP client")?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model_id,
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_image_side: config.max_image_side,
            http_client,
        })
    }

    fn build_request(&self, content: MessageContent, max_tokens: u32) -> OpenAiRequest {
        OpenAiRequest {
            model: self.model.clone(),
            messages: vec![OpenAiMessage {
                role: "user",
                content,
            }],
            temperature: self.temperature,
            max_tokens,
        }
    }

    fn image_content(&self, prompt: &str, image: &DynamicImage) -> Result<MessageContent, ModelError> {
        let scaled = downscale(image, self.max_image_side);
        let encoded = encode_png_base64(&scaled).map_err(|e| ModelError::Image(e.to_string()))?;
        Ok(MessageContent::Parts(vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{encoded}"),
                },
            },
            ContentPart::Text {
                text: prompt.to_string(),
            },
        ]))
    }

    fn complete(&self, body: OpenAiRequest) -> Result<String, ModelError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut http_req = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req.send().map_err(|e| ModelError::Transport {
            transient: e.is_connect() || e.is_timeout() || e.is_request(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OpenAiResponse = response
            .json()
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::Malformed("no message content in response".into()))?;
        debug!(model = %self.model, chars = content.len(), "model response received");
        Ok(content)
    }
}

impl ChatModel for OpenAiChatModel {
    fn chat_text(&self, prompt: &str, max_tokens: u32) -> Result<String, ModelError> {
        let body = self.build_request(MessageContent::Text(prompt.to_string()), max_tokens);
        self.complete(body)
    }

    fn chat_img(
        &self,
        prompt: &str,
        image: &DynamicImage,
        max_tokens: u32,
    ) -> Result<String, ModelError> {
        let content = self.image_content(prompt, image)?;
        self.complete(self.build_request(content, max_tokens))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
