//! Vision-language model collaborator.
//!
//! Everything that talks to a model goes through [`ChatModel`]: a text-only call and an
//! image-plus-text call, both blocking. [`create_model`] builds the configured backend
//! (an OpenAI-compatible endpoint) wrapped in [`RetryingModel`].

pub mod openai;
pub mod retry;

use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;

use crate::config::TameConfig;

pub use openai::OpenAiChatModel;
pub use retry::RetryingModel;

/// Failure of a single model call.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("request failed: {message}")]
    Transport { message: String, transient: bool },
    #[error("model API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed model response: {0}")]
    Malformed(String),
    #[error("failed to encode image: {0}")]
    Image(String),
}

impl ModelError {
    /// Connection failures, timeouts, rate limiting and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Transport { transient, .. } => *transient,
            ModelError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            ModelError::Malformed(_) | ModelError::Image(_) => false,
        }
    }
}

/// A chat model that accepts text, optionally with one image.
pub trait ChatModel: Send + Sync {
    fn chat_text(&self, prompt: &str, max_tokens: u32) -> Result<String, ModelError>;

    fn chat_img(
        &self,
        prompt: &str,
        image: &DynamicImage,
        max_tokens: u32,
    ) -> Result<String, ModelError>;

    /// Full model id this collaborator serves.
    fn model_id(&self) -> &str;

    /// `chat_img` when an image is attached, otherwise `chat_text`.
    fn chat(
        &self,
        prompt: &str,
        image: Option<&DynamicImage>,
        max_tokens: u32,
    ) -> Result<String, ModelError> {
        match image {
            Some(image) => self.chat_img(prompt, image, max_tokens),
            None => self.chat_text(prompt, max_tokens),
        }
    }
}

/// Build the configured model client with retries.
pub fn create_model(config: &TameConfig) -> Result<Arc<dyn ChatModel>> {
    let inner = OpenAiChatModel::new(&config.model, config.model_id())?;
    Ok(Arc::new(RetryingModel::new(inner, config.model.retry.clone())))
}
