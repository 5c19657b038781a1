use std::time::Duration;

use image::DynamicImage;
use tracing::warn;

use super::{ChatModel, ModelError};
use crate::config::RetryConfig;

/// Retries transient failures of the wrapped model with exponential backoff.
pub struct RetryingModel<M: ChatModel> {
    inner: M,
    config: RetryConfig,
}

impl<M: ChatModel> RetryingModel<M> {
    pub fn new(inner: M, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// `initial * multiplier^attempt`, capped at `max_delay_ms`.
    fn compute_delay(&self, attempt: u32) -> u64 {
        let base = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);
        (base as u64).min(self.config.max_delay_ms)
    }

    fn with_retries(
        &self,
        mut call: impl FnMut() -> Result<String, ModelError>,
    ) -> Result<String, ModelError> {
        let mut attempt = 0;
        loop {
            match call() {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.config.max_retries && e.is_retryable() => {
                    let delay = self.compute_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay,
                        error = %e,
                        "retrying model request"
                    );
                    std::thread::sleep(Duration::from_millis(delay));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<M: ChatModel> ChatModel for RetryingModel<M> {
    fn chat_text(&self, prompt: &str, max_tokens: u32) -> Result<String, ModelError> {
        self.with_retries(|| self.inner.chat_text(prompt, max_tokens))
    }

    fn chat_img(
        &self,
        prompt: &str,
        image: &DynamicImage,
        max_tokens: u32,
    ) -> Result<String, ModelError> {
        self.with_retries(|| self.inner.chat_img(prompt, image, max_tokens))
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
