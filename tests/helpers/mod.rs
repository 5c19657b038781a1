#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use tame::assistant::Assistant;
use tame::config::TameConfig;
use tame::embedding::{l2_normalize, Embedder};
use tame::identify::ConceptIdentifier;
use tame::llm::{ChatModel, ModelError};
use tame::memory::store::MemoryStore;
use tame::memory::types::{MemoryEdit, MemoryKind};
use tame::vision::{Detection, Detector, NullDetector};

/// One recorded model call.
#[derive(Debug, Clone)]
pub struct Call {
    pub prompt: String,
    pub with_image: bool,
}

/// Model that answers from a queue of canned responses ("[]" once the queue is empty) and
/// records every prompt it receives.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers "[]" to everything.
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call fails with a server error.
    pub fn failing(count: usize) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(
                (0..count)
                    .map(|_| {
                        Err(ModelError::Api {
                            status: 500,
                            body: "boom".into(),
                        })
                    })
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, prompt: &str, with_image: bool) -> Result<String, ModelError> {
        self.calls.lock().unwrap().push(Call {
            prompt: prompt.to_string(),
            with_image,
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("[]".to_string()))
    }
}

impl ChatModel for ScriptedModel {
    fn chat_text(&self, prompt: &str, _max_tokens: u32) -> Result<String, ModelError> {
        self.respond(prompt, false)
    }

    fn chat_img(
        &self,
        prompt: &str,
        _image: &DynamicImage,
        _max_tokens: u32,
    ) -> Result<String, ModelError> {
        self.respond(prompt, true)
    }

    fn model_id(&self) -> &str {
        "scripted/test-model"
    }
}

/// Model whose answer is computed from the prompt; safe to share across worker threads.
pub struct RuleModel<F>(pub F);

impl<F: Fn(&str) -> String + Send + Sync> ChatModel for RuleModel<F> {
    fn chat_text(&self, prompt: &str, _max_tokens: u32) -> Result<String, ModelError> {
        Ok((self.0)(prompt))
    }

    fn chat_img(
        &self,
        prompt: &str,
        _image: &DynamicImage,
        _max_tokens: u32,
    ) -> Result<String, ModelError> {
        Ok((self.0)(prompt))
    }

    fn model_id(&self) -> &str {
        "rule/test-model"
    }
}

/// Embeds an image as its normalized mean colour and a text by the colour words it
/// mentions, so red things land near "red" in one 3-d space.
#[derive(Default)]
pub struct ColorEmbedder {
    image_batches: Mutex<Vec<usize>>,
}

impl ColorEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sizes of every `embed_images` batch, in call order.
    pub fn image_batches(&self) -> Vec<usize> {
        self.image_batches.lock().unwrap().clone()
    }
}

impl Embedder for ColorEmbedder {
    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        self.image_batches.lock().unwrap().push(images.len());
        Ok(images
            .iter()
            .map(|image| {
                let rgb = image.to_rgb8();
                let mut sum = [0.0f32; 3];
                for pixel in rgb.pixels() {
                    for c in 0..3 {
                        sum[c] += pixel[c] as f32;
                    }
                }
                l2_normalize(&sum)
            })
            .collect())
    }

    fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let v = [
                    lower.contains("red") as u8 as f32,
                    lower.contains("green") as u8 as f32,
                    lower.contains("blue") as u8 as f32,
                ];
                l2_normalize(&v)
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        3
    }
}

/// Detector that always reports the same detections.
pub struct CannedDetector(pub Vec<Detection>);

impl Detector for CannedDetector {
    fn detect(&self, _image: &DynamicImage, _labels: &[String]) -> Result<Vec<Detection>> {
        Ok(self.0.clone())
    }
}

pub fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

pub const RED: [u8; 3] = [220, 20, 20];
pub const GREEN: [u8; 3] = [20, 200, 20];

/// Config rooted entirely inside `root`.
pub fn test_config(root: &Path) -> TameConfig {
    let mut config = TameConfig::default();
    config.storage.memory_root = root.join("memory").to_string_lossy().into_owned();
    config.storage.data_root = root.join("data").to_string_lossy().into_owned();
    config.storage.results_dir = root.join("results").to_string_lossy().into_owned();
    config.model.model = "scripted/test-model".into();
    config
}

/// Assistant over the given collaborators.
pub fn assistant_with(
    root: &Path,
    model: Arc<dyn ChatModel>,
    detector: Arc<dyn Detector>,
    embedder: Arc<dyn Embedder>,
) -> Assistant {
    let config = test_config(root);
    let identifier = ConceptIdentifier::with_collaborators(
        detector,
        embedder,
        config.detection.clone(),
        config.retrieval.clone(),
    );
    Assistant::new(config, model, identifier).unwrap()
}

/// Assistant with no detections and the colour embedder.
pub fn assistant(root: &Path, model: Arc<dyn ChatModel>) -> Assistant {
    assistant_with(root, model, Arc::new(NullDetector), ColorEmbedder::new())
}

/// Seed a concept's memory directly, bypassing the model.
pub fn seed(assistant: &Assistant, concept_id: &str, kind: MemoryKind, items: &[&str]) -> MemoryStore {
    let mut store = assistant.open_store(concept_id).unwrap();
    let edits: Vec<MemoryEdit> = items.iter().map(|i| MemoryEdit::add(*i)).collect();
    store.apply_batch(kind, &edits);
    store
}

pub fn fenced(yaml: &str) -> String {
    format!("# Analysis:\n# - noted\n\n```yaml\n{yaml}\n```\n")
}
