//! Local ONNX Runtime CLIP embedder.
//!
//! Implements [`Embedder`] using the CLIP ViT-B/32 vision and text towers via `ort`.
//! Handles image preprocessing (resize, center crop, normalize), tokenization, inference,
//! and L2 normalization.

use std::sync::Mutex;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{l2_normalize, Embedder, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// CLIP context length.
const MAX_SEQ_LEN: usize = 77;

/// CLIP input resolution.
const IMAGE_SIZE: u32 = 224;

/// `<|endoftext|>`; CLIP pads with it so the pooled token stays the first end-of-text.
const PAD_TOKEN_ID: u32 = 49407;

const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

pub const VISION_MODEL_FILE: &str = "vision_model.onnx";
pub const TEXT_MODEL_FILE: &str = "text_model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Local ONNX-based CLIP embedder.
pub struct LocalClipEmbedder {
    vision: Mutex<Session>,
    text: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync. Sessions are behind a Mutex.
// The Mutex guarantees exclusive access during run().
unsafe impl Send for LocalClipEmbedder {}
unsafe impl Sync for LocalClipEmbedder {}

impl LocalClipEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let vision_path = cache_dir.join(VISION_MODEL_FILE);
        let text_path = cache_dir.join(TEXT_MODEL_FILE);
        let tokenizer_path = cache_dir.join(TOKENIZER_FILE);

        for path in [&vision_path, &text_path, &tokenizer_path] {
            anyhow::ensure!(
                path.exists(),
                "{} not found. Run `tame model download` first.",
                path.display()
            );
        }

        let vision = load_session(&vision_path)?;
        let text = load_session(&text_path)?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            pad_id: PAD_TOKEN_ID,
            pad_token: "<|endoftext|>".into(),
            ..Default::default()
        }));

        tracing::info!(tokenizer = %tokenizer_path.display(), "tokenizer loaded");

        Ok(Self {
            vision: Mutex::new(vision),
            text: Mutex::new(text),
            tokenizer,
        })
    }
}

fn load_session(path: &std::path::Path) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .commit_from_file(path)
        .with_context(|| format!("failed to load ONNX model {}", path.display()))?;
    tracing::info!(model = %path.display(), "ONNX model loaded");
    Ok(session)
}

impl Embedder for LocalClipEmbedder {
    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>> {
        if images.is_empty() {
            return Ok(vec![]);
        }

        // Step 1: Preprocess into a flat NCHW buffer
        let plane = (IMAGE_SIZE * IMAGE_SIZE) as usize;
        let mut pixels = Vec::with_capacity(images.len() * 3 * plane);
        for image in images {
            pixels.extend(preprocess(image));
        }
        let shape = vec![
            images.len() as i64,
            3,
            IMAGE_SIZE as i64,
            IMAGE_SIZE as i64,
        ];
        let pixel_tensor = Tensor::from_array((shape, pixels.into_boxed_slice()))?;

        // Step 2: Run the vision tower
        let mut session = self
            .vision
            .lock()
            .map_err(|e| anyhow::anyhow!("vision session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "pixel_values" => pixel_tensor,
        })?;

        let value = outputs
            .get("image_embeds")
            .unwrap_or_else(|| &outputs[0]);
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .context("failed to extract image_embeds tensor")?;

        split_rows(&shape, data, images.len())
    }

    fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        // Step 1: Tokenize
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let mut input_ids_flat = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask_flat = Vec::with_capacity(batch_size * seq_len);
        for encoding in &encodings {
            input_ids_flat.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask_flat.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let input_ids_tensor =
            Tensor::from_array((shape.clone(), input_ids_flat.into_boxed_slice()))?;
        let attention_mask_tensor =
            Tensor::from_array((shape, attention_mask_flat.into_boxed_slice()))?;

        // Step 2: Run the text tower
        let mut session = self
            .text
            .lock()
            .map_err(|e| anyhow::anyhow!("text session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
        })?;

        let value = outputs
            .get("text_embeds")
            .unwrap_or_else(|| &outputs[0]);
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .context("failed to extract text_embeds tensor")?;

        split_rows(&shape, data, batch_size)
    }
}

/// Split a `[batch, EMBEDDING_DIM]` output into normalized rows.
fn split_rows(dims: &[i64], data: &[f32], batch_size: usize) -> Result<Vec<Vec<f32>>> {
    anyhow::ensure!(
        dims.len() == 2 && dims[0] as usize == batch_size && dims[1] == EMBEDDING_DIM as i64,
        "unexpected embedding shape: {dims:?}, expected [{batch_size}, {EMBEDDING_DIM}]"
    );
    Ok(data.chunks(EMBEDDING_DIM).map(l2_normalize).collect())
}

/// CLIP preprocessing: shortest side to 224, center crop, scale to [0, 1], normalize, CHW.
fn preprocess(image: &DynamicImage) -> Vec<f32> {
    let (w, h) = (image.width().max(1), image.height().max(1));
    let scale = IMAGE_SIZE as f32 / w.min(h) as f32;
    let (nw, nh) = (
        ((w as f32 * scale).round() as u32).max(IMAGE_SIZE),
        ((h as f32 * scale).round() as u32).max(IMAGE_SIZE),
    );
    let resized = image.resize_exact(nw, nh, FilterType::CatmullRom);
    let left = (nw - IMAGE_SIZE) / 2;
    let top = (nh - IMAGE_SIZE) / 2;
    let rgb = resized.crop_imm(left, top, IMAGE_SIZE, IMAGE_SIZE).to_rgb8();

    let plane = (IMAGE_SIZE * IMAGE_SIZE) as usize;
    let mut out = vec![0.0f32; 3 * plane];
    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = (pixel[c] as f32 / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c];
        }
    }
    out
}
