//! Image and text embedding in a shared vector space.
//!
//! Provides the [`Embedder`] trait and a local implementation using CLIP ViT-B/32
//! (512 dimensions, L2-normalized) for both towers. The provider is created via
//! [`create_provider`] from configuration.

pub mod local;

use anyhow::Result;
use image::DynamicImage;

/// Number of dimensions in the embedding vectors (CLIP ViT-B/32 projection).
pub const EMBEDDING_DIM: usize = 512;

/// Trait for embedding images and texts into one comparable space.
///
/// Implementations produce L2-normalized vectors, so a dot product between any two of them
/// (image or text) is their cosine similarity.
pub trait Embedder: Send + Sync {
    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Vec<f32>>>;

    fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Create an embedding provider from config.
///
/// Currently only `"local"` is supported (ONNX Runtime + CLIP).
/// Returns an error if model files are not found; run `tame model download` first.
pub fn create_provider(config: &crate::config::EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalClipEmbedder::new(config)?;
            Ok(Box::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local"),
    }
}

/// Dot product of two vectors; 0 when lengths differ.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
