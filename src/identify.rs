//! Concept identification: which known concept does an image show?
//!
//! Candidate regions come from the detector (whole image when it finds nothing), every
//! candidate is scored against every concept's retrieval target as
//! `image_weight * image_sim + text_weight * text_sim`, and the single best
//! (candidate, concept) pair decides. Ties go to the first pair in candidate-major order.
//! The detector and embedder are heavy to build, so both are created on first use and at
//! most once.

use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Result};
use image::DynamicImage;
use tracing::{debug, error, info, warn};

use crate::config::{DetectionConfig, RetrievalConfig, TameConfig};
use crate::embedding::{self, dot, Embedder};
use crate::memory::concepts::ConceptDirectory;
use crate::vision::{self, Detector};

type Factory<T> = Box<dyn Fn() -> Result<Arc<T>> + Send + Sync>;

/// A collaborator built by `factory` on first access. The outcome, success or failure, is
/// memoized; the factory never runs twice.
pub struct LazyCollaborator<T: ?Sized> {
    name: &'static str,
    cell: OnceLock<Result<Arc<T>, String>>,
    factory: Factory<T>,
}

impl<T: ?Sized> LazyCollaborator<T> {
    pub fn new(
        name: &'static str,
        factory: impl Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            cell: OnceLock::new(),
            factory: Box::new(factory),
        }
    }

    /// Already-built collaborator; the accessor never calls a factory.
    pub fn ready(name: &'static str, value: Arc<T>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(value));
        Self {
            name,
            cell,
            factory: Box::new(move || Err(anyhow!("{name} has no factory"))),
        }
    }

    pub fn get(&self) -> Result<Arc<T>> {
        self.cell
            .get_or_init(|| {
                info!("loading {} (lazy-loaded)", self.name);
                (self.factory)().map_err(|e| format!("{e:#}"))
            })
            .clone()
            .map_err(|e| anyhow!("{} unavailable: {e}", self.name))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Best (candidate, concept) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub candidate: usize,
    pub concept: usize,
    pub score: f32,
}

/// Score every candidate against every concept and return the maximum.
///
/// `concept_images[k]` is `None` for a concept without a portrait; its image similarity is 0.
/// Scanning is candidate-major and only a strictly greater score replaces the current best,
/// so the earliest pair wins a tie.
pub fn select_best_match(
    queries: &[Vec<f32>],
    concept_images: &[Option<Vec<f32>>],
    concept_texts: &[Vec<f32>],
    weights: &RetrievalConfig,
) -> Option<Match> {
    let mut best: Option<Match> = None;
    for (candidate, query) in queries.iter().enumerate() {
        for (concept, text) in concept_texts.iter().enumerate() {
            let image_sim = concept_images
                .get(concept)
                .and_then(Option::as_ref)
                .map_or(0.0, |portrait| dot(query, portrait));
            let text_sim = dot(query, text);
            let score = weights.image_weight * image_sim + weights.text_weight * text_sim;
            if best.map_or(true, |b| score > b.score) {
                best = Some(Match {
                    candidate,
                    concept,
                    score,
                });
            }
        }
    }
    best
}

pub struct ConceptIdentifier {
    detector: LazyCollaborator<dyn Detector>,
    embedder: LazyCollaborator<dyn Embedder>,
    detection: DetectionConfig,
    weights: RetrievalConfig,
}

impl ConceptIdentifier {
    /// Identifier whose collaborators are built from `config` on first use.
    pub fn from_config(config: &TameConfig) -> Self {
        let detection = config.detection.clone();
        let embedding_config = config.embedding.clone();
        let detector_config = detection.clone();
        Self {
            detector: LazyCollaborator::new("detector", move || {
                vision::create_detector(&detector_config).map(Arc::from)
            }),
            embedder: LazyCollaborator::new("embedder", move || {
                embedding::create_provider(&embedding_config).map(Arc::from)
            }),
            detection,
            weights: config.retrieval.clone(),
        }
    }

    /// Identifier over already-built collaborators.
    pub fn with_collaborators(
        detector: Arc<dyn Detector>,
        embedder: Arc<dyn Embedder>,
        detection: DetectionConfig,
        weights: RetrievalConfig,
    ) -> Self {
        Self {
            detector: LazyCollaborator::ready("detector", detector),
            embedder: LazyCollaborator::ready("embedder", embedder),
            detection,
            weights,
        }
    }

    pub fn detector(&self) -> Result<Arc<dyn Detector>> {
        self.detector.get()
    }

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.embedder.get()
    }

    /// Candidate regions for `image`. Never empty: the whole image stands in when detection
    /// finds nothing or fails.
    pub fn candidates(&self, image: &DynamicImage) -> Vec<DynamicImage> {
        let crops = self
            .detector()
            .and_then(|detector| vision::detect_and_crop(detector.as_ref(), image, &self.detection));
        match crops {
            Ok(crops) if !crops.is_empty() => {
                debug!(count = crops.len(), "candidate regions detected");
                crops
            }
            Ok(_) => {
                info!("no objects detected, using original image");
                vec![image.clone()]
            }
            Err(e) => {
                warn!(error = %e, "detection failed, using original image");
                vec![image.clone()]
            }
        }
    }

    /// Identify the concept shown in `image`. `None` when no concepts are known or the
    /// embedder fails.
    pub fn identify(&self, image: &DynamicImage, directory: &ConceptDirectory) -> Option<String> {
        if directory.is_empty() {
            warn!("no concept profiles available");
            return None;
        }
        let candidates = self.candidates(image);
        match self.rank(&candidates, directory) {
            Ok(Some(best)) => {
                let concept_id = directory.concept_id_at(best.concept)?;
                info!(
                    concept_id = %concept_id,
                    candidate = best.candidate,
                    score = best.score,
                    "concept identified"
                );
                Some(concept_id.to_string())
            }
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "concept retrieval failed");
                None
            }
        }
    }

    fn rank(&self, candidates: &[DynamicImage], directory: &ConceptDirectory) -> Result<Option<Match>> {
        let embedder = self.embedder()?;
        let targets = directory.retrieval_targets();

        let queries = embedder.embed_images(candidates)?;

        let portraits: Vec<DynamicImage> = targets
            .iter()
            .filter_map(|t| t.portrait.clone())
            .collect();
        let mut portrait_vectors = embedder.embed_images(&portraits)?.into_iter();
        let concept_images: Vec<Option<Vec<f32>>> = targets
            .iter()
            .map(|t| t.portrait.as_ref().and_then(|_| portrait_vectors.next()))
            .collect();

        let texts: Vec<&str> = targets.iter().map(|t| t.visual_text.as_str()).collect();
        let concept_texts = embedder.embed_texts(&texts)?;

        Ok(select_best_match(
            &queries,
            &concept_images,
            &concept_texts,
            &self.weights,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn weights() -> RetrievalConfig {
        RetrievalConfig::default()
    }

    #[test]
    fn weighted_score_prefers_image_similarity() {
        // A: img 0.9, txt 0.1 => 0.66. B: img 0.5, txt 0.9 => 0.62.
        let query = vec![vec![1.0, 0.0]];
        let images = vec![Some(vec![0.9, 0.0]), Some(vec![0.5, 0.0])];
        let texts = vec![vec![0.1, 0.0], vec![0.9, 0.0]];
        let best = select_best_match(&query, &images, &texts, &weights()).unwrap();
        assert_eq!(best.concept, 0);
        assert!((best.score - 0.66).abs() < 1e-5);
    }

    #[test]
    fn missing_portrait_counts_as_zero_image_similarity() {
        let query = vec![vec![1.0, 0.0]];
        let images = vec![None, Some(vec![0.2, 0.0])];
        let texts = vec![vec![1.0, 0.0], vec![0.0, 0.0]];
        // A: 0.3, B: 0.14
        let best = select_best_match(&query, &images, &texts, &weights()).unwrap();
        assert_eq!(best.concept, 0);
        assert!((best.score - 0.3).abs() < 1e-5);
    }

    #[test]
    fn best_pair_spans_all_candidates() {
        let queries = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let images = vec![Some(vec![0.0, 0.2]), Some(vec![1.0, 0.0])];
        let texts = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let best = select_best_match(&queries, &images, &texts, &weights()).unwrap();
        assert_eq!((best.candidate, best.concept), (1, 1));
    }

    #[test]
    fn ties_go_to_first_pair() {
        let queries = vec![vec![1.0], vec![1.0]];
        let images = vec![Some(vec![0.5]), Some(vec![0.5])];
        let texts = vec![vec![0.5], vec![0.5]];
        let best = select_best_match(&queries, &images, &texts, &weights()).unwrap();
        assert_eq!((best.candidate, best.concept), (0, 0));
    }

    #[test]
    fn no_concepts_or_candidates_means_no_match() {
        assert!(select_best_match(&[vec![1.0]], &[], &[], &weights()).is_none());
        assert!(select_best_match(&[], &[None], &[vec![1.0]], &weights()).is_none());
    }

    #[test]
    fn lazy_collaborator_builds_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy: LazyCollaborator<dyn Detector> = LazyCollaborator::new("detector", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(vision::NullDetector) as Arc<dyn Detector>)
        });
        assert!(!lazy.is_loaded());
        lazy.get().unwrap();
        lazy.get().unwrap();
        assert!(lazy.is_loaded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_collaborator_memoizes_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy: LazyCollaborator<dyn Detector> = LazyCollaborator::new("detector", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("model files missing"))
        });
        let err = lazy.get().err().unwrap().to_string();
        assert!(err.contains("model files missing"));
        assert!(lazy.get().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn from_config_does_not_build_collaborators() {
        let identifier = ConceptIdentifier::from_config(&TameConfig::default());
        assert!(!identifier.detector.is_loaded());
        assert!(!identifier.embedder.is_loaded());
        // the default detector is the null detector, so detection falls back to the image
        let image = DynamicImage::new_rgb8(4, 4);
        assert_eq!(identifier.candidates(&image).len(), 1);
        assert!(identifier.detector.is_loaded());
    }
}
