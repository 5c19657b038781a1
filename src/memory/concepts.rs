//! Directory of all known concepts under one memory root.
//!
//! [`ConceptDirectory::refresh`] rebuilds the collection from the subdirectories of the root
//! (sorted by name, so concept indices are stable across runs). Retrieval targets are derived
//! on every call from the current static memory; nothing derived is cached.

use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::store::MemoryStore;

/// Text used for a concept whose static memory has no visual facts.
pub const NO_VISUAL_TEXT: &str = "NONE";

/// What a new image is matched against for one concept.
#[derive(Debug, Clone)]
pub struct RetrievalTarget {
    pub portrait: Option<DynamicImage>,
    pub visual_text: String,
}

#[derive(Debug)]
pub struct ConceptDirectory {
    root: PathBuf,
    stores: Vec<MemoryStore>,
}

impl ConceptDirectory {
    /// Create the directory handle, creating `root` if needed. Failing to create the root is
    /// a startup error.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create memory root {}", root.display()))?;
        Ok(Self {
            root,
            stores: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replace the collection with one store per subdirectory of the root.
    pub fn refresh(&mut self) {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                error!(root = %self.root.display(), error = %e, "failed to scan memory root");
                self.stores.clear();
                return;
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        self.stores = names
            .iter()
            .filter_map(|name| match MemoryStore::open(&self.root, name) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!(concept_id = %name, error = %e, "skipping concept directory");
                    None
                }
            })
            .collect();

        info!(root = %self.root.display(), concepts = self.stores.len(), "concept directory refreshed");
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn concept_ids(&self) -> impl Iterator<Item = &str> {
        self.stores.iter().map(MemoryStore::concept_id)
    }

    pub fn stores(&self) -> &[MemoryStore] {
        &self.stores
    }

    pub fn get(&self, concept_id: &str) -> Option<&MemoryStore> {
        self.stores.iter().find(|s| s.concept_id() == concept_id)
    }

    /// One target per concept, in collection order.
    pub fn retrieval_targets(&self) -> Vec<RetrievalTarget> {
        self.stores
            .iter()
            .map(|store| RetrievalTarget {
                portrait: store.read_portrait(),
                visual_text: visual_text(&store.read_static()),
            })
            .collect()
    }

    /// Bounds-checked index → concept id.
    pub fn concept_id_at(&self, index: usize) -> Option<&str> {
        match self.stores.get(index) {
            Some(store) => Some(store.concept_id()),
            None => {
                error!(index, concepts = self.stores.len(), "invalid concept index");
                None
            }
        }
    }
}

/// Static facts mentioning "visual" (any case), one per line, or [`NO_VISUAL_TEXT`].
pub fn visual_text(static_memory: &[String]) -> String {
    let text: String = static_memory
        .iter()
        .filter(|m| m.to_lowercase().contains("visual"))
        .map(|m| format!("{m}\n"))
        .collect();
    if text.is_empty() {
        NO_VISUAL_TEXT.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{MemoryEdit, MemoryKind};
    use tempfile::TempDir;

    #[test]
    fn visual_text_filters_case_insensitively() {
        let facts = vec![
            "Luna has VISUAL white fur".to_string(),
            "Luna likes tuna".to_string(),
            "Visual: green eyes".to_string(),
        ];
        assert_eq!(
            visual_text(&facts),
            "Luna has VISUAL white fur\nVisual: green eyes\n"
        );
        assert_eq!(visual_text(&[]), NO_VISUAL_TEXT);
    }

    #[test]
    fn refresh_replaces_collection_in_sorted_order() {
        let tmp = TempDir::new().unwrap();
        let mut dir = ConceptDirectory::new(tmp.path()).unwrap();
        std::fs::create_dir(tmp.path().join("zed")).unwrap();
        std::fs::create_dir(tmp.path().join("amy")).unwrap();
        std::fs::write(tmp.path().join("stray.txt"), "x").unwrap();

        dir.refresh();
        assert_eq!(dir.concept_ids().collect::<Vec<_>>(), vec!["amy", "zed"]);

        std::fs::remove_dir(tmp.path().join("zed")).unwrap();
        dir.refresh();
        assert_eq!(dir.concept_ids().collect::<Vec<_>>(), vec!["amy"]);
    }

    #[test]
    fn concept_id_at_is_bounds_checked() {
        let tmp = TempDir::new().unwrap();
        let mut dir = ConceptDirectory::new(tmp.path()).unwrap();
        std::fs::create_dir(tmp.path().join("luna")).unwrap();
        dir.refresh();
        assert_eq!(dir.concept_id_at(0), Some("luna"));
        assert_eq!(dir.concept_id_at(1), None);
    }

    #[test]
    fn retrieval_targets_track_current_static_memory() {
        let tmp = TempDir::new().unwrap();
        let mut store = MemoryStore::open(tmp.path(), "luna").unwrap();
        let mut dir = ConceptDirectory::new(tmp.path()).unwrap();
        dir.refresh();

        let targets = dir.retrieval_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].visual_text, NO_VISUAL_TEXT);
        assert!(targets[0].portrait.is_none());

        store.apply_batch(
            MemoryKind::Static,
            &[MemoryEdit::add("Luna has visual white fur")],
        );
        let targets = dir.retrieval_targets();
        assert_eq!(targets[0].visual_text, "Luna has visual white fur\n");
    }
}
