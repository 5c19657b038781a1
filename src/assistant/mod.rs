//! The personalized assistant: memory updates from conversation turns, concept
//! identification, context building and question answering, all over one model.

pub mod answer;
pub mod context;
pub mod history;
pub mod prompts;
pub mod update;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use image::DynamicImage;
use tracing::info;

use crate::config::TameConfig;
use crate::identify::ConceptIdentifier;
use crate::llm::{self, ChatModel};
use crate::memory::concepts::ConceptDirectory;
use crate::memory::store::MemoryStore;
use crate::memory::types::MemoryKind;

pub use answer::{expected_choice, extract_choice, QaOutcome};
pub use context::build_context;
pub use history::{BuildSummary, ConceptOutcome};
pub use update::TurnReport;

pub struct Assistant {
    config: TameConfig,
    model: Arc<dyn ChatModel>,
    memory_root: PathBuf,
    directory: Mutex<ConceptDirectory>,
    identifier: ConceptIdentifier,
}

impl Assistant {
    /// Assistant over the configured model, with detector and embedder loaded on first use.
    pub fn from_config(config: TameConfig) -> Result<Self> {
        let model = llm::create_model(&config).context("failed to create model client")?;
        let identifier = ConceptIdentifier::from_config(&config);
        Self::new(config, model, identifier)
    }

    pub fn new(
        config: TameConfig,
        model: Arc<dyn ChatModel>,
        identifier: ConceptIdentifier,
    ) -> Result<Self> {
        let memory_root = config.resolved_memory_root();
        let mut directory = ConceptDirectory::new(&memory_root)
            .with_context(|| format!("memory root {} is unusable", memory_root.display()))?;
        directory.refresh();
        info!(
            model = %model.model_id(),
            memory_root = %memory_root.display(),
            concepts = directory.len(),
            "assistant ready"
        );
        Ok(Self {
            config,
            model,
            memory_root,
            directory: Mutex::new(directory),
            identifier,
        })
    }

    pub fn config(&self) -> &TameConfig {
        &self.config
    }

    pub fn model(&self) -> &dyn ChatModel {
        self.model.as_ref()
    }

    pub fn memory_root(&self) -> &Path {
        &self.memory_root
    }

    pub fn open_store(&self, concept_id: &str) -> Result<MemoryStore> {
        MemoryStore::open(&self.memory_root, concept_id)
    }

    /// True if the concept already has a static or dynamic memory file.
    pub fn memory_exists(&self, concept_id: &str) -> bool {
        let dir = self.memory_root.join(concept_id);
        [MemoryKind::Static, MemoryKind::Dynamic]
            .iter()
            .any(|kind| dir.join(kind.file_name()).exists())
    }

    /// Rescan the memory root so concepts created since startup can be identified.
    pub fn refresh_concepts(&self) {
        self.directory().refresh();
    }

    pub fn directory(&self) -> MutexGuard<'_, ConceptDirectory> {
        // A panic elsewhere leaves the directory readable; the next refresh rebuilds it.
        self.directory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn identify(&self, image: &DynamicImage) -> Option<String> {
        let directory = self.directory();
        self.identifier.identify(image, &directory)
    }

    fn max_tokens(&self) -> u32 {
        self.config.model.max_tokens
    }
}
