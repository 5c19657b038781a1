use serde::Serialize;

use super::concepts::ConceptDirectory;
use super::types::MemoryKind;

/// Per-concept counts.
#[derive(Debug, Serialize)]
pub struct ConceptStats {
    pub concept_id: String,
    pub static_count: usize,
    pub dynamic_count: usize,
    pub visual_facts: usize,
    pub has_portrait: bool,
}

/// Response from memory_stats.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_concepts: usize,
    pub static_memories: usize,
    pub dynamic_memories: usize,
    pub with_portrait: usize,
    pub concepts: Vec<ConceptStats>,
}

/// Compute statistics over every concept in `directory` as currently loaded.
pub fn memory_stats(directory: &ConceptDirectory) -> StatsResponse {
    let concepts: Vec<ConceptStats> = directory
        .stores()
        .iter()
        .map(|store| {
            let static_memory = store.read(MemoryKind::Static);
            ConceptStats {
                concept_id: store.concept_id().to_string(),
                static_count: static_memory.len(),
                dynamic_count: store.read(MemoryKind::Dynamic).len(),
                visual_facts: static_memory
                    .iter()
                    .filter(|m| m.to_lowercase().contains("visual"))
                    .count(),
                has_portrait: store.portrait_path().exists(),
            }
        })
        .collect();

    StatsResponse {
        total_concepts: concepts.len(),
        static_memories: concepts.iter().map(|c| c.static_count).sum(),
        dynamic_memories: concepts.iter().map(|c| c.dynamic_count).sum(),
        with_portrait: concepts.iter().filter(|c| c.has_portrait).count(),
        concepts,
    }
}
