//! One conversation turn → memory updates.
//!
//! A turn runs strictly in sequence: dynamic update call, portrait capture, promotion call,
//! then the FIFO cap. A failed model call or unparseable response abandons only its own
//! step; the FIFO cap always runs. Callers must not run two turns for the same concept at
//! once.

use image::DynamicImage;
use serde_yaml::Value;
use tracing::{error, info, warn};

use super::{prompts, Assistant};
use crate::memory::ops;
use crate::memory::store::{validate_concept_id, BatchOutcome, MemoryStore};
use crate::memory::types::MemoryKind;

/// What a turn changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TurnReport {
    /// The turn was refused before touching memory.
    pub aborted: bool,
    pub dynamic_update: BatchOutcome,
    pub promoted_removals: BatchOutcome,
    pub promoted_additions: BatchOutcome,
    pub portrait_saved: bool,
}

impl Assistant {
    /// Update `concept_id`'s memory from one turn of conversation.
    pub fn record_turn(
        &self,
        concept_id: &str,
        image: Option<&DynamicImage>,
        question: &str,
        answer: &str,
    ) -> TurnReport {
        let mut report = TurnReport::default();

        if let Err(e) = validate_concept_id(concept_id) {
            error!(error = %e, "refusing to record turn");
            report.aborted = true;
            return report;
        }
        let mut store = match self.open_store(concept_id) {
            Ok(store) => store,
            Err(e) => {
                error!(concept_id, error = %e, "failed to open memory store");
                report.aborted = true;
                return report;
            }
        };

        report.dynamic_update = self.update_dynamic(&mut store, image, question, answer);

        let static_memory = store.read_static();
        if static_memory.is_empty() {
            if let Some(image) = image {
                store.save_portrait(image);
                report.portrait_saved = true;
            }
        }

        let dynamic_memory = store.read_dynamic();
        if !dynamic_memory.is_empty() {
            let (removals, additions) =
                self.promote(&mut store, &dynamic_memory, &static_memory, image);
            report.promoted_removals = removals;
            report.promoted_additions = additions;
        }

        store.apply_fifo(self.config.memory.dynamic_max_size);
        report
    }

    fn update_dynamic(
        &self,
        store: &mut MemoryStore,
        image: Option<&DynamicImage>,
        question: &str,
        answer: &str,
    ) -> BatchOutcome {
        let concept_id = store.concept_id().to_string();
        let prompt = prompts::dynamic_update(
            &concept_id,
            &store.read_dynamic(),
            question,
            answer,
            image.is_some(),
        );
        match self.model.chat(&prompt, image, self.max_tokens()) {
            Ok(response) => {
                info!(concept_id = %concept_id, "dynamic memory update: {}", response.replace('\n', " "));
                ops::apply_response(store, &response, MemoryKind::Dynamic)
            }
            Err(e) => {
                error!(concept_id = %concept_id, error = %e, "dynamic memory update call failed");
                BatchOutcome::default()
            }
        }
    }

    /// Move permanent facts out of dynamic memory. Removals from dynamic memory are applied
    /// before additions to static memory; the two lists index different memories.
    fn promote(
        &self,
        store: &mut MemoryStore,
        dynamic_memory: &[String],
        static_memory: &[String],
        image: Option<&DynamicImage>,
    ) -> (BatchOutcome, BatchOutcome) {
        let concept_id = store.concept_id().to_string();
        let prompt = prompts::promotion(&concept_id, dynamic_memory, static_memory);
        let response = match self.model.chat(&prompt, image, self.max_tokens()) {
            Ok(response) => response,
            Err(e) => {
                error!(concept_id = %concept_id, error = %e, "promotion call failed");
                return Default::default();
            }
        };
        info!(concept_id = %concept_id, "static memory update: {}", response.replace('\n', " "));

        let (dynamic_ops, static_ops) = match ops::parse_structured(&response) {
            Some(Value::Mapping(mut map)) => (
                map.remove("dynamic_ops").map(ops::parse_payload).unwrap_or_default(),
                map.remove("static_ops").map(ops::parse_payload).unwrap_or_default(),
            ),
            Some(Value::Null) | None => return Default::default(),
            Some(other) => {
                warn!(concept_id = %concept_id, payload = ?other, "promotion output is not a mapping");
                return Default::default();
            }
        };

        let removals = if dynamic_ops.is_empty() {
            BatchOutcome::default()
        } else {
            ops::apply_entries(store, dynamic_ops, MemoryKind::Dynamic)
        };
        let additions = if static_ops.is_empty() {
            BatchOutcome::default()
        } else {
            ops::apply_entries(store, static_ops, MemoryKind::Static)
        };
        (removals, additions)
    }
}
