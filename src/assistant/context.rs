use image::DynamicImage;
use tracing::{error, info, warn};

use super::{prompts, Assistant};

pub const NO_DYNAMIC_PLACEHOLDER: &str = "No recent contextual information available.";

/// Render a concept's memory. The static section is omitted when empty; the dynamic
/// section always appears, with a placeholder when empty.
pub fn build_context(concept_id: &str, static_memory: &[String], dynamic_memory: &[String]) -> String {
    let mut parts = vec![format!("Concept ID: {concept_id}\n")];

    if !static_memory.is_empty() {
        parts.push("## STATIC MEMORY".to_string());
        parts.extend(static_memory.iter().map(|m| format!("- {m}")));
    }

    parts.push("\n## DYNAMIC MEMORY".to_string());
    if dynamic_memory.is_empty() {
        parts.push(NO_DYNAMIC_PLACEHOLDER.to_string());
    } else {
        parts.extend(dynamic_memory.iter().map(|m| format!("- {m}")));
    }

    parts.join("\n")
}

impl Assistant {
    /// Memory context for `concept_id`. With a question, the model reduces it to the
    /// relevant items and its raw answer is returned; if that call fails the full context is
    /// used instead.
    pub fn get_context(
        &self,
        concept_id: &str,
        question: Option<&str>,
        image: Option<&DynamicImage>,
    ) -> String {
        if concept_id.is_empty() {
            error!("concept_id cannot be empty");
            return String::new();
        }
        let store = match self.open_store(concept_id) {
            Ok(store) => store,
            Err(e) => {
                error!(concept_id, error = %e, "failed to open memory store");
                return String::new();
            }
        };
        let context = build_context(concept_id, &store.read_static(), &store.read_dynamic());

        let Some(question) = question.filter(|q| !q.trim().is_empty()) else {
            return context;
        };

        let prompt = prompts::alignment(&context, question, image.is_some());
        match self.model.chat(&prompt, image, self.max_tokens()) {
            Ok(aligned) => {
                info!(
                    concept_id,
                    question = %question.chars().take(50).collect::<String>(),
                    "memory aligned to question"
                );
                aligned
            }
            Err(e) => {
                warn!(concept_id, error = %e, "memory alignment failed, using full context");
                context
            }
        }
    }
}
