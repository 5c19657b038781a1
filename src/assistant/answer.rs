use std::path::Path;

use image::DynamicImage;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{error, info, warn};

use super::{prompts, Assistant};

pub const INVALID_PARAMETERS: &str = "Error: Invalid parameters provided.";
pub const WRONG_OPTION_COUNT: &str = "Error: Exactly 4 options required.";
pub const IMAGE_UNREADABLE: &str = "Error: Could not open image.";
pub const NOT_IDENTIFIED: &str = "Error: Could not identify any concept in the image.";
pub const GENERATION_FAILED: &str = "Error: Could not generate an answer.";

/// Result of the full question-answering workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaOutcome {
    pub concept_id: Option<String>,
    pub answer: String,
    pub choice: Option<String>,
}

impl QaOutcome {
    fn failed(message: &str) -> Self {
        Self {
            concept_id: None,
            answer: message.to_string(),
            choice: None,
        }
    }
}

fn choice_regex() -> &'static Regex {
    static CHOICE: OnceLock<Regex> = OnceLock::new();
    CHOICE.get_or_init(|| Regex::new("[ABCD]").expect("choice pattern is valid"))
}

/// First option letter in `response`, case-insensitive; `"A"` when there is none.
pub fn extract_choice(response: &str) -> String {
    let upper = response.trim().to_uppercase();
    match choice_regex().find(&upper) {
        Some(m) => m.as_str().to_string(),
        None => {
            warn!(response, "could not extract a choice letter, defaulting to A");
            "A".to_string()
        }
    }
}

/// Letter of the option matching `options_answer`: exact match first, then case-insensitive
/// containment either way. `"Unknown"` when nothing matches.
pub fn expected_choice(options_answer: &str, options: &[String]) -> String {
    if options_answer.trim().is_empty() || options.len() != 4 {
        return "Unknown".to_string();
    }
    let letters = ['A', 'B', 'C', 'D'];

    if let Some(i) = options
        .iter()
        .position(|o| o.trim() == options_answer.trim())
    {
        return letters[i].to_string();
    }

    let wanted = options_answer.trim().to_lowercase();
    if let Some(i) = options.iter().position(|o| {
        let option = o.trim().to_lowercase();
        option.contains(&wanted) || wanted.contains(&option)
    }) {
        return letters[i].to_string();
    }

    warn!(options_answer, ?options, "could not match answer to any option");
    "Unknown".to_string()
}

impl Assistant {
    /// Free-text answer about `concept_id` from `context`.
    pub fn answer_question(
        &self,
        concept_id: &str,
        question: &str,
        context: &str,
        image: Option<&DynamicImage>,
    ) -> String {
        if concept_id.is_empty() || question.is_empty() {
            error!("concept_id and question cannot be empty");
            return INVALID_PARAMETERS.to_string();
        }
        let prompt = prompts::answer(context, question, image.is_some());
        self.model
            .chat(&prompt, image, self.max_tokens())
            .unwrap_or_else(|e| {
                error!(concept_id, error = %e, "answer generation failed");
                GENERATION_FAILED.to_string()
            })
    }

    /// Multiple-choice answer: a single letter A-D.
    pub fn answer_choice_question(
        &self,
        concept_id: &str,
        question: &str,
        options: &[String],
        context: &str,
        image: Option<&DynamicImage>,
    ) -> String {
        if concept_id.is_empty() || question.is_empty() || options.is_empty() {
            error!("concept_id, question and options cannot be empty");
            return INVALID_PARAMETERS.to_string();
        }
        if options.len() != 4 {
            error!(count = options.len(), "exactly 4 options must be provided");
            return WRONG_OPTION_COUNT.to_string();
        }
        let prompt = prompts::choice(context, question, options, image.is_some());
        match self.model.chat(&prompt, image, self.max_tokens()) {
            Ok(response) => extract_choice(&response),
            Err(e) => {
                error!(concept_id, error = %e, "choice generation failed");
                GENERATION_FAILED.to_string()
            }
        }
    }

    /// Identify the concept in the image at `image_path`, then answer `question` about it
    /// (and pick an option when four are given).
    pub fn complete_qa_workflow(
        &self,
        image_path: &Path,
        question: &str,
        options: Option<&[String]>,
    ) -> QaOutcome {
        if image_path.as_os_str().is_empty() || question.is_empty() {
            error!("image path and question cannot be empty");
            return QaOutcome::failed(INVALID_PARAMETERS);
        }

        let image = match image::open(image_path) {
            Ok(image) => DynamicImage::ImageRgb8(image.to_rgb8()),
            Err(e) => {
                error!(path = %image_path.display(), error = %e, "error opening image");
                return QaOutcome::failed(IMAGE_UNREADABLE);
            }
        };

        let Some(concept_id) = self.identify(&image) else {
            return QaOutcome::failed(NOT_IDENTIFIED);
        };
        info!(concept_id = %concept_id, "concept identification");

        let context = self.get_context(&concept_id, Some(question), Some(&image));
        let answer = self.answer_question(&concept_id, question, &context, Some(&image));

        let choice = options.filter(|o| o.len() == 4).map(|options| {
            self.answer_choice_question(&concept_id, question, options, &context, Some(&image))
        });

        QaOutcome {
            concept_id: Some(concept_id),
            answer,
            choice,
        }
    }
}
