//! Per-concept dataset files: conversation history and evaluation questions.
//!
//! Layout under the data root:
//!
//! ```text
//! <concept_id>/history.yaml        turns {image_id?, user_input, assistant_response}
//! <concept_id>/easy_question.yaml  questions
//! <concept_id>/hard_question.yaml
//! <concept_id>/img/<image_id>.png
//! ```
//!
//! Files are written by people and generators alike, so loading is lenient: bad entries are
//! skipped with a warning instead of failing the whole file.

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::memory::scalar_to_string;

/// One recorded exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub image_id: Option<String>,
    pub user_input: String,
    pub assistant_response: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Hard => "hard",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy_question.yaml",
            Difficulty::Hard => "hard_question.yaml",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An evaluation question about one concept.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    pub concept_id: String,
    pub difficulty: Difficulty,
    pub question: String,
    pub image_path: PathBuf,
    pub options: Vec<String>,
    /// Text of the correct option.
    pub answer: String,
    pub ideal_answer: String,
    pub key_points: Vec<String>,
}

/// Sorted names of the concept directories under `data_root`.
pub fn concept_ids(data_root: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(data_root)
        .with_context(|| format!("failed to read data root {}", data_root.display()))?;
    let mut ids: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    ids.sort();
    Ok(ids)
}

pub fn image_path(data_root: &Path, concept_id: &str, image_id: &str) -> PathBuf {
    data_root
        .join(concept_id)
        .join("img")
        .join(format!("{image_id}.png"))
}

/// Open an image as RGB.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let image = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

/// Read a YAML list. A missing or empty file is `Ok(None)`; anything but a list is an error.
fn read_yaml_list(path: &Path) -> Result<Option<Vec<Value>>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match serde_yaml::from_str::<Value>(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?
    {
        Value::Null => Ok(None),
        Value::Sequence(items) => Ok(Some(items)),
        _ => anyhow::bail!("{} is not a YAML list", path.display()),
    }
}

fn text_field(map: &Mapping, key: &str) -> Option<String> {
    map.get(key).and_then(scalar_to_string)
}

/// Load `<data_root>/<concept_id>/history.yaml`. A missing file yields no turns.
pub fn load_history(data_root: &Path, concept_id: &str) -> Result<Vec<HistoryTurn>> {
    let path = data_root.join(concept_id).join("history.yaml");
    let Some(entries) = read_yaml_list(&path)? else {
        warn!(path = %path.display(), "history file missing or empty");
        return Ok(Vec::new());
    };

    let turns = entries
        .iter()
        .filter_map(|entry| {
            let Some(map) = entry.as_mapping() else {
                warn!(turn = ?entry, "invalid turn format, skipping");
                return None;
            };
            Some(HistoryTurn {
                image_id: text_field(map, "image_id").filter(|id| !id.is_empty()),
                user_input: text_field(map, "user_input").unwrap_or_default(),
                assistant_response: text_field(map, "assistant_response").unwrap_or_default(),
            })
        })
        .collect();
    Ok(turns)
}

fn parse_question(
    data_root: &Path,
    concept_id: &str,
    difficulty: Difficulty,
    entry: &Value,
) -> Option<Question> {
    let map = entry.as_mapping()?;
    let id = text_field(map, "id")?;
    let question = text_field(map, "question")?;
    let image_id = text_field(map, "image_id")?;
    let options = map
        .get("options")
        .and_then(Value::as_sequence)
        .map(|items| items.iter().filter_map(scalar_to_string).collect())
        .unwrap_or_default();
    let criteria = map.get("evaluation_criteria").and_then(Value::as_mapping);
    let key_points = criteria
        .and_then(|c| c.get("key_points"))
        .and_then(Value::as_sequence)
        .map(|items| items.iter().filter_map(scalar_to_string).collect())
        .unwrap_or_default();

    Some(Question {
        image_path: image_path(data_root, concept_id, &image_id),
        id,
        concept_id: concept_id.to_string(),
        difficulty,
        question,
        options,
        answer: text_field(map, "answer").unwrap_or_default(),
        ideal_answer: criteria
            .and_then(|c| text_field(c, "ideal_answer"))
            .unwrap_or_default(),
        key_points,
    })
}

/// Easy then hard questions for one concept. An unreadable file is logged and skipped.
pub fn load_questions(data_root: &Path, concept_id: &str) -> Vec<Question> {
    let mut questions = Vec::new();
    for difficulty in [Difficulty::Easy, Difficulty::Hard] {
        let path = data_root.join(concept_id).join(difficulty.file_name());
        let entries = match read_yaml_list(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "error loading {difficulty} questions for {concept_id}");
                continue;
            }
        };
        for entry in &entries {
            match parse_question(data_root, concept_id, difficulty, entry) {
                Some(q) => questions.push(q),
                None => warn!(concept_id, %difficulty, "skipping malformed question entry"),
            }
        }
    }
    debug!(concept_id, count = questions.len(), "questions loaded");
    questions
}

/// Questions for every concept under `data_root`, concepts in sorted order.
pub fn load_all_questions(data_root: &Path) -> Result<Vec<Question>> {
    Ok(concept_ids(data_root)?
        .iter()
        .flat_map(|concept_id| load_questions(data_root, concept_id))
        .collect())
}
