//! Append-only JSON-lines log of answered questions, keyed for resumable runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One answered question as written to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaRecord {
    pub concept_id: String,
    pub question_id: String,
    pub difficulty: String,
    pub question: String,
    pub answer: String,
    pub choice: Option<String>,
}

impl QaRecord {
    pub fn key(&self) -> RecordKey {
        (
            self.concept_id.clone(),
            self.question_id.clone(),
            self.difficulty.clone(),
        )
    }
}

/// `(concept_id, question_id, difficulty)`
pub type RecordKey = (String, String, String);

pub struct ResultsLog {
    path: PathBuf,
}

impl ResultsLog {
    /// `<dir>/all_results_<model_short_name>.jsonl`; creates `dir`.
    pub fn open(dir: &Path, model_short_name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create results dir {}", dir.display()))?;
        Ok(Self {
            path: dir.join(format!("all_results_{model_short_name}.jsonl")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys of every record already in the log. Malformed lines are skipped.
    pub fn existing_keys(&self) -> Result<HashSet<RecordKey>> {
        let mut keys = HashSet::new();
        if !self.path.exists() {
            info!(path = %self.path.display(), "results file does not exist, starting fresh");
            return Ok(keys);
        }
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(&line) {
                Ok(entry) => {
                    let field = |name: &str, default: &str| {
                        entry
                            .get(name)
                            .and_then(|v| v.as_str())
                            .unwrap_or(default)
                            .to_string()
                    };
                    let question_id = field("question_id", "");
                    if !question_id.is_empty() {
                        keys.insert((
                            field("concept_id", "unknown"),
                            question_id,
                            field("difficulty", "unknown"),
                        ));
                    }
                }
                Err(e) => warn!(line = line_num + 1, error = %e, "invalid JSON in results file"),
            }
        }
        info!(count = keys.len(), path = %self.path.display(), "loaded existing result keys");
        Ok(keys)
    }

    pub fn append(&self, record: &QaRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("failed to serialize result")?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }
}
