//! Per-concept memory store: static and dynamic lists plus an optional portrait.
//!
//! Each concept owns one directory `<root>/<concept_id>/` holding `static.yaml`,
//! `dynamic.yaml` and `portrait.png`; every file is optional and absence reads as empty.
//! All mutation goes through [`MemoryStore::apply_batch`]: a batch is resolved against the
//! list as it stood before the batch, removals are collected as a set of indices and
//! filtered in one pass, additions are appended, and the result is deduplicated (first
//! occurrence wins) before it is written back. IO failures are logged and leave the store in
//! its last good state; nothing here returns an error once the store is open.

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::scalar_to_string;
use super::types::{clean_memory, EditOp, EditRejection, MemoryEdit, MemoryKind};

const PORTRAIT_FILE: &str = "portrait.png";

/// What happened to a batch of edits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub applied: usize,
    pub rejected: usize,
}

/// Durable static + dynamic memory for a single concept.
#[derive(Debug)]
pub struct MemoryStore {
    concept_id: String,
    dir: PathBuf,
    static_memory: Vec<String>,
    dynamic_memory: Vec<String>,
}

/// Reject ids that are empty or would escape the memory root.
pub fn validate_concept_id(concept_id: &str) -> Result<()> {
    if concept_id.trim().is_empty() {
        bail!("concept_id cannot be empty");
    }
    if concept_id == "." || concept_id == ".." || concept_id.contains(['/', '\\']) {
        bail!("invalid concept_id: {concept_id:?}");
    }
    Ok(())
}

impl MemoryStore {
    /// Open (creating the directory if needed) the store for `concept_id` under `root`.
    pub fn open(root: &Path, concept_id: &str) -> Result<Self> {
        validate_concept_id(concept_id)?;
        let dir = root.join(concept_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create concept dir {}", dir.display()))?;

        let mut store = Self {
            concept_id: concept_id.to_string(),
            dir,
            static_memory: Vec::new(),
            dynamic_memory: Vec::new(),
        };
        store.static_memory = store.read(MemoryKind::Static);
        store.dynamic_memory = store.read(MemoryKind::Dynamic);
        Ok(store)
    }

    pub fn concept_id(&self) -> &str {
        &self.concept_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: MemoryKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn portrait_path(&self) -> PathBuf {
        self.dir.join(PORTRAIT_FILE)
    }

    /// Whether either memory file has been written for this concept.
    pub fn has_memory(&self) -> bool {
        self.path(MemoryKind::Static).exists() || self.path(MemoryKind::Dynamic).exists()
    }

    /// The in-memory snapshot that the next batch will be resolved against.
    pub fn snapshot(&self, kind: MemoryKind) -> &[String] {
        match kind {
            MemoryKind::Static => &self.static_memory,
            MemoryKind::Dynamic => &self.dynamic_memory,
        }
    }

    pub fn read_static(&self) -> Vec<String> {
        self.read(MemoryKind::Static)
    }

    pub fn read_dynamic(&self) -> Vec<String> {
        self.read(MemoryKind::Dynamic)
    }

    /// Read a list from disk. Missing or unreadable files read as empty.
    pub fn read(&self, kind: MemoryKind) -> Vec<String> {
        let path = self.path(kind);
        if !path.exists() {
            return Vec::new();
        }
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read {kind} memory");
                return Vec::new();
            }
        };
        match serde_yaml::from_str::<Option<Vec<serde_yaml::Value>>>(&contents) {
            Ok(items) => items
                .unwrap_or_default()
                .iter()
                .filter_map(scalar_to_string)
                .collect(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to parse {kind} memory");
                Vec::new()
            }
        }
    }

    pub fn read_portrait(&self) -> Option<DynamicImage> {
        let path = self.portrait_path();
        if !path.exists() {
            return None;
        }
        match image::open(&path) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load portrait");
                None
            }
        }
    }

    /// Persist `portrait`, replacing any existing one. Callers decide when this is appropriate.
    pub fn save_portrait(&self, portrait: &DynamicImage) {
        let path = self.portrait_path();
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            error!(dir = %self.dir.display(), error = %e, "failed to create concept dir");
            return;
        }
        match portrait.save(&path) {
            Ok(()) => info!(concept_id = %self.concept_id, "portrait saved"),
            Err(e) => error!(path = %path.display(), error = %e, "failed to save portrait"),
        }
    }

    /// Apply a single 0-indexed operation.
    pub fn update(
        &mut self,
        kind: MemoryKind,
        memory: Option<&str>,
        op: EditOp,
        target: usize,
    ) -> BatchOutcome {
        let edit = MemoryEdit {
            op,
            memory: memory.map(str::to_string),
            target: op.needs_target().then_some(target),
        };
        self.apply_batch(kind, std::slice::from_ref(&edit))
    }

    /// Apply `edits` against the current snapshot of `kind`.
    ///
    /// Every target is checked against the pre-batch list, so `[remove 1, remove 2]` drops both
    /// original items. A rejected edit is logged and skipped; the rest of the batch proceeds.
    /// When an index is both modified and removed, the removal wins.
    pub fn apply_batch(&mut self, kind: MemoryKind, edits: &[MemoryEdit]) -> BatchOutcome {
        let snapshot = self.snapshot(kind).to_vec();
        let mut removed = vec![false; snapshot.len()];
        let mut replaced: Vec<Option<String>> = vec![None; snapshot.len()];
        let mut added = Vec::new();
        let mut outcome = BatchOutcome::default();

        for edit in edits {
            if let Err(rejection) = check_edit(edit, snapshot.len()) {
                error!(
                    concept_id = %self.concept_id,
                    memory_kind = %kind,
                    op = %edit.op,
                    "{rejection}; skipping operation"
                );
                outcome.rejected += 1;
                continue;
            }
            match (edit.op, edit.target) {
                (EditOp::Add, _) => {
                    let cleaned = clean_memory(edit.memory.as_deref().unwrap_or_default());
                    debug!(concept_id = %self.concept_id, "adding to {kind} memory: '{cleaned}'");
                    added.push(cleaned);
                }
                (EditOp::Remove, Some(idx)) => {
                    info!(
                        concept_id = %self.concept_id,
                        "removing from {kind} memory at position {} (1-indexed): '{}'",
                        idx + 1,
                        snapshot[idx]
                    );
                    removed[idx] = true;
                }
                (EditOp::Modify, Some(idx)) => {
                    let cleaned = clean_memory(edit.memory.as_deref().unwrap_or_default());
                    info!(
                        concept_id = %self.concept_id,
                        "modifying {kind} memory at position {} (1-indexed): '{}' -> '{cleaned}'",
                        idx + 1,
                        snapshot[idx]
                    );
                    replaced[idx] = Some(cleaned);
                }
                // check_edit guarantees a target for remove/modify
                (_, None) => continue,
            }
            outcome.applied += 1;
        }

        if outcome.applied == 0 {
            return outcome;
        }

        let next: Vec<String> = snapshot
            .into_iter()
            .zip(removed)
            .zip(replaced)
            .filter(|((_, is_removed), _)| !is_removed)
            .map(|((original, _), replacement)| replacement.unwrap_or(original))
            .chain(added)
            .collect();

        self.commit(kind, dedup_preserving_order(next));
        outcome
    }

    /// Keep only the `max_size` most recent dynamic entries.
    pub fn apply_fifo(&mut self, max_size: usize) {
        let dynamic = self.read(MemoryKind::Dynamic);
        if dynamic.len() <= max_size {
            return;
        }
        let trimmed = dynamic[dynamic.len() - max_size..].to_vec();
        info!(
            concept_id = %self.concept_id,
            from = dynamic.len(),
            to = max_size,
            "applied FIFO rule to dynamic memory"
        );
        self.commit(MemoryKind::Dynamic, trimmed);
    }

    /// Delete the dynamic memory file entirely.
    pub fn clean_dynamic(&mut self) {
        let path = self.path(MemoryKind::Dynamic);
        if !path.exists() {
            return;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                self.dynamic_memory.clear();
                info!(concept_id = %self.concept_id, "dynamic memory cleaned");
            }
            Err(e) => error!(path = %path.display(), error = %e, "failed to remove dynamic memory"),
        }
    }

    /// Write `list` and, only if that succeeds, adopt it as the new snapshot.
    fn commit(&mut self, kind: MemoryKind, list: Vec<String>) {
        if let Err(e) = self.persist(kind, &list) {
            error!(concept_id = %self.concept_id, memory_kind = %kind, error = %e, "failed to persist memory");
            return;
        }
        match kind {
            MemoryKind::Static => self.static_memory = list,
            MemoryKind::Dynamic => self.dynamic_memory = list,
        }
    }

    /// Atomic write (tmp + rename).
    fn persist(&self, kind: MemoryKind, list: &[String]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create concept dir {}", self.dir.display()))?;
        let yaml = serde_yaml::to_string(list).context("failed to serialize memory")?;
        let path = self.path(kind);
        let tmp_path = path.with_extension("yaml.tmp");
        std::fs::write(&tmp_path, yaml)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to rename into {}", path.display()))?;
        Ok(())
    }
}

/// Validate one edit against a list of `len` items.
fn check_edit(edit: &MemoryEdit, len: usize) -> Result<(), EditRejection> {
    let has_content = edit
        .memory
        .as_deref()
        .is_some_and(|m| !m.trim().is_empty());

    match edit.op {
        EditOp::Add if !has_content => Err(EditRejection::EmptyAdd),
        EditOp::Add => Ok(()),
        EditOp::Remove | EditOp::Modify => {
            let idx = edit
                .target
                .ok_or(EditRejection::MissingTarget { op: edit.op })?;
            if idx >= len {
                return Err(EditRejection::OutOfRange {
                    position: idx + 1,
                    len,
                });
            }
            if edit.op == EditOp::Modify && !has_content {
                return Err(EditRejection::EmptyModify { position: idx + 1 });
            }
            Ok(())
        }
    }
}

fn dedup_preserving_order(list: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    list.into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, MemoryStore) {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::open(tmp.path(), "luna").unwrap();
        (tmp, store)
    }

    fn seed(store: &mut MemoryStore, kind: MemoryKind, items: &[&str]) {
        let edits: Vec<MemoryEdit> = items.iter().map(|m| MemoryEdit::add(*m)).collect();
        store.apply_batch(kind, &edits);
    }

    #[test]
    fn open_creates_concept_dir() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::open(tmp.path(), "max").unwrap();
        assert!(store.dir().is_dir());
        assert!(!store.has_memory());
        assert!(store.read_static().is_empty());
        assert!(store.read_dynamic().is_empty());
        assert!(store.read_portrait().is_none());
    }

    #[test]
    fn invalid_concept_ids_are_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(MemoryStore::open(tmp.path(), "").is_err());
        assert!(MemoryStore::open(tmp.path(), "..").is_err());
        assert!(MemoryStore::open(tmp.path(), "a/b").is_err());
    }

    #[test]
    fn add_persists_and_dedups() {
        let (_tmp, mut store) = test_store();
        store.update(MemoryKind::Static, Some("Luna is a cat"), EditOp::Add, 0);
        store.update(MemoryKind::Static, Some("Luna is a cat"), EditOp::Add, 0);
        assert_eq!(store.read_static(), vec!["Luna is a cat"]);
        assert_eq!(store.snapshot(MemoryKind::Static), ["Luna is a cat"]);
    }

    #[test]
    fn empty_add_is_rejected() {
        let (_tmp, mut store) = test_store();
        let outcome = store.update(MemoryKind::Dynamic, Some("  "), EditOp::Add, 0);
        assert_eq!(outcome, BatchOutcome { applied: 0, rejected: 1 });
        assert!(!store.path(MemoryKind::Dynamic).exists());
    }

    #[test]
    fn removals_resolve_against_pre_batch_snapshot() {
        let (_tmp, mut store) = test_store();
        seed(&mut store, MemoryKind::Static, &["a", "b", "c"]);
        let outcome = store.apply_batch(
            MemoryKind::Static,
            &[MemoryEdit::remove(1), MemoryEdit::remove(2)],
        );
        assert_eq!(outcome.applied, 2);
        assert_eq!(store.read_static(), vec!["a"]);
    }

    #[test]
    fn out_of_range_modify_is_a_no_op() {
        let (_tmp, mut store) = test_store();
        seed(&mut store, MemoryKind::Static, &["a", "b"]);
        let outcome = store.update(MemoryKind::Static, Some("z"), EditOp::Modify, 98);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(store.read_static(), vec!["a", "b"]);
    }

    #[test]
    fn rejection_does_not_affect_rest_of_batch() {
        let (_tmp, mut store) = test_store();
        seed(&mut store, MemoryKind::Dynamic, &["a", "b"]);
        let outcome = store.apply_batch(
            MemoryKind::Dynamic,
            &[
                MemoryEdit::remove(7),
                MemoryEdit::modify(0, "A"),
                MemoryEdit::add("c"),
            ],
        );
        assert_eq!(outcome, BatchOutcome { applied: 2, rejected: 1 });
        assert_eq!(store.read_dynamic(), vec!["A", "b", "c"]);
    }

    #[test]
    fn modify_flattens_newlines_and_dedups_against_existing() {
        let (_tmp, mut store) = test_store();
        seed(&mut store, MemoryKind::Static, &["x y", "old"]);
        store.update(MemoryKind::Static, Some("x\ny"), EditOp::Modify, 1);
        assert_eq!(store.read_static(), vec!["x y"]);
    }

    #[test]
    fn remove_wins_over_modify_on_same_index() {
        let (_tmp, mut store) = test_store();
        seed(&mut store, MemoryKind::Static, &["a", "b"]);
        store.apply_batch(
            MemoryKind::Static,
            &[MemoryEdit::modify(0, "z"), MemoryEdit::remove(0)],
        );
        assert_eq!(store.read_static(), vec!["b"]);
    }

    #[test]
    fn fifo_keeps_most_recent_entries() {
        let (_tmp, mut store) = test_store();
        let items: Vec<String> = (1..=13).map(|i| format!("obs {i}")).collect();
        let refs: Vec<&str> = items.iter().map(String::as_str).collect();
        seed(&mut store, MemoryKind::Dynamic, &refs);

        store.apply_fifo(10);

        let expected: Vec<String> = (4..=13).map(|i| format!("obs {i}")).collect();
        assert_eq!(store.read_dynamic(), expected);
        assert_eq!(store.snapshot(MemoryKind::Dynamic), expected.as_slice());
    }

    #[test]
    fn fifo_within_bound_does_not_write() {
        let (_tmp, mut store) = test_store();
        store.apply_fifo(10);
        assert!(!store.path(MemoryKind::Dynamic).exists());
    }

    #[test]
    fn clean_dynamic_removes_file() {
        let (_tmp, mut store) = test_store();
        seed(&mut store, MemoryKind::Dynamic, &["a"]);
        assert!(store.path(MemoryKind::Dynamic).exists());
        store.clean_dynamic();
        assert!(!store.path(MemoryKind::Dynamic).exists());
        assert!(store.snapshot(MemoryKind::Dynamic).is_empty());
    }

    #[test]
    fn malformed_file_reads_as_empty() {
        let (_tmp, store) = test_store();
        std::fs::write(store.path(MemoryKind::Static), "{ not: [valid").unwrap();
        assert!(store.read_static().is_empty());
    }

    #[test]
    fn reopen_sees_persisted_lists() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = MemoryStore::open(tmp.path(), "luna").unwrap();
            seed(&mut store, MemoryKind::Static, &["Luna has visual white fur"]);
        }
        let store = MemoryStore::open(tmp.path(), "luna").unwrap();
        assert_eq!(store.snapshot(MemoryKind::Static), ["Luna has visual white fur"]);
        assert!(store.has_memory());
    }

    #[test]
    fn portrait_round_trips() {
        let (_tmp, store) = test_store();
        let img = DynamicImage::new_rgb8(4, 3);
        store.save_portrait(&img);
        let loaded = store.read_portrait().unwrap();
        assert_eq!((loaded.width(), loaded.height()), (4, 3));
    }
}
