//! Model output → memory edits.
//!
//! The model answers with free text that usually wraps a YAML payload in a ```` ```yaml ````
//! fence. [`extract_structured_block`] pulls out the first such block (or falls back to the
//! whole text), [`parse_payload`] normalizes it to a list of mappings, and [`resolve_edits`]
//! turns each mapping into a [`MemoryEdit`]. This module is the only place where the
//! model's 1-indexed `target_id` is converted to a 0-indexed store position.

use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use super::scalar_to_string;
use super::store::{BatchOutcome, MemoryStore};
use super::types::{EditOp, EditRejection, MemoryEdit, MemoryKind};

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?is)```\s*ya?ml\s*(.*?)```").expect("fence pattern is valid")
    })
}

/// The first fenced YAML block in `response`, or the whole response if there is none.
pub fn extract_structured_block(response: &str) -> &str {
    fence_regex()
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map_or(response, |m| m.as_str())
}

/// Parse the structured part of `response` into a YAML value. Malformed payloads are logged
/// and yield `None`.
pub fn parse_structured(response: &str) -> Option<Value> {
    let payload = extract_structured_block(response);
    match serde_yaml::from_str::<Value>(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(error = %e, "error parsing structured model output");
            None
        }
    }
}

/// Normalize a parsed payload to a list of entries: a mapping becomes a one-element list, a
/// sequence is taken as-is, anything else yields nothing.
pub fn parse_payload(value: Value) -> Vec<Value> {
    match value {
        Value::Mapping(_) => vec![value],
        Value::Sequence(items) => items,
        Value::Null => Vec::new(),
        other => {
            warn!(payload = ?other, "structured output is neither a mapping nor a list");
            Vec::new()
        }
    }
}

/// Turn raw entries into edits against a list of `len` items. Invalid entries are logged and
/// dropped; the remaining edits keep their original order.
pub fn resolve_edits(entries: &[Value], len: usize, kind: MemoryKind) -> Vec<MemoryEdit> {
    entries
        .iter()
        .filter_map(|entry| match resolve_edit(entry, len) {
            Ok(edit) => Some(edit),
            Err(EditRejection::NotAMapping) if entry.is_null() => None,
            Err(rejection) => {
                error!(memory_kind = %kind, "{rejection}; skipping operation");
                None
            }
        })
        .collect()
}

/// Resolve one entry. `op` defaults to `add`; `target_id` is required for remove/modify, may
/// be a list (first element wins) or a numeric string, and must address an element of the
/// current list.
pub fn resolve_edit(entry: &Value, len: usize) -> Result<MemoryEdit, EditRejection> {
    let map = entry.as_mapping().ok_or(EditRejection::NotAMapping)?;

    let op = match field(map, "op") {
        None | Some(Value::Null) => EditOp::Add,
        Some(value) => {
            let raw = scalar_to_string(value).unwrap_or_default();
            raw.parse::<EditOp>()
                .map_err(|_| EditRejection::UnknownOp { op: raw })?
        }
    };
    let memory = field(map, "memory").and_then(scalar_to_string);

    if !op.needs_target() {
        return Ok(MemoryEdit {
            op,
            memory,
            target: None,
        });
    }

    let raw_target = match field(map, "target_id") {
        None | Some(Value::Null) => return Err(EditRejection::MissingTarget { op }),
        Some(value) => value,
    };
    let position = parse_position(raw_target)?;
    if position > len {
        return Err(EditRejection::OutOfRange { position, len });
    }

    Ok(MemoryEdit {
        op,
        memory,
        target: Some(position - 1),
    })
}

/// Parse a 1-indexed position. Accepts integers, integral floats, numeric strings, and lists
/// (first element).
fn parse_position(value: &Value) -> Result<usize, EditRejection> {
    let invalid = || EditRejection::InvalidTarget {
        value: serde_yaml::to_string(value)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("{value:?}")),
    };

    let value = match value {
        Value::Sequence(items) => items.first().ok_or_else(invalid)?,
        other => other,
    };
    let n: i64 = match value {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i,
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => f as i64,
            _ => return Err(invalid()),
        },
        Value::String(s) => s.trim().parse().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    usize::try_from(n)
        .ok()
        .filter(|&p| p >= 1)
        .ok_or_else(invalid)
}

fn field<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(Value::String(key.to_string()))
}

/// Parse `response` and apply its edits to `kind` memory of `store`.
pub fn apply_response(store: &mut MemoryStore, response: &str, kind: MemoryKind) -> BatchOutcome {
    match parse_structured(response) {
        Some(value) => apply_entries(store, parse_payload(value), kind),
        None => BatchOutcome::default(),
    }
}

/// Apply already-parsed entries (e.g. one half of a promotion response).
pub fn apply_entries(store: &mut MemoryStore, entries: Vec<Value>, kind: MemoryKind) -> BatchOutcome {
    let len = store.snapshot(kind).len();
    let edits = resolve_edits(&entries, len, kind);
    let dropped = entries.iter().filter(|e| !e.is_null()).count() - edits.len();

    let mut outcome = if edits.is_empty() {
        BatchOutcome::default()
    } else {
        store.apply_batch(kind, &edits)
    };
    outcome.rejected += dropped;

    info!(
        concept_id = %store.concept_id(),
        memory_kind = %kind,
        applied = outcome.applied,
        rejected = outcome.rejected,
        "processed memory operations"
    );
    outcome
}
