//! Core memory type definitions.
//!
//! Defines [`MemoryKind`] (the two memory tiers), [`EditOp`] and [`MemoryEdit`] (a validated,
//! 0-indexed edit ready for the store), and [`EditRejection`] (why a model-proposed edit was
//! dropped).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two memory tiers kept per concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Permanent, rarely-changing facts. Unbounded.
    Static,
    /// Recent observations, FIFO-bounded.
    Dynamic,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }

    /// Backing file name inside a concept directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Static => "static.yaml",
            Self::Dynamic => "dynamic.yaml",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "dynamic" => Ok(Self::Dynamic),
            _ => Err(format!("unknown memory kind: {s}")),
        }
    }
}

/// A single edit operation on a memory list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOp {
    Add,
    Remove,
    Modify,
}

impl EditOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Modify => "modify",
        }
    }

    /// Whether this op addresses an existing element.
    pub fn needs_target(&self) -> bool {
        matches!(self, Self::Remove | Self::Modify)
    }
}

impl std::fmt::Display for EditOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EditOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "remove" => Ok(Self::Remove),
            "modify" => Ok(Self::Modify),
            other => Err(format!("unknown op: {other}")),
        }
    }
}

/// An edit in store coordinates: `target` is 0-indexed into the list snapshot the batch was
/// resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEdit {
    pub op: EditOp,
    pub memory: Option<String>,
    pub target: Option<usize>,
}

impl MemoryEdit {
    pub fn add(memory: impl Into<String>) -> Self {
        Self {
            op: EditOp::Add,
            memory: Some(memory.into()),
            target: None,
        }
    }

    pub fn remove(target: usize) -> Self {
        Self {
            op: EditOp::Remove,
            memory: None,
            target: Some(target),
        }
    }

    pub fn modify(target: usize, memory: impl Into<String>) -> Self {
        Self {
            op: EditOp::Modify,
            memory: Some(memory.into()),
            target: Some(target),
        }
    }
}

/// Why an edit was dropped. Positions are reported 1-indexed, the way the model sees them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditRejection {
    #[error("cannot add empty memory")]
    EmptyAdd,
    #[error("cannot modify position {position} to empty memory")]
    EmptyModify { position: usize },
    #[error("operation '{op}' requires target_id but none was provided")]
    MissingTarget { op: EditOp },
    #[error("invalid target_id {value}: must be an integer >= 1 (1-indexed)")]
    InvalidTarget { value: String },
    #[error(
        "target_id {position} (1-indexed) out of range; valid range: [1, {len}], current list has {len} items"
    )]
    OutOfRange { position: usize, len: usize },
    #[error("unknown op '{op}'")]
    UnknownOp { op: String },
    #[error("operation entry is not a mapping")]
    NotAMapping,
}

/// Replace embedded newlines with spaces before storage.
pub fn clean_memory(memory: &str) -> String {
    memory.replace("\r\n", " ").replace(['\n', '\r'], " ")
}
