//! Canonical change events and raw operation classification.

use crate::sources::Op;
use std::fmt;
use std::path::{Path, PathBuf};

/// Canonical kind of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The path was created (or moved into place).
    Create,
    /// The path was removed or renamed away.
    Remove,
    /// The path's contents were written.
    Modify,
    /// Anything else (attribute changes, access). Never delivered.
    Unknown,
}

impl ChangeKind {
    /// Classify a raw operation set.
    ///
    /// Precedence is Create, then Remove (remove or rename), then Modify.
    /// A rename away from a path leaves nothing behind at that path, so it
    /// counts as a removal even when a write bit is also present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hotswap_watch::core::ChangeKind;
    /// use hotswap_watch::sources::Op;
    ///
    /// assert_eq!(ChangeKind::classify(Op::CREATE | Op::WRITE), ChangeKind::Create);
    /// assert_eq!(ChangeKind::classify(Op::RENAME | Op::WRITE), ChangeKind::Remove);
    /// assert_eq!(ChangeKind::classify(Op::CHMOD), ChangeKind::Unknown);
    /// ```
    pub fn classify(op: Op) -> Self {
        if op.contains(Op::CREATE) {
            Self::Create
        } else if op.contains(Op::REMOVE) || op.contains(Op::RENAME) {
            Self::Remove
        } else if op.contains(Op::WRITE) {
            Self::Modify
        } else {
            Self::Unknown
        }
    }

    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Remove => "Remove",
            Self::Modify => "Modify",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified change for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened
    pub kind: ChangeKind,
    /// The affected path
    pub path: PathBuf,
}

impl ChangeEvent {
    /// Create a new change event.
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Whether this event is about exactly `path`.
    pub fn affects(&self, path: &Path) -> bool {
        self.path == path
    }
}
