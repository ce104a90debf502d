//! Error types for the document engine.
//!
//! Two layers: [`PatchError`] covers the failure of a single operation —
//! compiling its path, applying it, or the duplicate-identity check that
//! follows it. [`DocumentError`] covers whole-document mutations and cites
//! the change that failed. Every public mutator is transactional: when one
//! of these errors comes back, the document is exactly what it was before
//! the call.

use std::fmt;

// ---------------------------------------------------------------------------
// PatchError
// ---------------------------------------------------------------------------

/// Failure compiling or applying a single operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchError {
    /// A bracket segment matched no element of the array it addresses.
    IdentityMissing {
        /// The identity text inside the brackets.
        id: String,
        /// The logical path containing the segment.
        path: String,
    },
    /// Two sibling array elements resolved to the same identity.
    IdentityConflict {
        /// The duplicated identity in bracket form, or `missing id`.
        identity: String,
        /// Path of the second offending element.
        path: String,
    },
    /// An operation addressed a key or index that does not exist.
    PointerMiss {
        /// The canonical path that failed to resolve.
        path: String,
        /// What exactly was missing.
        detail: String,
    },
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityMissing { id, path } => {
                write!(f, "id `{id}` not found at `{path}`")
            }
            Self::IdentityConflict { identity, path } => {
                write!(f, "duplicate identifier {identity} at `{path}`")
            }
            Self::PointerMiss { path, detail } => {
                write!(f, "`{path}`: {detail}")
            }
        }
    }
}

impl std::error::Error for PatchError {}

// ---------------------------------------------------------------------------
// DocumentError
// ---------------------------------------------------------------------------

/// Unified error type for document construction and mutation.
#[derive(Debug)]
pub enum DocumentError {
    /// Input was not well-formed JSON.
    Parse(serde_json::Error),
    /// The initial document failed duplicate-identity validation.
    InvalidDocument(PatchError),
    /// A change failed to compile or apply.
    Patch {
        /// Id of the change that failed.
        change_id: String,
        /// The operation-level failure.
        source: PatchError,
    },
    /// A reversed operation failed to apply while rewinding history.
    Rewind {
        /// Id of the history entry whose reversal failed.
        change_id: String,
        /// The operation-level failure.
        source: PatchError,
    },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "malformed JSON: {err}"),
            Self::InvalidDocument(err) => write!(f, "invalid initial document: {err}"),
            Self::Patch { change_id, source } => {
                write!(f, "patch error in change `{change_id}`: {source}")
            }
            Self::Rewind { change_id, source } => {
                write!(f, "rewind error at change `{change_id}`: {source}")
            }
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidDocument(err)
            | Self::Patch { source: err, .. }
            | Self::Rewind { source: err, .. } => Some(err),
        }
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
