//! Document engine: materialized state plus a totally ordered,
//! reversible change history.
//!
//! A [`Document`] holds the current tree, the history of applied
//! [`Change`]s sorted by `(timestamp, originator)`, and a stash of
//! changes temporarily rewound while an out-of-order arrival is spliced
//! in. Conflicting edits resolve last-writer-wins by that key; replaying
//! a change id is a no-op.
//!
//! Every public mutator is transactional: it works on a clone and swaps
//! the clone in on success, so a failed mutation leaves the document
//! exactly as it was.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::diff::diff_values;
use crate::error::DocumentError;
use crate::identity::{IdentifierSpec, validate_unique};
use crate::patch::{Operation, apply_normalized, apply_ops};
use crate::reverse::reverse_ops;

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// An ordered batch of operations with a global-order key and an
/// idempotency key.
///
/// Wire form: `{"diff":[…],"ts":…,"cid":"…","seq":…,"gid":"…","mid":"…"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Operations, applied in order.
    pub diff: Vec<Operation>,
    /// Logical timestamp in milliseconds; first component of the order key.
    #[serde(rename = "ts")]
    pub timestamp_ms: i64,
    /// Originating peer; tie-break component of the order key.
    #[serde(rename = "cid")]
    pub originator_id: String,
    /// Opaque caller-owned counter; preserved, never interpreted.
    #[serde(default)]
    pub seq: i64,
    /// Idempotency key: a change id is applied at most once.
    #[serde(rename = "gid")]
    pub change_id: String,
    /// Optional message correlation id.
    #[serde(rename = "mid", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl Change {
    /// The total-order key. Comparison is lexicographic: timestamp first,
    /// originator id as the tie-break.
    #[must_use]
    pub fn sort_key(&self) -> (i64, &str) {
        (self.timestamp_ms, self.originator_id.as_str())
    }
}

// ---------------------------------------------------------------------------
// DocumentOptions
// ---------------------------------------------------------------------------

/// Construction-time configuration for a [`Document`].
///
/// The base entry is the synthetic first history record whose diff
/// reconstructs the initial document from empty; its identifying
/// metadata is configurable so peers can agree on a common base.
#[derive(Clone, Debug)]
pub struct DocumentOptions {
    /// Identifier spec for identity-keyed array addressing.
    pub identifiers: IdentifierSpec,
    /// Timestamp of the base history entry.
    pub base_timestamp_ms: i64,
    /// Originator id of the base entry.
    pub base_originator_id: String,
    /// Change id of the base entry.
    pub base_change_id: String,
    /// Optional message id of the base entry.
    pub base_message_id: Option<String>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            identifiers: IdentifierSpec::default(),
            base_timestamp_ms: 0,
            base_originator_id: "0".to_owned(),
            base_change_id: "0".to_owned(),
            base_message_id: None,
        }
    }
}

impl DocumentOptions {
    /// Replace the identifier spec.
    #[must_use]
    pub fn identifiers(mut self, identifiers: IdentifierSpec) -> Self {
        self.identifiers = identifiers;
        self
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A JSON tree document with a totally ordered, reversible change
/// history.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    raw: Value,
    history: Vec<Change>,
    stash: Vec<Change>,
    applied_ids: BTreeSet<String>,
    identifiers: IdentifierSpec,
}

impl Document {
    // -- construction -------------------------------------------------------

    /// Create a document from a JSON blob with default options.
    ///
    /// # Errors
    /// Returns [`DocumentError::Parse`] for malformed JSON and
    /// [`DocumentError::InvalidDocument`] for duplicate identities.
    pub fn from_json(raw: &[u8]) -> Result<Self, DocumentError> {
        Self::from_json_with(raw, DocumentOptions::default())
    }

    /// Create a document from a JSON blob with explicit options.
    ///
    /// # Errors
    /// See [`Self::from_json`].
    pub fn from_json_with(raw: &[u8], options: DocumentOptions) -> Result<Self, DocumentError> {
        let value = serde_json::from_slice(raw)?;
        Self::from_value(value, options)
    }

    /// Create a document from an already-parsed tree.
    ///
    /// # Errors
    /// Returns [`DocumentError::InvalidDocument`] for duplicate identities.
    pub fn from_value(value: Value, options: DocumentOptions) -> Result<Self, DocumentError> {
        validate_unique(&value, &options.identifiers).map_err(DocumentError::InvalidDocument)?;
        let base = Change {
            diff: vec![Operation::Add {
                path: String::new(),
                value: value.clone(),
            }],
            timestamp_ms: options.base_timestamp_ms,
            originator_id: options.base_originator_id,
            seq: 0,
            change_id: options.base_change_id,
            message_id: options.base_message_id,
        };
        let mut applied_ids = BTreeSet::new();
        applied_ids.insert(base.change_id.clone());
        Ok(Self {
            raw: value,
            history: vec![base],
            stash: Vec::new(),
            applied_ids,
            identifiers: options.identifiers,
        })
    }

    // -- accessors ----------------------------------------------------------

    /// The current materialized tree.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Serialize the current tree.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.raw)
    }

    /// The ordered history, base entry first.
    #[must_use]
    pub fn history(&self) -> &[Change] {
        &self.history
    }

    /// Changes currently rewound and awaiting fast-forward.
    #[must_use]
    pub fn stash(&self) -> &[Change] {
        &self.stash
    }

    /// The identifier spec this document resolves identities with.
    #[must_use]
    pub fn identifiers(&self) -> &IdentifierSpec {
        &self.identifiers
    }

    /// Whether a change id has already been applied.
    #[must_use]
    pub fn is_applied(&self, change_id: &str) -> bool {
        self.applied_ids.contains(change_id)
    }

    // -- mutators -----------------------------------------------------------

    /// Apply a change, reconciling out-of-order arrival.
    ///
    /// History is rewound past the change's `(timestamp, originator)`
    /// key, the change's pre-images are recomputed from local state, the
    /// diff is applied, the rewound changes are replayed, and the change
    /// is spliced into its sorted history position. A change id that was
    /// already applied is ignored.
    ///
    /// # Errors
    /// Returns a [`DocumentError`] citing the failing change; the
    /// document is unchanged.
    #[instrument(skip_all, fields(change_id = %change.change_id, ts = change.timestamp_ms))]
    pub fn apply_change(&mut self, change: Change) -> Result<(), DocumentError> {
        if self.applied_ids.contains(&change.change_id) {
            debug!("change already applied; ignoring");
            return Ok(());
        }
        let mut work = self.clone();
        work.rewind_in_place(change.timestamp_ms, &change.originator_id)?;
        let (raw, normalized) = apply_normalized(&work.raw, &change.diff, &work.identifiers)
            .map_err(|source| DocumentError::Patch {
                change_id: change.change_id.clone(),
                source,
            })?;
        work.raw = raw;
        work.applied_ids.insert(change.change_id.clone());
        work.fast_forward_in_place()?;
        let spliced = Change {
            diff: normalized,
            ..change
        };
        let at = work.splice_position(spliced.sort_key());
        work.history.insert(at, spliced);
        debug!(history_len = work.history.len(), "change spliced");
        *self = work;
        Ok(())
    }

    /// Rewind history down to (and excluding) entries strictly after
    /// `(ts, originator)`, pushing them onto the stash.
    ///
    /// # Errors
    /// Returns [`DocumentError::Rewind`] if a reversal fails to apply;
    /// the document is unchanged.
    pub fn rewind_to(&mut self, ts: i64, originator: &str) -> Result<(), DocumentError> {
        let mut work = self.clone();
        work.rewind_in_place(ts, originator)?;
        *self = work;
        Ok(())
    }

    /// Replay every stashed change in chronological order.
    ///
    /// # Errors
    /// Returns a [`DocumentError`] citing the failing change; the
    /// document is unchanged.
    pub fn fast_forward(&mut self) -> Result<(), DocumentError> {
        let mut work = self.clone();
        work.fast_forward_in_place()?;
        *self = work;
        Ok(())
    }

    /// Compact history: every entry at or before `(min_ts, "")` is folded
    /// into a new synthetic base entry that inherits the newest surviving
    /// entry's identifying metadata; newer entries are replayed on top.
    ///
    /// # Errors
    /// Returns a [`DocumentError`] if rewinding or replaying fails; the
    /// document is unchanged.
    pub fn reduce_history(&mut self, min_ts: i64) -> Result<(), DocumentError> {
        if self.history.len() <= 1 {
            return Ok(());
        }
        let mut work = self.clone();
        work.rewind_in_place(min_ts, "")?;
        let Some(last) = work.history.last() else {
            return Ok(());
        };
        let base = Change {
            diff: vec![Operation::Add {
                path: String::new(),
                value: work.raw.clone(),
            }],
            timestamp_ms: last.timestamp_ms,
            originator_id: last.originator_id.clone(),
            seq: last.seq,
            change_id: last.change_id.clone(),
            message_id: last.message_id.clone(),
        };
        work.applied_ids = BTreeSet::from([base.change_id.clone()]);
        work.history = vec![base];
        work.fast_forward_in_place()?;
        debug!(history_len = work.history.len(), "history reduced");
        *self = work;
        Ok(())
    }

    /// Compute the change that transforms this document's state into
    /// `other`'s, using this document's identifier spec. Only the diff is
    /// populated; order and idempotency keys are the caller's to assign.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Change {
        Change {
            diff: diff_values(&self.raw, &other.raw, &self.identifiers),
            timestamp_ms: 0,
            originator_id: String::new(),
            seq: 0,
            change_id: String::new(),
            message_id: None,
        }
    }

    // -- internals ----------------------------------------------------------

    /// Rewind on `self` directly. Callers own the transactional clone.
    fn rewind_in_place(&mut self, ts: i64, originator: &str) -> Result<(), DocumentError> {
        while self.history.len() > 1 {
            let Some(top) = self.history.last() else {
                break;
            };
            if top.sort_key() <= (ts, originator) {
                break;
            }
            let Some(entry) = self.history.pop() else {
                break;
            };
            let reversed = reverse_ops(&entry.diff, &self.identifiers);
            let raw = apply_ops(&self.raw, &reversed, &self.identifiers).map_err(|source| {
                DocumentError::Rewind {
                    change_id: entry.change_id.clone(),
                    source,
                }
            })?;
            self.raw = raw;
            self.applied_ids.remove(&entry.change_id);
            self.stash.push(entry);
        }
        Ok(())
    }

    /// Fast-forward on `self` directly. Callers own the transactional
    /// clone. Each stashed change's pre-images are re-normalized against
    /// the state it is actually replayed on.
    fn fast_forward_in_place(&mut self) -> Result<(), DocumentError> {
        while let Some(mut change) = self.stash.pop() {
            let (raw, normalized) = apply_normalized(&self.raw, &change.diff, &self.identifiers)
                .map_err(|source| DocumentError::Patch {
                    change_id: change.change_id.clone(),
                    source,
                })?;
            self.raw = raw;
            change.diff = normalized;
            self.applied_ids.insert(change.change_id.clone());
            self.history.push(change);
        }
        Ok(())
    }

    /// The sorted insertion position for a key: after every entry with a
    /// key less than or equal to it, and never before the base entry.
    fn splice_position(&self, key: (i64, &str)) -> usize {
        let mut at = self.history.len();
        while at > 1 && self.history[at - 1].sort_key() > key {
            at -= 1;
        }
        at
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------
