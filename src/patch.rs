//! Operation model and the transactional patch applier.
//!
//! Operations use the JSON Patch wire shape (`op` / `path` / `from` /
//! `value`) plus a `_prev` pre-image field that makes every operation
//! reversible. `_prev` is populated by the engine from local state —
//! claims arriving on the wire are discarded and recomputed.
//!
//! Application is all-or-nothing per operation list: everything happens
//! on a shadow copy, and the caller's document is untouched on failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PatchError;
use crate::identity::{IdentifierSpec, validate_unique};
use crate::path::{compile, compile_insertion, split_last};

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A single mutation against a document tree.
///
/// Serialized with an `"op"` tag:
/// `{"op":"add","path":"/cards/-","value":{…}}` etc. The pre-image field
/// serializes as `"_prev"` and is omitted when absent; an `add` carries no
/// pre-image and a `remove` no value, so stray wire fields of those names
/// are dropped at the boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    /// Insert `value` at `path`. Object parents insert or overwrite the
    /// key; array parents insert before the index, with `-` appending.
    Add {
        /// Target logical path.
        path: String,
        /// The value to insert, taken literally.
        value: Value,
    },
    /// Remove the value at `path`, which must exist.
    Remove {
        /// Target logical path.
        path: String,
        /// Pre-image of the removed value (engine-populated).
        #[serde(rename = "_prev", default, skip_serializing_if = "Option::is_none")]
        prev: Option<Value>,
    },
    /// Replace the value at `path`, which must exist.
    Replace {
        /// Target logical path.
        path: String,
        /// The new value.
        value: Value,
        /// Pre-image of the replaced value (engine-populated).
        #[serde(rename = "_prev", default, skip_serializing_if = "Option::is_none")]
        prev: Option<Value>,
    },
    /// Remove the value at `from` and insert it at `path`. The source is
    /// compiled against the pre-operation document; the destination is
    /// compiled against the document after the removal, per JSON Patch.
    /// Endpoints that compile to the same place are a successful no-op.
    Move {
        /// Source logical path.
        from: String,
        /// Destination logical path.
        path: String,
    },
}

impl Operation {
    /// The operation's target path.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path, .. }
            | Self::Replace { path, .. }
            | Self::Move { path, .. } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Apply `ops` to a shadow copy of `doc`, validating identity uniqueness
/// after every operation.
///
/// # Errors
/// Returns the first [`PatchError`]; `doc` itself is never modified.
pub fn apply_ops(
    doc: &Value,
    ops: &[Operation],
    ids: &IdentifierSpec,
) -> Result<Value, PatchError> {
    apply_normalized(doc, ops, ids).map(|(value, _)| value)
}

/// Like [`apply_ops`], but also returns the normalized operation list:
/// the same logical paths, with each `_prev` recomputed from the document
/// state the operation actually saw. Sequential pre-images are what makes
/// reversal of a multi-operation diff sound.
pub(crate) fn apply_normalized(
    doc: &Value,
    ops: &[Operation],
    ids: &IdentifierSpec,
) -> Result<(Value, Vec<Operation>), PatchError> {
    let mut shadow = doc.clone();
    let mut normalized = Vec::with_capacity(ops.len());
    for op in ops {
        normalized.push(apply_one(&mut shadow, op, ids)?);
        validate_unique(&shadow, ids)?;
    }
    Ok((shadow, normalized))
}

/// Apply a single operation in place, returning its normalized form.
fn apply_one(
    doc: &mut Value,
    op: &Operation,
    ids: &IdentifierSpec,
) -> Result<Operation, PatchError> {
    match op {
        Operation::Add { path, value } => {
            let canonical = compile_insertion(doc, path, ids)?;
            insert(doc, &canonical, value.clone())?;
            Ok(Operation::Add {
                path: path.clone(),
                value: value.clone(),
            })
        }
        Operation::Remove { path, .. } => {
            let canonical = compile(doc, path, ids)?;
            let prev = take(doc, &canonical)?;
            Ok(Operation::Remove {
                path: path.clone(),
                prev: Some(prev),
            })
        }
        Operation::Replace { path, value, .. } => {
            let canonical = compile(doc, path, ids)?;
            let prev = replace(doc, &canonical, value.clone())?;
            Ok(Operation::Replace {
                path: path.clone(),
                value: value.clone(),
                prev: Some(prev),
            })
        }
        Operation::Move { from, path } => {
            let canonical_from = compile(doc, from, ids)?;
            // The no-op check must run while the element is still in
            // place; the destination proper is compiled only after the
            // removal, so bracket and bounds resolution see the shifted
            // array.
            if compile(doc, path, ids)? != canonical_from {
                let moved = take(doc, &canonical_from)?;
                let canonical_to = compile_insertion(doc, path, ids)?;
                insert(doc, &canonical_to, moved)?;
            }
            Ok(Operation::Move {
                from: from.clone(),
                path: path.clone(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical-pointer navigation
// ---------------------------------------------------------------------------

fn miss(path: &str, detail: impl Into<String>) -> PatchError {
    PatchError::PointerMiss {
        path: path.to_owned(),
        detail: detail.into(),
    }
}

/// Navigate a canonical path (keys and in-range indices only) to a
/// mutable reference.
fn descend_mut<'doc>(doc: &'doc mut Value, path: &str) -> Result<&'doc mut Value, PatchError> {
    let mut cursor = doc;
    if path.is_empty() {
        return Ok(cursor);
    }
    for part in path.split('/').skip(1) {
        cursor = match cursor {
            Value::Object(map) => map
                .get_mut(part)
                .ok_or_else(|| miss(path, format!("key `{part}` not found")))?,
            Value::Array(items) => {
                let index: usize = part
                    .parse()
                    .map_err(|_| miss(path, format!("invalid array index `{part}`")))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| miss(path, "index out of range"))?
            }
            _ => return Err(miss(path, "not a container")),
        };
    }
    Ok(cursor)
}

/// Insert `value` at a canonical path.
fn insert(doc: &mut Value, canonical: &str, value: Value) -> Result<(), PatchError> {
    let Some((parent_path, last)) = split_last(canonical) else {
        *doc = value;
        return Ok(());
    };
    let parent = descend_mut(doc, parent_path)?;
    match parent {
        Value::Object(map) => {
            map.insert(last.to_owned(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index: usize = last
                .parse()
                .map_err(|_| miss(canonical, format!("invalid array index `{last}`")))?;
            if index > items.len() {
                return Err(miss(canonical, "index out of range"));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(miss(canonical, "cannot add into a scalar")),
    }
}

/// Remove and return the value at a canonical path.
fn take(doc: &mut Value, canonical: &str) -> Result<Value, PatchError> {
    let Some((parent_path, last)) = split_last(canonical) else {
        return Err(miss(canonical, "cannot remove the document root"));
    };
    let parent = descend_mut(doc, parent_path)?;
    match parent {
        Value::Object(map) => map
            .remove(last)
            .ok_or_else(|| miss(canonical, format!("cannot remove nonexistent key `{last}`"))),
        Value::Array(items) => {
            if last == "-" {
                return items
                    .pop()
                    .ok_or_else(|| miss(canonical, "index out of range"));
            }
            let index: usize = last
                .parse()
                .map_err(|_| miss(canonical, "index out of range"))?;
            if index >= items.len() {
                return Err(miss(canonical, "index out of range"));
            }
            Ok(items.remove(index))
        }
        _ => Err(miss(canonical, "cannot remove from a scalar")),
    }
}

/// Replace the value at a canonical path, returning the pre-image.
fn replace(doc: &mut Value, canonical: &str, value: Value) -> Result<Value, PatchError> {
    let target = descend_mut(doc, canonical)?;
    Ok(std::mem::replace(target, value))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
