//! Operation inversion.
//!
//! [`reverse_ops`] turns an operation list into one that undoes it when
//! applied immediately afterwards: operations come back in reverse order
//! with values and pre-images swapped. Trailing array segments are
//! remapped so the inverse stays meaningful while indices shift — an
//! inverted add removes by the added value's identity, and an inverted
//! identity-keyed remove re-inserts at the array head, leaving replayed
//! history to restore the final position.

use serde_json::Value;

use crate::identity::{IdentifierSpec, bracket, resolve_identity};
use crate::patch::Operation;
use crate::path::{is_bracket, is_index, split_last};

/// Invert an operation list.
///
/// `prev` fields are expected to be engine-populated (see the patch
/// applier's normalization); a missing pre-image inverts to `null`.
#[must_use]
pub fn reverse_ops(ops: &[Operation], ids: &IdentifierSpec) -> Vec<Operation> {
    ops.iter().rev().map(|op| reverse_one(op, ids)).collect()
}

fn reverse_one(op: &Operation, ids: &IdentifierSpec) -> Operation {
    match op {
        Operation::Add { path, value } => Operation::Remove {
            path: bind_trailing_identity(path, value, ids),
            prev: Some(value.clone()),
        },
        Operation::Remove { path, prev } => Operation::Add {
            path: rehome_trailing_bracket(path),
            value: prev.clone().unwrap_or(Value::Null),
        },
        Operation::Replace { path, value, prev } => Operation::Replace {
            path: path.clone(),
            value: prev.clone().unwrap_or(Value::Null),
            prev: Some(value.clone()),
        },
        Operation::Move { from, path } => Operation::Move {
            from: path.clone(),
            path: from.clone(),
        },
    }
}

/// Rewrite a trailing index, bracket, or `-` segment to the bracket form
/// of the added value's identity, so the inverse removal binds to the
/// object even if array indices have shifted. Object-key tails are left
/// alone; a sentinel tail on an identity-less value stays `-`, where the
/// inverse removal takes the element the add appended.
fn bind_trailing_identity(path: &str, value: &Value, ids: &IdentifierSpec) -> String {
    let Some(id) = resolve_identity(value, ids) else {
        return path.to_owned();
    };
    let Some((head, last)) = split_last(path) else {
        return path.to_owned();
    };
    if is_index(last) || is_bracket(last) || last == "-" {
        format!("{head}/{}", bracket(&id))
    } else {
        path.to_owned()
    }
}

/// Rewrite a trailing bracket segment to `0`: the re-insertion point
/// after a rewind is the array head.
fn rehome_trailing_bracket(path: &str) -> String {
    match split_last(path) {
        Some((head, last)) if is_bracket(last) => format!("{head}/0"),
        _ => path.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------
