//! Logical-path compilation.
//!
//! Logical paths may address array elements by identity (`/cards/[c1]`)
//! and carry the end-of-array sentinel `-`. The compiler rewrites them
//! into canonical pointer paths — literal keys, numeric indices, `-` —
//! against a concrete document. [`compile`] resolves element targets;
//! [`compile_insertion`] additionally folds a trailing at-or-past-end
//! index into the sentinel, for positions being inserted into.
//!
//! Grammar (no JSON-Pointer escaping; keys are any characters except `/`,
//! ids any characters except `/` and `]`):
//!
//! ```text
//! path    ::= ("/" segment)*
//! segment ::= key | index | "[" id "]" | "-"
//! ```

use serde_json::Value;

use crate::error::PatchError;
use crate::identity::{IdentifierSpec, resolve_identity};

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

/// One segment of a logical path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    /// Literal object key or decimal array index, passed through verbatim.
    Literal(String),
    /// `[id]` — an array element addressed by identity.
    Id(String),
    /// `-` — end of array.
    End,
}

/// Split a logical path into segments. The empty path addresses the
/// document root and has no segments.
pub(crate) fn parse(path: &str) -> Vec<Segment> {
    if path.is_empty() {
        return Vec::new();
    }
    path.strip_prefix('/')
        .unwrap_or(path)
        .split('/')
        .map(|part| {
            if part == "-" {
                Segment::End
            } else if is_bracket(part) {
                Segment::Id(part[1..part.len() - 1].to_owned())
            } else {
                Segment::Literal(part.to_owned())
            }
        })
        .collect()
}

/// `true` for `[...]` segments.
pub(crate) fn is_bracket(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('[') && segment.ends_with(']')
}

/// `true` for decimal-index segments.
pub(crate) fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Split a path into everything before the last `/` and the last segment.
/// Returns `None` for the root path.
pub(crate) fn split_last(path: &str) -> Option<(&str, &str)> {
    path.rfind('/').map(|at| (&path[..at], &path[at + 1..]))
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compile a logical path against `doc` into canonical pointer form.
///
/// Bracket segments are resolved by scanning the array at that position
/// for the first element whose identity matches. Literal segments pass
/// through unchanged, including out-of-range indices — the applier
/// decides whether those are an append point or a pointer miss.
///
/// # Errors
/// Returns [`PatchError::IdentityMissing`] when a bracket segment matches
/// no element, or when its parent cannot be resolved to an array.
pub fn compile(doc: &Value, path: &str, ids: &IdentifierSpec) -> Result<String, PatchError> {
    let segments = parse(path);
    let mut canonical: Vec<String> = Vec::with_capacity(segments.len());
    let mut cursor: Option<&Value> = Some(doc);

    for segment in &segments {
        match segment {
            Segment::Literal(text) => {
                canonical.push(text.clone());
                cursor = cursor.and_then(|value| child(value, text));
            }
            Segment::End => {
                canonical.push("-".to_owned());
                cursor = None;
            }
            Segment::Id(id) => {
                let missing = || PatchError::IdentityMissing {
                    id: id.clone(),
                    path: path.to_owned(),
                };
                let items = cursor.and_then(Value::as_array).ok_or_else(missing)?;
                let at = items
                    .iter()
                    .position(|item| resolve_identity(item, ids).as_deref() == Some(id.as_str()))
                    .ok_or_else(missing)?;
                canonical.push(at.to_string());
                cursor = Some(&items[at]);
            }
        }
    }

    if canonical.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("/{}", canonical.join("/")))
    }
}

/// Compile an insertion target: like [`compile`], with a trailing index
/// at or past the end of its array parent rewritten to the `-` sentinel,
/// so inserting at the length appends.
///
/// # Errors
/// See [`compile`].
pub fn compile_insertion(doc: &Value, path: &str, ids: &IdentifierSpec) -> Result<String, PatchError> {
    let canonical = compile(doc, path, ids)?;
    if let Some((head, last)) = split_last(&canonical) {
        if let Ok(index) = last.parse::<usize>() {
            if let Some(Value::Array(items)) = value_at(doc, head) {
                if index >= items.len() {
                    return Ok(format!("{head}/-"));
                }
            }
        }
    }
    Ok(canonical)
}

/// Navigate a canonical path read-only.
fn value_at<'doc>(doc: &'doc Value, canonical: &str) -> Option<&'doc Value> {
    let mut cursor = doc;
    if canonical.is_empty() {
        return Some(cursor);
    }
    for part in canonical.split('/').skip(1) {
        cursor = child(cursor, part)?;
    }
    Some(cursor)
}

/// Navigate one literal segment down from `value`, by key for objects and
/// by parsed index for arrays.
fn child<'doc>(value: &'doc Value, segment: &str) -> Option<&'doc Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
