//! Identifier specs and identity resolution.
//!
//! Array elements are addressed by identity rather than index: an
//! [`IdentifierSpec`] lists the key-paths that may carry an element's
//! identity, and [`resolve_identity`] extracts the first scalar match.
//! Identity-keyed addressing only stays sound while identities are unique
//! among siblings, which [`validate_unique`] enforces after every mutation.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::PatchError;

/// Sentinel used when sibling objects carry no resolvable identity.
/// Two such siblings in one array are still a conflict.
const MISSING_ID: &str = "missing id";

// ---------------------------------------------------------------------------
// IdentifierSpec
// ---------------------------------------------------------------------------

/// Ordered list of key-paths used to extract a stable identity from
/// object elements.
///
/// Key-paths are tried in order; the first whose terminal key holds a
/// string or number yields the identity. The default spec is `[["id"]]`.
/// An empty spec disables identity resolution and uniqueness checking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentifierSpec(Vec<Vec<String>>);

impl IdentifierSpec {
    /// Create a spec from explicit key-paths.
    #[must_use]
    pub const fn new(key_paths: Vec<Vec<String>>) -> Self {
        Self(key_paths)
    }

    /// Create a spec from borrowed key segments, e.g.
    /// `IdentifierSpec::from_keys(&[&["attrs", "id"], &["id"]])`.
    #[must_use]
    pub fn from_keys(key_paths: &[&[&str]]) -> Self {
        Self(
            key_paths
                .iter()
                .map(|path| path.iter().map(|key| (*key).to_owned()).collect())
                .collect(),
        )
    }

    /// The key-paths, in resolution order.
    #[must_use]
    pub fn key_paths(&self) -> &[Vec<String>] {
        &self.0
    }

    /// `true` if the spec has no key-paths (identity handling disabled).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for IdentifierSpec {
    fn default() -> Self {
        Self(vec![vec!["id".to_owned()]])
    }
}

// ---------------------------------------------------------------------------
// Identity resolution
// ---------------------------------------------------------------------------

/// Render a number the way identities embed it: integers as decimal,
/// integral doubles without a decimal point, everything else in shortest
/// round-trip form.
pub(crate) fn number_text(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    n.as_f64().map_or_else(|| n.to_string(), |f| f.to_string())
}

/// Wrap an identity in the `[` `]` path form.
pub(crate) fn bracket(id: &str) -> String {
    format!("[{id}]")
}

/// Resolve the identity of `value` under `ids`.
///
/// Returns `None` for non-objects. Key-paths are tried in order; a path
/// whose keys are absent falls through to the next one, but a terminal
/// that exists and is not a string or number ends resolution with no
/// identity.
#[must_use]
pub fn resolve_identity(value: &Value, ids: &IdentifierSpec) -> Option<String> {
    let map = value.as_object()?;
    for key_path in ids.key_paths() {
        let Some((terminal, intermediates)) = key_path.split_last() else {
            continue;
        };
        let mut cursor = map;
        let mut found = true;
        for key in intermediates {
            match cursor.get(key).and_then(Value::as_object) {
                Some(next) => cursor = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if !found {
            continue;
        }
        match cursor.get(terminal) {
            None => {}
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(number_text(n)),
            Some(_) => return None,
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Duplicate-identity validation
// ---------------------------------------------------------------------------

/// Check that no two sibling object elements of any array in `value`
/// resolve to the same identity.
///
/// Non-object elements are excluded. Object elements with no resolvable
/// identity all collapse to the `missing id` sentinel, so two of them in
/// one array are also a conflict.
///
/// # Errors
/// Returns [`PatchError::IdentityConflict`] naming the duplicated
/// identity and the path of the second offending element.
pub fn validate_unique(value: &Value, ids: &IdentifierSpec) -> Result<(), PatchError> {
    if ids.is_empty() {
        return Ok(());
    }
    walk(value, "", ids)
}

fn walk(value: &Value, path: &str, ids: &IdentifierSpec) -> Result<(), PatchError> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                walk(child, &format!("{path}/{key}"), ids)?;
            }
        }
        Value::Array(items) => {
            let mut seen: BTreeSet<String> = BTreeSet::new();
            for (index, item) in items.iter().enumerate() {
                let child_path = format!("{path}/{index}");
                match item {
                    Value::Object(_) => {
                        let label = resolve_identity(item, ids)
                            .map_or_else(|| MISSING_ID.to_owned(), |id| bracket(&id));
                        if !seen.insert(label.clone()) {
                            return Err(PatchError::IdentityConflict {
                                identity: label,
                                path: child_path,
                            });
                        }
                        walk(item, &child_path, ids)?;
                    }
                    Value::Array(_) => walk(item, &child_path, ids)?,
                    _ => {}
                }
            }
        }
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
