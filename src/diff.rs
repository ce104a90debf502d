//! Identity-aware structural diff.
//!
//! [`diff_values`] produces an operation list transforming one tree into
//! another. Arrays of identified objects are diffed by identity:
//! reorderings become `move` operations, element paths carry the identity
//! in bracket form wherever one exists, and insertions prefer the
//! "insert before this identity" form so they stay valid while
//! surrounding indices shift.
//!
//! Emission order for an identity-keyed array: moves, then removals and
//! nested edits in left order, then additions in right order. Moves are
//! planned against a simulated working copy, walking target positions
//! from the back and skipping elements that are already in place; the
//! same simulation keeps removal indices for identity-less elements
//! valid at apply time.

use std::collections::HashMap;

use serde_json::Value;

use crate::identity::{IdentifierSpec, bracket, resolve_identity};
use crate::patch::Operation;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Compute the operations that transform `left` into `right`.
#[must_use]
pub fn diff_values(left: &Value, right: &Value, ids: &IdentifierSpec) -> Vec<Operation> {
    let mut ops = Vec::new();
    compare(&mut ops, "", Some(left), Some(right), ids);
    ops
}

// ---------------------------------------------------------------------------
// Recursive comparison
// ---------------------------------------------------------------------------

fn compare(
    ops: &mut Vec<Operation>,
    path: &str,
    left: Option<&Value>,
    right: Option<&Value>,
    ids: &IdentifierSpec,
) {
    // A null object member counts as absent: null on the right removes an
    // existing key, and a right-only null key produces nothing. Array
    // elements never reach this filter (compare_arrays handles them
    // positionally).
    let left = left.filter(|value| !value.is_null());
    let right = right.filter(|value| !value.is_null());

    match (left, right) {
        (None, None) => {}
        (Some(prev), None) => ops.push(Operation::Remove {
            path: path.to_owned(),
            prev: Some(prev.clone()),
        }),
        (None, Some(value)) => ops.push(Operation::Add {
            path: path.to_owned(),
            value: value.clone(),
        }),
        (Some(Value::Object(left_map)), Some(Value::Object(right_map))) => {
            compare_objects(ops, path, left_map, right_map, ids);
        }
        (Some(Value::Array(left_items)), Some(Value::Array(right_items))) => {
            compare_arrays(ops, path, left_items, right_items, ids);
        }
        (Some(prev), Some(value)) => {
            // Scalars of any kinds, or a container/scalar type change.
            if prev != value {
                ops.push(Operation::Replace {
                    path: path.to_owned(),
                    value: value.clone(),
                    prev: Some(prev.clone()),
                });
            }
        }
    }
}

fn compare_objects(
    ops: &mut Vec<Operation>,
    path: &str,
    left: &serde_json::Map<String, Value>,
    right: &serde_json::Map<String, Value>,
    ids: &IdentifierSpec,
) {
    for (key, left_value) in left {
        compare(ops, &format!("{path}/{key}"), Some(left_value), right.get(key), ids);
    }
    for (key, right_value) in right {
        if !left.contains_key(key) {
            compare(ops, &format!("{path}/{key}"), None, Some(right_value), ids);
        }
    }
}

fn compare_arrays(
    ops: &mut Vec<Operation>,
    path: &str,
    left: &[Value],
    right: &[Value],
    ids: &IdentifierSpec,
) {
    if left.iter().all(is_scalar) && right.iter().all(is_scalar) {
        if left != right {
            ops.push(Operation::Replace {
                path: path.to_owned(),
                value: Value::Array(right.to_vec()),
                prev: Some(Value::Array(left.to_vec())),
            });
        }
        return;
    }

    // Pair left elements with right positions by identity.
    let mut right_index: HashMap<String, usize> = HashMap::new();
    for (index, item) in right.iter().enumerate() {
        if let Some(id) = resolve_identity(item, ids) {
            right_index.insert(id, index);
        }
    }
    let mut handled = vec![false; right.len()];
    let matched: Vec<Option<usize>> = left
        .iter()
        .map(|item| {
            match resolve_identity(item, ids).and_then(|id| right_index.get(&id).copied()) {
                Some(target) if !handled[target] => {
                    handled[target] = true;
                    Some(target)
                }
                _ => None,
            }
        })
        .collect();

    // Moves. The simulation holds left indices and mirrors the array the
    // operations will see, one move at a time. An element is in place
    // when its rank among matched elements equals the rank of its target
    // position; walking targets from the back lets elements that settle
    // on their own be skipped. Unmatched elements only pad the indices —
    // they are removed afterwards, so relative order among the matched is
    // what has to come out right.
    let mut sim: Vec<usize> = (0..left.len()).collect();
    for target in (0..right.len()).rev() {
        let Some(left_at) = matched.iter().position(|m| *m == Some(target)) else {
            continue;
        };
        let Some(current) = sim.iter().position(|&slot| slot == left_at) else {
            continue;
        };
        let rank_now = sim[..current]
            .iter()
            .filter(|&&slot| matched[slot].is_some())
            .count();
        let rank_wanted = handled[..target].iter().filter(|&&h| h).count();
        if rank_now == rank_wanted {
            continue;
        }
        let slot = sim.remove(current);
        let insert_at = nth_matched_position(&sim, &matched, rank_wanted).unwrap_or(sim.len());
        ops.push(Operation::Move {
            from: format!(
                "{path}/{}",
                element_segment(&left[left_at], Some(&right[target]), left_at, ids)
            ),
            path: format!("{path}/{insert_at}"),
        });
        sim.insert(insert_at, slot);
    }

    // Removals and nested edits, in left order. Removals also leave the
    // simulation so that later numeric indices stay valid.
    for (left_at, item) in left.iter().enumerate() {
        if let Some(target) = matched[left_at] {
            let child = format!(
                "{path}/{}",
                element_segment(item, Some(&right[target]), left_at, ids)
            );
            compare(ops, &child, Some(item), Some(&right[target]), ids);
        } else {
            let Some(current) = sim.iter().position(|&slot| slot == left_at) else {
                continue;
            };
            let segment = resolve_identity(item, ids)
                .map_or_else(|| current.to_string(), |id| bracket(&id));
            ops.push(Operation::Remove {
                path: format!("{path}/{segment}"),
                prev: Some(item.clone()),
            });
            sim.remove(current);
        }
    }

    // Additions, in right order. When the next element is already placed
    // and identified, bind the insertion to it instead of to an index.
    for (target, item) in right.iter().enumerate() {
        if handled[target] {
            continue;
        }
        let segment = right
            .get(target + 1)
            .filter(|_| handled[target + 1])
            .and_then(|next| resolve_identity(next, ids))
            .map_or_else(|| target.to_string(), |id| bracket(&id));
        ops.push(Operation::Add {
            path: format!("{path}/{segment}"),
            value: item.clone(),
        });
    }
}

/// The simulation position of the `rank`-th matched element.
fn nth_matched_position(sim: &[usize], matched: &[Option<usize>], rank: usize) -> Option<usize> {
    sim.iter()
        .enumerate()
        .filter(|&(_, &slot)| matched[slot].is_some())
        .map(|(position, _)| position)
        .nth(rank)
}

/// The preferred path segment for an array element: left identity, else
/// right identity, else the numeric left index.
fn element_segment(
    left: &Value,
    right: Option<&Value>,
    left_at: usize,
    ids: &IdentifierSpec,
) -> String {
    resolve_identity(left, ids)
        .or_else(|| right.and_then(|value| resolve_identity(value, ids)))
        .map_or_else(|| left_at.to_string(), |id| bracket(&id))
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------
