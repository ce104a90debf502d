//! Cross-cutting engine invariants.
//!
//! - idempotency: applying a change id twice equals applying it once
//! - rollback: a failed mutation leaves the document bitwise unchanged
//! - round-trip: rewind plus fast-forward restores the rewound state
//! - order independence: every arrival order converges to the same
//!   state and history
//! - uniqueness: no mutation may introduce duplicate identities
//! - isolation: independent documents never observe each other

#![allow(clippy::all, clippy::pedantic, clippy::nursery)]

use dovetail::{Change, Document, Operation};
use serde_json::json;

fn replace(path: &str, value: serde_json::Value, ts: i64, gid: &str) -> Change {
    Change {
        diff: vec![Operation::Replace {
            path: path.to_owned(),
            value,
            prev: None,
        }],
        timestamp_ms: ts,
        originator_id: "peer".to_owned(),
        seq: 0,
        change_id: gid.to_owned(),
        message_id: None,
    }
}

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for (at, item) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(at);
        for mut tail in permutations(&rest) {
            tail.insert(0, item.clone());
            out.push(tail);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

#[test]
fn applying_twice_equals_applying_once() {
    let mut once = Document::from_json(br#"{"n":"a"}"#).unwrap();
    let mut twice = Document::from_json(br#"{"n":"a"}"#).unwrap();
    let c = replace("/n", json!("b"), 1, "g1");

    once.apply_change(c.clone()).unwrap();
    twice.apply_change(c.clone()).unwrap();
    twice.apply_change(c).unwrap();

    assert_eq!(once, twice);
    assert_eq!(twice.history().len(), 2);
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

#[test]
fn every_failure_path_leaves_the_document_unchanged() {
    let mut doc =
        Document::from_json(br#"{"name":"a","cards":[{"id":"c1"}],"tags":[1,2]}"#).unwrap();
    doc.apply_change(replace("/name", json!("b"), 1, "g1")).unwrap();
    let snapshot = doc.clone();

    let failing: Vec<Change> = vec![
        // pointer-miss: key does not exist
        Change {
            diff: vec![Operation::Remove {
                path: "/missing".to_owned(),
                prev: None,
            }],
            ..replace("/name", json!("x"), 2, "f1")
        },
        // pointer-miss: index out of range
        Change {
            diff: vec![Operation::Remove {
                path: "/tags/9".to_owned(),
                prev: None,
            }],
            ..replace("/name", json!("x"), 2, "f2")
        },
        // identity-missing: bracket matches nothing
        Change {
            diff: vec![Operation::Replace {
                path: "/cards/[ghost]/title".to_owned(),
                value: json!("x"),
                prev: None,
            }],
            ..replace("/name", json!("x"), 2, "f3")
        },
        // identity-conflict: a second c1 appears
        Change {
            diff: vec![Operation::Add {
                path: "/cards/-".to_owned(),
                value: json!({"id": "c1"}),
            }],
            ..replace("/name", json!("x"), 2, "f4")
        },
        // partial batch: first op succeeds, second fails
        Change {
            diff: vec![
                Operation::Replace {
                    path: "/name".to_owned(),
                    value: json!("half"),
                    prev: None,
                },
                Operation::Remove {
                    path: "/missing".to_owned(),
                    prev: None,
                },
            ],
            ..replace("/name", json!("x"), 2, "f5")
        },
    ];

    for change in failing {
        let gid = change.change_id.clone();
        assert!(doc.apply_change(change).is_err(), "change {gid} must fail");
        assert_eq!(doc, snapshot, "change {gid} must roll back");
    }
}

// ---------------------------------------------------------------------------
// Round-trip
// ---------------------------------------------------------------------------

#[test]
fn rewind_then_fast_forward_restores_the_state() {
    let mut doc = Document::from_json(br#"{"name":"a","count":0}"#).unwrap();
    doc.apply_change(replace("/name", json!("b"), 10, "g1")).unwrap();
    doc.apply_change(replace("/count", json!(1), 20, "g2")).unwrap();
    doc.apply_change(replace("/name", json!("c"), 30, "g3")).unwrap();

    let after = doc.clone();
    doc.rewind_to(10, "peer").unwrap();
    assert_eq!(doc.raw(), &json!({"name": "b", "count": 0}));
    assert_eq!(doc.stash().len(), 2);

    doc.fast_forward().unwrap();
    assert_eq!(doc, after);
}

// ---------------------------------------------------------------------------
// Order independence
// ---------------------------------------------------------------------------

#[test]
fn every_arrival_order_converges() {
    let changes = vec![
        replace("/name", json!("first"), 10, "g1"),
        replace("/name", json!("second"), 20, "g2"),
        replace("/name", json!("third"), 30, "g3"),
    ];

    let mut reference: Option<Document> = None;
    for order in permutations(&changes) {
        let mut doc = Document::from_json(br#"{"name":"start"}"#).unwrap();
        for change in order {
            doc.apply_change(change).unwrap();
        }
        assert_eq!(doc.raw(), &json!({"name": "third"}));
        match &reference {
            None => reference = Some(doc),
            Some(reference) => {
                assert_eq!(&doc, reference, "raw and history must match across orders");
            }
        }
    }
}

#[test]
fn interleaved_originators_converge() {
    let mut changes = vec![
        replace("/name", json!("a1"), 10, "g1"),
        replace("/name", json!("b1"), 10, "g2"),
        replace("/name", json!("a2"), 20, "g3"),
    ];
    changes[0].originator_id = "alice".to_owned();
    changes[1].originator_id = "bob".to_owned();
    changes[2].originator_id = "alice".to_owned();

    let mut reference: Option<Document> = None;
    for order in permutations(&changes) {
        let mut doc = Document::from_json(br#"{"name":"start"}"#).unwrap();
        for change in order {
            doc.apply_change(change).unwrap();
        }
        // (10, alice) < (10, bob) < (20, alice): last writer is g3.
        assert_eq!(doc.raw(), &json!({"name": "a2"}));
        match &reference {
            None => reference = Some(doc),
            Some(reference) => assert_eq!(&doc, reference),
        }
    }
}

// ---------------------------------------------------------------------------
// Uniqueness
// ---------------------------------------------------------------------------

#[test]
fn no_mutation_may_introduce_duplicate_identities() {
    let mut doc = Document::from_json(br#"{"cards":[{"id":"c1"},{"id":"c2"}]}"#).unwrap();
    let snapshot = doc.clone();

    let change = Change {
        diff: vec![Operation::Replace {
            path: "/cards/[c2]/id".to_owned(),
            value: json!("c1"),
            prev: None,
        }],
        ..replace("/x", json!(0), 1, "g1")
    };
    assert!(doc.apply_change(change).is_err());
    assert_eq!(doc, snapshot);
}

// ---------------------------------------------------------------------------
// Isolation
// ---------------------------------------------------------------------------

#[test]
fn independent_documents_are_driven_in_parallel() {
    let handles: Vec<_> = (0..4)
        .map(|n| {
            std::thread::spawn(move || {
                let mut doc = Document::from_json(br#"{"count":0}"#).unwrap();
                for ts in 0..50 {
                    doc.apply_change(replace("/count", json!(ts), ts, &format!("w{n}-{ts}")))
                        .unwrap();
                }
                doc.raw().clone()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), json!({"count": 49}));
    }
}

#[test]
fn clones_share_no_mutable_state() {
    let mut left = Document::from_json(br#"{"cards":[{"id":"c1","n":1}]}"#).unwrap();
    let right = left.clone();
    left.apply_change(replace("/cards/[c1]/n", json!(2), 1, "g1")).unwrap();
    assert_eq!(right.raw(), &json!({"cards": [{"id": "c1", "n": 1}]}));
    assert_eq!(right.history().len(), 1);
}
