//! dovetail — collaborative editing engine for JSON tree documents.
//!
//! Peers exchange ordered batches of mutations ("changes"), each tagged
//! with a logical timestamp and an originator id. A [`Document`] keeps
//! the materialized tree together with a totally ordered, reversible
//! history of applied changes, and reconciles out-of-order arrivals by
//! rewinding newer changes, applying the incoming one, and replaying the
//! rest — last-writer-wins by `(timestamp, originator)`.
//!
//! Array elements are addressed by identity rather than index
//! (`/cards/[card-1]/title`), so edits stay semantically stable while
//! elements are reordered or inserted. Which keys carry an element's
//! identity is declared per document with an [`IdentifierSpec`].
//!
//! ```
//! use dovetail::{Change, Document, Operation};
//! use serde_json::json;
//!
//! let mut doc = Document::from_json(br#"{"cards":[{"id":"c1","title":"old"}]}"#)?;
//! doc.apply_change(Change {
//!     diff: vec![Operation::Replace {
//!         path: "/cards/[c1]/title".to_owned(),
//!         value: json!("new"),
//!         prev: None,
//!     }],
//!     timestamp_ms: 1,
//!     originator_id: "peer-a".to_owned(),
//!     seq: 0,
//!     change_id: "g1".to_owned(),
//!     message_id: None,
//! })?;
//! assert_eq!(doc.raw(), &json!({"cards": [{"id": "c1", "title": "new"}]}));
//! # Ok::<(), dovetail::DocumentError>(())
//! ```

pub mod diff;
pub mod document;
pub mod error;
pub mod identity;
pub mod patch;
pub mod path;
pub mod reverse;

pub use diff::diff_values;
pub use document::{Change, Document, DocumentOptions};
pub use error::{DocumentError, PatchError};
pub use identity::{IdentifierSpec, resolve_identity, validate_unique};
pub use patch::{Operation, apply_ops};
pub use path::{compile, compile_insertion};
pub use reverse::reverse_ops;
