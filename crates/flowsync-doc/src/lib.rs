//! # flowsync-doc
//!
//! Document model for collaboratively edited pipeline graphs.
//!
//! This crate provides:
//! - The node schema (ten node kinds, their input slots and sub-item lists)
//! - The operation vocabulary that edits a document
//! - An executor that applies operations and builds their exact inverses
//! - A cycle guard that keeps the input graph acyclic
//! - Batch sequence validation for node lifecycle pairs
//!
//! ## Example
//!
//! ```rust
//! use flowsync_doc::{Document, NodeKind, Outcome, Operation, Position};
//!
//! let doc = Document::new();
//! let ops = doc.create_node_ops(NodeKind::LoadCsv, Position::new(0.0, 0.0));
//! let batch = doc.apply_batch(&ops).unwrap();
//! assert_eq!(batch.doc.len(), 1);
//!
//! let id = batch.doc.index[0].clone();
//! let rename = Operation::SetLoadCsvFilename { id, filename: "sales.csv".into() };
//! match batch.doc.apply(&rename).unwrap() {
//!     Outcome::Applied { doc, undo } => {
//!         let restored = doc.apply_batch(&[undo]).unwrap().doc;
//!         assert_eq!(restored, batch.doc);
//!     }
//!     Outcome::Rejected(_) => unreachable!(),
//! }
//! ```

pub mod cycle;
pub mod demo;
pub mod document;
pub mod error;
pub mod node;
pub mod operation;
pub mod sequence;
pub mod types;

pub use cycle::{check_acyclic, find_cycle};
pub use demo::demo_ops;
pub use document::{BatchOutcome, Document, Outcome, Rejection};
pub use error::{DocError, Result};
pub use node::{
    AggregateNode, CaseNode, CastNode, ComputeNode, FilterNode, JoinNode, LoadCsvNode, Node,
    NodeBody, NodeId, NodeKind, SelectNode, SortNode, UnionNode,
};
pub use operation::{Access, Family, ItemRef, Operation};
pub use sequence::validate_sequence;
pub use types::{
    Aggregate, AggregateComputation, Case, ComputeOperation, DataType, FilterPredicate, InputName,
    JoinColumn, JoinType, Position, SelectColumn, SortDirection, Sorter, Value,
};
