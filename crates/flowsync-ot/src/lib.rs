//! # flowsync-ot
//!
//! Operational transform for flowsync documents.
//!
//! One authoritative server orders all batches. Clients apply their own
//! edits optimistically and, when another client's batch is ordered first,
//! rebase their outstanding edits over it. This crate provides:
//! - Forward and backward pairwise transforms with the index-shift rule
//! - `map`, which re-addresses edits of items created in the same batch
//! - `rebase` and `transform_batch`
//! - Batch compaction for coalescing repeated edits before sending
//!
//! ## Example
//!
//! ```rust
//! use flowsync_doc::{NodeId, Operation};
//! use flowsync_ot::rebase;
//!
//! let id = NodeId::from("select");
//! let local = vec![Operation::SetSelectAlias { id: id.clone(), index: 2, alias: "foo".into() }];
//! let remote = vec![Operation::DeleteSelect { id: id.clone(), index: 1 }];
//!
//! let rebased = rebase(&local, &remote).unwrap();
//! assert_eq!(
//!     rebased,
//!     vec![Some(Operation::SetSelectAlias { id, index: 1, alias: "foo".into() })]
//! );
//! ```

pub mod compact;
pub mod error;
pub mod rebase;
pub mod transform;

pub use compact::{can_replace, merge_batch, replaces_tail};
pub use error::{Result, TransformError};
pub use rebase::{rebase, transform_batch};
pub use transform::{map, transform_backward, transform_forward};
