//! Coalescing consecutive edits to the same field.
//!
//! While a batch is in flight, a client keeps accumulating edits. Rapid
//! repeated edits of one field (typing a column name, dragging a node) would
//! otherwise pile up one operation per keystroke or frame.

use flowsync_doc::{Access, Operation};
use tracing::trace;

/// True if `newer` fully supersedes `older`: same kind of setter, same node,
/// same sub-item index and, for `set_input`, same slot.
///
/// Structural operations (node and index lifecycle, item insert/delete) are
/// never replaceable; dropping one would lose an edit.
pub fn can_replace(older: &Operation, newer: &Operation) -> bool {
    if older.name() != newer.name() || older.node_id() != newer.node_id() {
        return false;
    }

    match (older, newer) {
        (Operation::InsertNode { .. }, _)
        | (Operation::DeleteNode { .. }, _)
        | (Operation::InsertIndex { .. }, _)
        | (Operation::DeleteIndex { .. }, _) => false,
        (Operation::SetInput { name: a, .. }, Operation::SetInput { name: b, .. }) => a == b,
        _ => match (older.item(), newer.item()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.access == Access::Update && a == b,
            _ => false,
        },
    }
}

/// True if `incoming` can replace the equally long tail of `existing`.
pub fn replaces_tail(existing: &[Operation], incoming: &[Operation]) -> bool {
    if incoming.is_empty() || existing.len() < incoming.len() {
        return false;
    }
    let tail = &existing[existing.len() - incoming.len()..];
    tail.iter().zip(incoming).all(|(older, newer)| can_replace(older, newer))
}

/// Append `incoming` to `existing`, or overwrite the tail it supersedes.
/// Returns true when the tail was replaced.
pub fn merge_batch(existing: &mut Vec<Operation>, incoming: &[Operation]) -> bool {
    if replaces_tail(existing, incoming) {
        let keep = existing.len() - incoming.len();
        existing.truncate(keep);
        existing.extend_from_slice(incoming);
        trace!(count = incoming.len(), "coalesced edits");
        true
    } else {
        existing.extend_from_slice(incoming);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsync_doc::{InputName, NodeId};

    fn cast_name(name: &str) -> Operation {
        Operation::SetCastName {
            id: NodeId::from("c"),
            name: name.into(),
        }
    }

    #[test]
    fn test_same_field_replaces() {
        let mut batch = vec![cast_name("a")];
        assert!(merge_batch(&mut batch, &[cast_name("b")]));
        assert_eq!(batch, vec![cast_name("b")]);
    }

    #[test]
    fn test_different_field_appends() {
        let mut batch = vec![cast_name("a")];
        let column = Operation::SetCastColumn {
            id: NodeId::from("c"),
            column: "x".into(),
        };
        assert!(!merge_batch(&mut batch, &[column.clone()]));
        assert_eq!(batch, vec![cast_name("a"), column]);
    }

    #[test]
    fn test_set_input_slots_are_distinct() {
        let set = |name| Operation::SetInput {
            id: NodeId::from("u"),
            name,
            input: None,
        };
        assert!(can_replace(&set(InputName::Primary), &set(InputName::Primary)));
        assert!(!can_replace(&set(InputName::Primary), &set(InputName::Secondary)));
    }

    #[test]
    fn test_structural_ops_never_replace() {
        let delete = Operation::DeleteSelect {
            id: NodeId::from("s"),
            index: 0,
        };
        assert!(!can_replace(&delete, &delete));
        let place = Operation::InsertIndex {
            id: NodeId::from("s"),
            index: 0,
        };
        assert!(!can_replace(&place, &place));
    }

    #[test]
    fn test_empty_incoming_is_noop() {
        let mut batch = vec![cast_name("a")];
        assert!(!merge_batch(&mut batch, &[]));
        assert_eq!(batch.len(), 1);
    }
}
