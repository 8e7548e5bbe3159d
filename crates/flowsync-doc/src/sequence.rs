//! Structural checks on a submitted batch.
//!
//! Node lifecycle operations travel in pairs so that the index always stays
//! a permutation of the node set between batches:
//!
//! - `insert_node(X)` is immediately followed by `insert_index(X)`;
//! - `delete_index(X)` is immediately followed by `delete_node(X)` (removal)
//!   or `insert_index(X)` (reordering).

use crate::error::{DocError, Result};
use crate::operation::Operation;

pub fn validate_sequence(ops: &[Operation]) -> Result<()> {
    let mut open: Option<(usize, &Operation)> = None;

    for (position, op) in ops.iter().enumerate() {
        if let Some((_, opener)) = open.take() {
            let closes = match (opener, op) {
                (Operation::InsertNode { node }, Operation::InsertIndex { id, .. }) => &node.id == id,
                (Operation::DeleteIndex { id: opened, .. }, Operation::DeleteNode { id })
                | (Operation::DeleteIndex { id: opened, .. }, Operation::InsertIndex { id, .. }) => {
                    opened == id
                }
                _ => false,
            };
            if !closes {
                return Err(DocError::InvalidSequence {
                    position,
                    reason: expected_after(opener),
                });
            }
            continue;
        }

        if matches!(op, Operation::InsertNode { .. } | Operation::DeleteIndex { .. }) {
            open = Some((position, op));
        }
    }

    match open {
        Some((position, opener)) => Err(DocError::InvalidSequence {
            position,
            reason: format!("batch ends before {}", expected_after(opener)),
        }),
        None => Ok(()),
    }
}

fn expected_after(opener: &Operation) -> String {
    match opener {
        Operation::InsertNode { node } => format!("insert_node must be followed by insert_index of {}", node.id),
        other => format!(
            "{} must be followed by delete_node or insert_index of {}",
            other.name(),
            other.node_id()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::node::{NodeId, NodeKind};
    use crate::types::Position;

    #[test]
    fn test_canonical_sequences_pass() {
        let doc = Document::new();
        let ops = doc.create_node_ops(NodeKind::Filter, Position::default());
        assert!(validate_sequence(&ops).is_ok());

        let doc = doc.apply_batch(&ops).unwrap().doc;
        let id = doc.index[0].clone();
        assert!(validate_sequence(&doc.remove_node_ops(&id).unwrap()).is_ok());
        assert!(validate_sequence(&[]).is_ok());
    }

    #[test]
    fn test_unpaired_insert_node() {
        let doc = Document::new();
        let mut ops = doc.create_node_ops(NodeKind::Filter, Position::default());
        ops.pop();
        let err = validate_sequence(&ops).unwrap_err();
        assert!(matches!(err, DocError::InvalidSequence { position: 0, .. }));
    }

    #[test]
    fn test_delete_index_followed_by_other_node() {
        let ops = vec![
            Operation::DeleteIndex {
                id: NodeId::from("a"),
                index: 0,
            },
            Operation::DeleteNode {
                id: NodeId::from("b"),
            },
        ];
        let err = validate_sequence(&ops).unwrap_err();
        assert!(matches!(err, DocError::InvalidSequence { position: 1, .. }));
    }
}
