//! Rebasing a local batch over a remote one.
//!
//! Both the client and the server run the same procedure: the client when a
//! remote batch overtakes its outstanding edits, the server when a batch
//! arrives at a stale version. Because it is deterministic, both ends land
//! on the same operations.

use crate::error::Result;
use crate::transform::{map, shift_forward, transform_backward, transform_forward};
use flowsync_doc::Operation;
use tracing::debug;

/// Rebase `local` so it applies after `remote`.
///
/// The output has one entry per local operation; `None` marks an operation
/// that no longer has a target. For each local operation:
///
/// 1. transform it backward over the earlier local operations, newest first,
///    to express it against the shared base; if that is undecidable because
///    an earlier operation created its target, re-address the partly
///    transformed operation with [`map`] using the rebased form of that
///    operation and skip step 2;
/// 2. transform it forward over every remote operation;
/// 3. transform it forward over the rebased local operations that come
///    after the base it now refers to. These are its own history, not
///    concurrent edits, so a repeated placement of a node is shifted rather
///    than dropped.
pub fn rebase(local: &[Operation], remote: &[Operation]) -> Result<Vec<Option<Operation>>> {
    let mut rebased: Vec<Option<Operation>> = Vec::with_capacity(local.len());

    for (i, op) in local.iter().enumerate() {
        let mut current = Some(op.clone());
        let mut forward_from = 0;
        let mut mapped = false;

        for j in (0..i).rev() {
            let Some(candidate) = current.take() else { break };
            match transform_backward(&candidate, &local[j]) {
                Some(next) => current = Some(next),
                None => {
                    current = match &rebased[j] {
                        Some(creator) => Some(map(&candidate, creator)?),
                        None => None,
                    };
                    forward_from = j + 1;
                    mapped = true;
                    break;
                }
            }
        }

        if !mapped {
            for pre in remote {
                let Some(candidate) = current.take() else { break };
                current = transform_forward(&candidate, pre);
            }
        }

        for pre in rebased[forward_from..i].iter().flatten() {
            let Some(candidate) = current.take() else { break };
            current = shift_forward(&candidate, pre);
        }

        if current.is_none() {
            debug!(op = op.name(), id = %op.node_id(), "dropped during rebase");
        }
        rebased.push(current);
    }

    Ok(rebased)
}

/// [`rebase`] with dropped operations removed.
pub fn transform_batch(batch: &[Operation], preceding: &[Operation]) -> Result<Vec<Operation>> {
    Ok(rebase(batch, preceding)?.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsync_doc::{Document, Node, NodeId, NodeKind, Position, SelectColumn};

    fn n() -> NodeId {
        NodeId::from("n")
    }

    #[test]
    fn test_empty_remote_is_identity() {
        let local = vec![
            Operation::InsertSelect {
                id: n(),
                index: 1,
                column: SelectColumn::default(),
            },
            Operation::SetSelectAlias {
                id: n(),
                index: 1,
                alias: "a".into(),
            },
            Operation::DeleteSelect { id: n(), index: 0 },
        ];
        assert_eq!(transform_batch(&local, &[]).unwrap(), local);
    }

    #[test]
    fn test_items_of_new_node_keep_their_slots() {
        let x = NodeId::from("x");
        let node = Node::template(NodeKind::Select, x.clone(), Position::default());
        let mut local = Document::new().add_node_ops(node);
        for index in 1..3 {
            local.push(Operation::InsertSelect {
                id: x.clone(),
                index,
                column: SelectColumn {
                    column: format!("c{index}"),
                    alias: String::new(),
                },
            });
        }
        local.push(Operation::SetSelectAlias {
            id: x,
            index: 2,
            alias: "last".into(),
        });
        assert_eq!(transform_batch(&local, &[]).unwrap(), local);
    }

    #[test]
    fn test_created_item_follows_its_insert() {
        // insert at 1, then edit what was inserted; remote inserts at 0
        let local = vec![
            Operation::InsertSelect {
                id: n(),
                index: 1,
                column: SelectColumn::default(),
            },
            Operation::SetSelectAlias {
                id: n(),
                index: 1,
                alias: "a".into(),
            },
        ];
        let remote = vec![Operation::InsertSelect {
            id: n(),
            index: 0,
            column: SelectColumn::default(),
        }];
        let rebased = transform_batch(&local, &remote).unwrap();
        assert_eq!(rebased[0].item().unwrap().index, 2);
        assert_eq!(rebased[1].item().unwrap().index, 2);
    }

    #[test]
    fn test_edit_of_dropped_creation_is_dropped() {
        let local = vec![
            Operation::InsertSelect {
                id: n(),
                index: 0,
                column: SelectColumn::default(),
            },
            Operation::SetSelectAlias {
                id: n(),
                index: 0,
                alias: "a".into(),
            },
        ];
        let remote = vec![Operation::DeleteNode { id: n() }];
        assert_eq!(rebase(&local, &remote).unwrap(), vec![None, None]);
    }
}
