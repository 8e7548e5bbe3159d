//! Pairwise operational transform.
//!
//! Only two things about an operation matter here: the node it targets and
//! the indexed slot it addresses ([`ItemRef`]). Two operations interact when
//! they address the same family in the same scope. The top-level index is
//! one shared sequence, so its scope ignores the node id; every sub-item
//! family is scoped to its node.
//!
//! Index-shift rule: an insert at `k` moves references at `>= k` up by one;
//! a delete at `k` moves references at `> k` down by one and drops
//! references at exactly `k`. Insert positions are gaps between items, so a
//! delete at `k` never drops an insert at `k`.

use crate::error::{Result, TransformError};
use flowsync_doc::{Access, Family, ItemRef, Operation};

fn same_scope(op: &Operation, item: &ItemRef, pre: &Operation, pre_item: &ItemRef) -> bool {
    item.family == pre_item.family
        && (item.family == Family::Index || op.node_id() == pre.node_id())
}

/// Both items, if `op` and `pre` address the same indexed sequence.
fn shared_sequence(op: &Operation, pre: &Operation) -> Option<(ItemRef, ItemRef)> {
    let item = op.item()?;
    let pre_item = pre.item()?;
    same_scope(op, &item, pre, &pre_item).then_some((item, pre_item))
}

fn shifted(op: &Operation, index: usize) -> Option<Operation> {
    Some(op.with_index(index))
}

/// Rewrite `op` so it applies after `pre`, where both were produced against
/// the same document. `None` means `pre` removed what `op` targets, or
/// already placed the node `op` wants to place.
pub fn transform_forward(op: &Operation, pre: &Operation) -> Option<Operation> {
    match (pre, op) {
        (Operation::InsertIndex { id: placed, .. }, Operation::InsertIndex { id, .. })
            if placed == id =>
        {
            None
        }
        _ => shift_forward(op, pre),
    }
}

/// Forward transform over an operation that precedes `op` in its own batch.
///
/// Two placements of one node in a single batch always have a removal in
/// between, so a repeated `insert_index` is shifted, never dropped.
pub(crate) fn shift_forward(op: &Operation, pre: &Operation) -> Option<Operation> {
    if let Operation::DeleteNode { id } = pre {
        if op.node_id() == id {
            return None;
        }
    }

    let Some((item, pre_item)) = shared_sequence(op, pre) else {
        return Some(op.clone());
    };

    let (k, i) = (pre_item.index, item.index);
    match (pre_item.access, item.access) {
        (Access::Insert, _) if i >= k => shifted(op, i + 1),
        (Access::Delete, Access::Insert) if i > k => shifted(op, i - 1),
        (Access::Delete, Access::Delete | Access::Update) if i == k => None,
        (Access::Delete, Access::Delete | Access::Update) if i > k => shifted(op, i - 1),
        _ => Some(op.clone()),
    }
}

/// Rewrite `op`, which was produced right after `pre` was applied, so it
/// addresses the document as it was before `pre`.
///
/// `None` means the answer cannot be found by index arithmetic: `op` targets
/// something `pre` created. Those cases are resolved with [`map`].
pub fn transform_backward(op: &Operation, pre: &Operation) -> Option<Operation> {
    if let Operation::InsertNode { node } = pre {
        let lifecycle = matches!(
            op,
            Operation::InsertNode { .. } | Operation::InsertIndex { .. } | Operation::DeleteIndex { .. }
        );
        if op.node_id() == &node.id && !lifecycle {
            return None;
        }
        return Some(op.clone());
    }

    let Some((item, pre_item)) = shared_sequence(op, pre) else {
        return Some(op.clone());
    };

    let (k, i) = (pre_item.index, item.index);
    match pre_item.access {
        Access::Insert if i == k => None,
        Access::Insert if i > k => shifted(op, i - 1),
        Access::Delete if i >= k => shifted(op, i + 1),
        _ => Some(op.clone()),
    }
}

/// Re-address `op` using the concrete result of the insertion it depends on.
///
/// `mapper` is the already rebased form of the batch operation that created
/// `op`'s target. Mappings exist exactly for the pairs that
/// [`transform_backward`] can report as undecidable.
pub fn map(op: &Operation, mapper: &Operation) -> Result<Operation> {
    let unmappable = || TransformError::Unmappable {
        op: Box::new(op.clone()),
        mapper: Box::new(mapper.clone()),
    };

    if mapper.is_insert_node() {
        return match op {
            Operation::InsertNode { .. }
            | Operation::InsertIndex { .. }
            | Operation::DeleteIndex { .. } => Err(unmappable()),
            _ => Ok(op.clone()),
        };
    }

    match (mapper.item(), op.item()) {
        (Some(created), Some(target))
            if created.access == Access::Insert && created.family == target.family =>
        {
            Ok(op.with_index(created.index))
        }
        _ => Err(unmappable()),
    }
}
