//! Documents and the operation executor.
//!
//! A [`Document`] is an immutable value. [`Document::apply`] returns a new
//! document together with the exact inverse of the applied operation; the
//! receiver is never touched. Nodes are shared through `Arc`, so applying an
//! operation clones the node map (cheap) and only the nodes it edits.

use crate::cycle;
use crate::error::{DocError, Result};
use crate::node::{Node, NodeBody, NodeId, NodeKind};
use crate::operation::Operation;
use crate::types::{InputName, Position};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::Arc;
use tracing::debug;

/// A pipeline graph.
///
/// `index` holds every key of `nodes` exactly once and doubles as the paint
/// order (last is topmost).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub nodes: BTreeMap<NodeId, Arc<Node>>,
    pub index: Vec<NodeId>,
}

/// Why an operation was skipped without touching the document.
///
/// Rejections are expected when concurrent edits race and are never errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// `set_input` names a source that does not exist.
    MissingSource { id: NodeId, input: NodeId },
    /// `set_input` would close a loop; `path` runs from the target to the
    /// proposed source in data-flow order.
    WouldCycle { path: Vec<NodeId> },
}

/// Result of applying one operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Applied { doc: Document, undo: Operation },
    Rejected(Rejection),
}

/// Result of applying a sequence of operations.
///
/// `undo[i]` is the inverse of `applied[i]`; to unwind, apply `undo` in
/// reverse order.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchOutcome {
    pub doc: Document,
    pub applied: Vec<Operation>,
    pub undo: Vec<Operation>,
}

/// Resolve the kind-specific body of a node, or fail with a kind mismatch.
macro_rules! body_mut {
    ($doc:expr, $op:expr, $id:expr, $kind:ident) => {{
        let node = $doc.node_mut($op, $id)?;
        let found = node.kind();
        match &mut node.body {
            NodeBody::$kind(body) => body,
            _ => {
                return Err(DocError::KindMismatch {
                    op: $op,
                    id: $id.clone(),
                    expected: NodeKind::$kind,
                    found,
                })
            }
        }
    }};
}

fn insert_at<T>(op: &'static str, id: &NodeId, items: &mut Vec<T>, index: usize, item: T) -> Result<()> {
    if index > items.len() {
        return Err(DocError::IndexOutOfBounds {
            op,
            id: id.clone(),
            index,
            length: items.len(),
        });
    }
    items.insert(index, item);
    Ok(())
}

fn remove_at<T>(op: &'static str, id: &NodeId, items: &mut Vec<T>, index: usize) -> Result<T> {
    if index >= items.len() {
        return Err(DocError::IndexOutOfBounds {
            op,
            id: id.clone(),
            index,
            length: items.len(),
        });
    }
    Ok(items.remove(index))
}

fn item_mut<'a, T>(op: &'static str, id: &NodeId, items: &'a mut [T], index: usize) -> Result<&'a mut T> {
    let length = items.len();
    items.get_mut(index).ok_or_else(|| DocError::IndexOutOfBounds {
        op,
        id: id.clone(),
        index,
        length,
    })
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Position of `id` in the paint order.
    pub fn index_of(&self, id: &NodeId) -> Option<usize> {
        self.index.iter().position(|entry| entry == id)
    }

    fn node_mut(&mut self, op: &'static str, id: &NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .map(Arc::make_mut)
            .ok_or_else(|| DocError::NodeNotFound { op, id: id.clone() })
    }

    /// Apply one operation.
    ///
    /// Hard errors leave no trace; the caller still holds `self` unchanged.
    pub fn apply(&self, op: &Operation) -> Result<Outcome> {
        let mut doc = self.clone();
        match doc.execute(op)? {
            Ok(undo) => Ok(Outcome::Applied { doc, undo }),
            Err(rejection) => {
                debug!(op = op.name(), id = %op.node_id(), ?rejection, "operation rejected");
                Ok(Outcome::Rejected(rejection))
            }
        }
    }

    /// Apply operations in order. Rejected operations are dropped from both
    /// `applied` and `undo`; a hard error aborts the whole batch.
    pub fn apply_batch(&self, ops: &[Operation]) -> Result<BatchOutcome> {
        let mut doc = self.clone();
        let mut applied = Vec::with_capacity(ops.len());
        let mut undo = Vec::with_capacity(ops.len());

        for op in ops {
            match doc.execute(op)? {
                Ok(inverse) => {
                    applied.push(op.clone());
                    undo.push(inverse);
                }
                Err(rejection) => {
                    debug!(op = op.name(), id = %op.node_id(), ?rejection, "operation rejected");
                }
            }
        }

        Ok(BatchOutcome { doc, applied, undo })
    }

    /// Mutate in place and return the inverse. Only called on a private
    /// copy, so a hard error halfway through is discarded with the copy.
    fn execute(&mut self, op: &Operation) -> Result<std::result::Result<Operation, Rejection>> {
        use Operation::*;

        let name = op.name();
        let undo = match op {
            InsertNode { node } => {
                if self.nodes.contains_key(&node.id) {
                    return Err(DocError::NodeExists {
                        op: name,
                        id: node.id.clone(),
                    });
                }
                if node.is_connected() {
                    return Err(DocError::NodeConnected {
                        op: name,
                        id: node.id.clone(),
                    });
                }
                self.nodes.insert(node.id.clone(), Arc::new(node.clone()));
                DeleteNode { id: node.id.clone() }
            }

            DeleteNode { id } => {
                let node = self
                    .nodes
                    .get(id)
                    .ok_or_else(|| DocError::NodeNotFound { op: name, id: id.clone() })?;
                if node.is_connected() {
                    return Err(DocError::NodeConnected { op: name, id: id.clone() });
                }
                if self.index.contains(id) {
                    return Err(DocError::StillIndexed(id.clone()));
                }
                let node = self
                    .nodes
                    .remove(id)
                    .ok_or_else(|| DocError::NodeNotFound { op: name, id: id.clone() })?;
                InsertNode {
                    node: Arc::unwrap_or_clone(node),
                }
            }

            InsertIndex { id, index } => {
                if !self.nodes.contains_key(id) {
                    return Err(DocError::NodeNotFound { op: name, id: id.clone() });
                }
                if self.index.contains(id) {
                    return Err(DocError::AlreadyIndexed(id.clone()));
                }
                insert_at(name, id, &mut self.index, *index, id.clone())?;
                DeleteIndex {
                    id: id.clone(),
                    index: *index,
                }
            }

            DeleteIndex { id, index } => {
                let found = remove_at(name, id, &mut self.index, *index)?;
                if &found != id {
                    return Err(DocError::IndexIdMismatch {
                        index: *index,
                        expected: id.clone(),
                        found,
                    });
                }
                InsertIndex {
                    id: id.clone(),
                    index: *index,
                }
            }

            SetInput {
                id,
                name: slot,
                input,
            } => match self.set_input(id, *slot, input.as_ref())? {
                Ok(previous) => SetInput {
                    id: id.clone(),
                    name: *slot,
                    input: previous,
                },
                Err(rejection) => return Ok(Err(rejection)),
            },

            SetPosition { id, position } => {
                let node = self.node_mut(name, id)?;
                SetPosition {
                    id: id.clone(),
                    position: mem::replace(&mut node.position, *position),
                }
            }

            InsertAggregate { id, index, aggregate } => {
                let body = body_mut!(self, name, id, Aggregate);
                insert_at(name, id, &mut body.aggregates, *index, aggregate.clone())?;
                DeleteAggregate {
                    id: id.clone(),
                    index: *index,
                }
            }
            DeleteAggregate { id, index } => {
                let body = body_mut!(self, name, id, Aggregate);
                InsertAggregate {
                    id: id.clone(),
                    index: *index,
                    aggregate: remove_at(name, id, &mut body.aggregates, *index)?,
                }
            }
            SetAggregateComputation {
                id,
                index,
                computation,
            } => {
                let body = body_mut!(self, name, id, Aggregate);
                let item = item_mut(name, id, &mut body.aggregates, *index)?;
                SetAggregateComputation {
                    id: id.clone(),
                    index: *index,
                    computation: mem::replace(&mut item.computation, *computation),
                }
            }
            SetAggregateColumn { id, index, column } => {
                let body = body_mut!(self, name, id, Aggregate);
                let item = item_mut(name, id, &mut body.aggregates, *index)?;
                SetAggregateColumn {
                    id: id.clone(),
                    index: *index,
                    column: mem::replace(&mut item.column, column.clone()),
                }
            }
            SetAggregateAlias { id, index, alias } => {
                let body = body_mut!(self, name, id, Aggregate);
                let item = item_mut(name, id, &mut body.aggregates, *index)?;
                SetAggregateAlias {
                    id: id.clone(),
                    index: *index,
                    alias: mem::replace(&mut item.alias, alias.clone()),
                }
            }

            SetCaseName { id, name: value } => {
                let body = body_mut!(self, name, id, Case);
                SetCaseName {
                    id: id.clone(),
                    name: mem::replace(&mut body.name, value.clone()),
                }
            }
            SetCaseDataType { id, data_type } => {
                let body = body_mut!(self, name, id, Case);
                SetCaseDataType {
                    id: id.clone(),
                    data_type: mem::replace(&mut body.data_type, *data_type),
                }
            }
            InsertCase { id, index, branch } => {
                let body = body_mut!(self, name, id, Case);
                insert_at(name, id, &mut body.cases, *index, branch.clone())?;
                DeleteCase {
                    id: id.clone(),
                    index: *index,
                }
            }
            DeleteCase { id, index } => {
                let body = body_mut!(self, name, id, Case);
                InsertCase {
                    id: id.clone(),
                    index: *index,
                    branch: remove_at(name, id, &mut body.cases, *index)?,
                }
            }
            SetCaseColumn { id, index, column } => {
                let body = body_mut!(self, name, id, Case);
                let item = item_mut(name, id, &mut body.cases, *index)?;
                SetCaseColumn {
                    id: id.clone(),
                    index: *index,
                    column: mem::replace(&mut item.column, column.clone()),
                }
            }
            SetCaseValue { id, index, value } => {
                let body = body_mut!(self, name, id, Case);
                let item = item_mut(name, id, &mut body.cases, *index)?;
                SetCaseValue {
                    id: id.clone(),
                    index: *index,
                    value: mem::replace(&mut item.value, value.clone()),
                }
            }
            SetCaseDefault { id, default } => {
                let body = body_mut!(self, name, id, Case);
                SetCaseDefault {
                    id: id.clone(),
                    default: mem::replace(&mut body.default, default.clone()),
                }
            }

            SetCastName { id, name: value } => {
                let body = body_mut!(self, name, id, Cast);
                SetCastName {
                    id: id.clone(),
                    name: mem::replace(&mut body.name, value.clone()),
                }
            }
            SetCastColumn { id, column } => {
                let body = body_mut!(self, name, id, Cast);
                SetCastColumn {
                    id: id.clone(),
                    column: mem::replace(&mut body.column, column.clone()),
                }
            }
            SetCastDataType { id, data_type } => {
                let body = body_mut!(self, name, id, Cast);
                SetCastDataType {
                    id: id.clone(),
                    data_type: mem::replace(&mut body.data_type, *data_type),
                }
            }

            SetComputeName { id, name: value } => {
                let body = body_mut!(self, name, id, Compute);
                SetComputeName {
                    id: id.clone(),
                    name: mem::replace(&mut body.name, value.clone()),
                }
            }
            SetComputeColumn { id, column } => {
                let body = body_mut!(self, name, id, Compute);
                SetComputeColumn {
                    id: id.clone(),
                    column: mem::replace(&mut body.column, column.clone()),
                }
            }
            SetComputeOperation { id, operation } => {
                let body = body_mut!(self, name, id, Compute);
                SetComputeOperation {
                    id: id.clone(),
                    operation: mem::replace(&mut body.operation, operation.clone()),
                }
            }

            SetFilterColumn { id, column } => {
                let body = body_mut!(self, name, id, Filter);
                SetFilterColumn {
                    id: id.clone(),
                    column: mem::replace(&mut body.column, column.clone()),
                }
            }
            SetFilterPredicate { id, predicate } => {
                let body = body_mut!(self, name, id, Filter);
                SetFilterPredicate {
                    id: id.clone(),
                    predicate: mem::replace(&mut body.predicate, predicate.clone()),
                }
            }

            SetLoadCsvFilename { id, filename } => {
                let body = body_mut!(self, name, id, LoadCsv);
                SetLoadCsvFilename {
                    id: id.clone(),
                    filename: mem::replace(&mut body.filename, filename.clone()),
                }
            }

            SetJoinType { id, join_type } => {
                let body = body_mut!(self, name, id, Join);
                SetJoinType {
                    id: id.clone(),
                    join_type: mem::replace(&mut body.join_type, *join_type),
                }
            }
            InsertJoinColumn {
                id,
                index,
                join_column,
            } => {
                let body = body_mut!(self, name, id, Join);
                insert_at(name, id, &mut body.columns, *index, join_column.clone())?;
                DeleteJoinColumn {
                    id: id.clone(),
                    index: *index,
                }
            }
            DeleteJoinColumn { id, index } => {
                let body = body_mut!(self, name, id, Join);
                InsertJoinColumn {
                    id: id.clone(),
                    index: *index,
                    join_column: remove_at(name, id, &mut body.columns, *index)?,
                }
            }
            SetJoinColumnLeft { id, index, column } => {
                let body = body_mut!(self, name, id, Join);
                let item = item_mut(name, id, &mut body.columns, *index)?;
                SetJoinColumnLeft {
                    id: id.clone(),
                    index: *index,
                    column: mem::replace(&mut item.left, column.clone()),
                }
            }
            SetJoinColumnRight { id, index, column } => {
                let body = body_mut!(self, name, id, Join);
                let item = item_mut(name, id, &mut body.columns, *index)?;
                SetJoinColumnRight {
                    id: id.clone(),
                    index: *index,
                    column: mem::replace(&mut item.right, column.clone()),
                }
            }

            InsertSelect { id, index, column } => {
                let body = body_mut!(self, name, id, Select);
                insert_at(name, id, &mut body.columns, *index, column.clone())?;
                DeleteSelect {
                    id: id.clone(),
                    index: *index,
                }
            }
            DeleteSelect { id, index } => {
                let body = body_mut!(self, name, id, Select);
                InsertSelect {
                    id: id.clone(),
                    index: *index,
                    column: remove_at(name, id, &mut body.columns, *index)?,
                }
            }
            SetSelectColumn { id, index, column } => {
                let body = body_mut!(self, name, id, Select);
                let item = item_mut(name, id, &mut body.columns, *index)?;
                SetSelectColumn {
                    id: id.clone(),
                    index: *index,
                    column: mem::replace(&mut item.column, column.clone()),
                }
            }
            SetSelectAlias { id, index, alias } => {
                let body = body_mut!(self, name, id, Select);
                let item = item_mut(name, id, &mut body.columns, *index)?;
                SetSelectAlias {
                    id: id.clone(),
                    index: *index,
                    alias: mem::replace(&mut item.alias, alias.clone()),
                }
            }

            InsertSorter { id, index, sorter } => {
                let body = body_mut!(self, name, id, Sort);
                insert_at(name, id, &mut body.sorters, *index, sorter.clone())?;
                DeleteSorter {
                    id: id.clone(),
                    index: *index,
                }
            }
            DeleteSorter { id, index } => {
                let body = body_mut!(self, name, id, Sort);
                InsertSorter {
                    id: id.clone(),
                    index: *index,
                    sorter: remove_at(name, id, &mut body.sorters, *index)?,
                }
            }
            SetSortColumn { id, index, column } => {
                let body = body_mut!(self, name, id, Sort);
                let item = item_mut(name, id, &mut body.sorters, *index)?;
                SetSortColumn {
                    id: id.clone(),
                    index: *index,
                    column: mem::replace(&mut item.column, column.clone()),
                }
            }
            SetSortDirection {
                id,
                index,
                direction,
            } => {
                let body = body_mut!(self, name, id, Sort);
                let item = item_mut(name, id, &mut body.sorters, *index)?;
                SetSortDirection {
                    id: id.clone(),
                    index: *index,
                    direction: mem::replace(&mut item.direction, *direction),
                }
            }
        };

        Ok(Ok(undo))
    }

    /// Point `slot` of `id` at `input` and keep both edge ends consistent.
    /// Returns the previous slot value.
    fn set_input(
        &mut self,
        id: &NodeId,
        slot: InputName,
        input: Option<&NodeId>,
    ) -> Result<std::result::Result<Option<NodeId>, Rejection>> {
        const OP: &str = "set_input";

        if !self.nodes.contains_key(id) {
            return Err(DocError::NodeNotFound { op: OP, id: id.clone() });
        }

        if let Some(source) = input {
            if !self.nodes.contains_key(source) {
                return Ok(Err(Rejection::MissingSource {
                    id: id.clone(),
                    input: source.clone(),
                }));
            }
            if let Some(path) = cycle::find_cycle(self, source, id)? {
                return Ok(Err(Rejection::WouldCycle { path }));
            }
        }

        let node = self.node_mut(OP, id)?;
        let cell = node.slot_mut(slot).ok_or_else(|| DocError::NoSuchInput {
            op: OP,
            id: id.clone(),
            name: slot,
        })?;
        let previous = mem::replace(cell, input.cloned());
        if previous.as_ref() == input {
            return Ok(Ok(previous));
        }

        // Another slot of the same node may still read from the old source.
        let still_referenced = previous
            .as_ref()
            .map(|old| node.references(old) > 0)
            .unwrap_or(true);

        if let Some(old) = previous.as_ref().filter(|_| !still_referenced) {
            let source = self.nodes.get_mut(old).map(Arc::make_mut).ok_or_else(|| {
                DocError::DanglingInput {
                    node: id.clone(),
                    input: old.clone(),
                }
            })?;
            source.outputs.remove(id);
        }

        if let Some(new) = input {
            let source = self.node_mut(OP, new)?;
            source.outputs.insert(id.clone());
        }

        Ok(Ok(previous))
    }

    /// `set_input` operations that detach `id` from every neighbour, in the
    /// order inputs first, then consumers.
    pub fn disconnect_ops(&self, id: &NodeId) -> Result<Vec<Operation>> {
        let node = self.node(id).ok_or_else(|| DocError::NodeNotFound {
            op: "disconnect",
            id: id.clone(),
        })?;

        let mut ops = Vec::new();
        for (slot, input) in node.slots() {
            if input.is_some() {
                ops.push(Operation::SetInput {
                    id: id.clone(),
                    name: slot,
                    input: None,
                });
            }
        }

        for consumer in &node.outputs {
            let reader = self.node(consumer).ok_or_else(|| DocError::DanglingInput {
                node: consumer.clone(),
                input: id.clone(),
            })?;
            for (slot, input) in reader.slots() {
                if input == Some(id) {
                    ops.push(Operation::SetInput {
                        id: consumer.clone(),
                        name: slot,
                        input: None,
                    });
                }
            }
        }

        Ok(ops)
    }

    /// Canonical sequence that removes a node: disconnect it, drop it from
    /// the paint order, then delete it.
    pub fn remove_node_ops(&self, id: &NodeId) -> Result<Vec<Operation>> {
        let mut ops = self.disconnect_ops(id)?;
        if let Some(index) = self.index_of(id) {
            ops.push(Operation::DeleteIndex {
                id: id.clone(),
                index,
            });
        }
        ops.push(Operation::DeleteNode { id: id.clone() });
        Ok(ops)
    }

    /// Canonical sequence that adds a disconnected node on top of the paint
    /// order.
    pub fn add_node_ops(&self, node: Node) -> Vec<Operation> {
        let id = node.id.clone();
        vec![
            Operation::InsertNode { node },
            Operation::InsertIndex {
                id,
                index: self.index.len(),
            },
        ]
    }

    /// Convenience for [`Document::add_node_ops`] with a fresh id.
    pub fn create_node_ops(&self, kind: NodeKind, position: Position) -> Vec<Operation> {
        self.add_node_ops(Node::template(kind, NodeId::new(), position))
    }

    /// Move a node to the top of the paint order. Empty when it already is.
    pub fn raise_ops(&self, id: &NodeId) -> Result<Vec<Operation>> {
        let index = self.index_of(id).ok_or_else(|| DocError::NodeNotFound {
            op: "raise",
            id: id.clone(),
        })?;
        let top = self.index.len() - 1;
        if index == top {
            return Ok(Vec::new());
        }
        Ok(vec![
            Operation::DeleteIndex {
                id: id.clone(),
                index,
            },
            Operation::InsertIndex {
                id: id.clone(),
                index: top,
            },
        ])
    }

    /// Check every structural invariant: index is a permutation of the node
    /// set, edges are recorded on both ends, and the graph is acyclic.
    pub fn validate(&self) -> Result<()> {
        let indexed: BTreeSet<&NodeId> = self.index.iter().collect();
        if indexed.len() != self.index.len() {
            return Err(DocError::InvariantViolation("index has duplicates".into()));
        }
        if indexed.len() != self.nodes.len() || indexed.iter().any(|id| !self.nodes.contains_key(*id)) {
            return Err(DocError::InvariantViolation(
                "index does not match the node set".into(),
            ));
        }

        for (id, node) in &self.nodes {
            for input in node.inputs() {
                let source = self.nodes.get(input).ok_or_else(|| DocError::DanglingInput {
                    node: id.clone(),
                    input: input.clone(),
                })?;
                if !source.outputs.contains(id) {
                    return Err(DocError::InvariantViolation(format!(
                        "{input} does not list {id} as an output"
                    )));
                }
            }
            for consumer in &node.outputs {
                let reader = self.nodes.get(consumer).ok_or_else(|| {
                    DocError::InvariantViolation(format!("{id} lists missing output {consumer}"))
                })?;
                if reader.references(id) == 0 {
                    return Err(DocError::InvariantViolation(format!(
                        "{consumer} is listed as an output of {id} but does not read from it"
                    )));
                }
            }
        }

        cycle::check_acyclic(self)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
