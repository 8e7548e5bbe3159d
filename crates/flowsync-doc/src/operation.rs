//! The operation log vocabulary.
//!
//! Every edit to a document is one of these variants. Each variant carries
//! enough payload to be applied on its own and to build its exact inverse.
//! Variants that address a sub-item (or a slot in the top-level index) expose
//! that address through [`Operation::item`], which is all the transform
//! engine needs to know about them.

use crate::node::{Node, NodeId};
use crate::types::{
    Aggregate, AggregateComputation, Case, ComputeOperation, DataType, FilterPredicate, InputName,
    JoinColumn, JoinType, Position, SelectColumn, SortDirection, Sorter, Value,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    // Document lifecycle
    InsertNode {
        node: Node,
    },
    DeleteNode {
        id: NodeId,
    },
    InsertIndex {
        id: NodeId,
        index: usize,
    },
    DeleteIndex {
        id: NodeId,
        index: usize,
    },

    // Common to every kind
    SetInput {
        id: NodeId,
        name: InputName,
        input: Option<NodeId>,
    },
    SetPosition {
        id: NodeId,
        position: Position,
    },

    // Aggregate
    InsertAggregate {
        id: NodeId,
        index: usize,
        aggregate: Aggregate,
    },
    DeleteAggregate {
        id: NodeId,
        index: usize,
    },
    SetAggregateComputation {
        id: NodeId,
        index: usize,
        computation: AggregateComputation,
    },
    SetAggregateColumn {
        id: NodeId,
        index: usize,
        column: String,
    },
    SetAggregateAlias {
        id: NodeId,
        index: usize,
        alias: String,
    },

    // Case
    SetCaseName {
        id: NodeId,
        name: String,
    },
    SetCaseDataType {
        id: NodeId,
        data_type: DataType,
    },
    InsertCase {
        id: NodeId,
        index: usize,
        #[serde(rename = "case")]
        branch: Case,
    },
    DeleteCase {
        id: NodeId,
        index: usize,
    },
    SetCaseColumn {
        id: NodeId,
        index: usize,
        column: String,
    },
    SetCaseValue {
        id: NodeId,
        index: usize,
        value: Value,
    },
    SetCaseDefault {
        id: NodeId,
        default: Value,
    },

    // Cast
    SetCastName {
        id: NodeId,
        name: String,
    },
    SetCastColumn {
        id: NodeId,
        column: String,
    },
    SetCastDataType {
        id: NodeId,
        data_type: DataType,
    },

    // Compute
    SetComputeName {
        id: NodeId,
        name: String,
    },
    SetComputeColumn {
        id: NodeId,
        column: String,
    },
    SetComputeOperation {
        id: NodeId,
        operation: ComputeOperation,
    },

    // Filter
    SetFilterColumn {
        id: NodeId,
        column: String,
    },
    SetFilterPredicate {
        id: NodeId,
        predicate: FilterPredicate,
    },

    // Load CSV
    SetLoadCsvFilename {
        id: NodeId,
        filename: String,
    },

    // Join
    SetJoinType {
        id: NodeId,
        join_type: JoinType,
    },
    InsertJoinColumn {
        id: NodeId,
        index: usize,
        join_column: JoinColumn,
    },
    DeleteJoinColumn {
        id: NodeId,
        index: usize,
    },
    SetJoinColumnLeft {
        id: NodeId,
        index: usize,
        column: String,
    },
    SetJoinColumnRight {
        id: NodeId,
        index: usize,
        column: String,
    },

    // Select
    InsertSelect {
        id: NodeId,
        index: usize,
        column: SelectColumn,
    },
    DeleteSelect {
        id: NodeId,
        index: usize,
    },
    SetSelectColumn {
        id: NodeId,
        index: usize,
        column: String,
    },
    SetSelectAlias {
        id: NodeId,
        index: usize,
        alias: String,
    },

    // Sort
    InsertSorter {
        id: NodeId,
        index: usize,
        sorter: Sorter,
    },
    DeleteSorter {
        id: NodeId,
        index: usize,
    },
    SetSortColumn {
        id: NodeId,
        index: usize,
        column: String,
    },
    SetSortDirection {
        id: NodeId,
        index: usize,
        direction: SortDirection,
    },
}

/// An ordered, index-addressed collection an operation can point into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    /// The document's top-level stacking order.
    Index,
    Aggregates,
    Cases,
    JoinColumns,
    SelectColumns,
    Sorters,
}

/// How an operation touches the item it addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Insert,
    Delete,
    Update,
}

/// Position of an operation inside a [`Family`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemRef {
    pub family: Family,
    pub index: usize,
    pub access: Access,
}

impl ItemRef {
    fn new(family: Family, index: usize, access: Access) -> Self {
        Self {
            family,
            index,
            access,
        }
    }
}

impl Operation {
    /// Wire name of the operation, as found in the `"type"` tag.
    pub fn name(&self) -> &'static str {
        use Operation::*;

        match self {
            InsertNode { .. } => "insert_node",
            DeleteNode { .. } => "delete_node",
            InsertIndex { .. } => "insert_index",
            DeleteIndex { .. } => "delete_index",
            SetInput { .. } => "set_input",
            SetPosition { .. } => "set_position",
            InsertAggregate { .. } => "insert_aggregate",
            DeleteAggregate { .. } => "delete_aggregate",
            SetAggregateComputation { .. } => "set_aggregate_computation",
            SetAggregateColumn { .. } => "set_aggregate_column",
            SetAggregateAlias { .. } => "set_aggregate_alias",
            SetCaseName { .. } => "set_case_name",
            SetCaseDataType { .. } => "set_case_data_type",
            InsertCase { .. } => "insert_case",
            DeleteCase { .. } => "delete_case",
            SetCaseColumn { .. } => "set_case_column",
            SetCaseValue { .. } => "set_case_value",
            SetCaseDefault { .. } => "set_case_default",
            SetCastName { .. } => "set_cast_name",
            SetCastColumn { .. } => "set_cast_column",
            SetCastDataType { .. } => "set_cast_data_type",
            SetComputeName { .. } => "set_compute_name",
            SetComputeColumn { .. } => "set_compute_column",
            SetComputeOperation { .. } => "set_compute_operation",
            SetFilterColumn { .. } => "set_filter_column",
            SetFilterPredicate { .. } => "set_filter_predicate",
            SetLoadCsvFilename { .. } => "set_load_csv_filename",
            SetJoinType { .. } => "set_join_type",
            InsertJoinColumn { .. } => "insert_join_column",
            DeleteJoinColumn { .. } => "delete_join_column",
            SetJoinColumnLeft { .. } => "set_join_column_left",
            SetJoinColumnRight { .. } => "set_join_column_right",
            InsertSelect { .. } => "insert_select",
            DeleteSelect { .. } => "delete_select",
            SetSelectColumn { .. } => "set_select_column",
            SetSelectAlias { .. } => "set_select_alias",
            InsertSorter { .. } => "insert_sorter",
            DeleteSorter { .. } => "delete_sorter",
            SetSortColumn { .. } => "set_sort_column",
            SetSortDirection { .. } => "set_sort_direction",
        }
    }

    /// Id of the node the operation targets.
    pub fn node_id(&self) -> &NodeId {
        use Operation::*;

        match self {
            InsertNode { node } => &node.id,
            DeleteNode { id }
            | InsertIndex { id, .. }
            | DeleteIndex { id, .. }
            | SetInput { id, .. }
            | SetPosition { id, .. }
            | InsertAggregate { id, .. }
            | DeleteAggregate { id, .. }
            | SetAggregateComputation { id, .. }
            | SetAggregateColumn { id, .. }
            | SetAggregateAlias { id, .. }
            | SetCaseName { id, .. }
            | SetCaseDataType { id, .. }
            | InsertCase { id, .. }
            | DeleteCase { id, .. }
            | SetCaseColumn { id, .. }
            | SetCaseValue { id, .. }
            | SetCaseDefault { id, .. }
            | SetCastName { id, .. }
            | SetCastColumn { id, .. }
            | SetCastDataType { id, .. }
            | SetComputeName { id, .. }
            | SetComputeColumn { id, .. }
            | SetComputeOperation { id, .. }
            | SetFilterColumn { id, .. }
            | SetFilterPredicate { id, .. }
            | SetLoadCsvFilename { id, .. }
            | SetJoinType { id, .. }
            | InsertJoinColumn { id, .. }
            | DeleteJoinColumn { id, .. }
            | SetJoinColumnLeft { id, .. }
            | SetJoinColumnRight { id, .. }
            | InsertSelect { id, .. }
            | DeleteSelect { id, .. }
            | SetSelectColumn { id, .. }
            | SetSelectAlias { id, .. }
            | InsertSorter { id, .. }
            | DeleteSorter { id, .. }
            | SetSortColumn { id, .. }
            | SetSortDirection { id, .. } => id,
        }
    }

    /// The indexed position this operation addresses, if any.
    pub fn item(&self) -> Option<ItemRef> {
        use Access::*;
        use Family::*;
        use Operation as Op;

        let item = match self {
            Op::InsertIndex { index, .. } => ItemRef::new(Index, *index, Insert),
            Op::DeleteIndex { index, .. } => ItemRef::new(Index, *index, Delete),

            Op::InsertAggregate { index, .. } => ItemRef::new(Aggregates, *index, Insert),
            Op::DeleteAggregate { index, .. } => ItemRef::new(Aggregates, *index, Delete),
            Op::SetAggregateComputation { index, .. }
            | Op::SetAggregateColumn { index, .. }
            | Op::SetAggregateAlias { index, .. } => ItemRef::new(Aggregates, *index, Update),

            Op::InsertCase { index, .. } => ItemRef::new(Cases, *index, Insert),
            Op::DeleteCase { index, .. } => ItemRef::new(Cases, *index, Delete),
            Op::SetCaseColumn { index, .. } | Op::SetCaseValue { index, .. } => {
                ItemRef::new(Cases, *index, Update)
            }

            Op::InsertJoinColumn { index, .. } => ItemRef::new(JoinColumns, *index, Insert),
            Op::DeleteJoinColumn { index, .. } => ItemRef::new(JoinColumns, *index, Delete),
            Op::SetJoinColumnLeft { index, .. } | Op::SetJoinColumnRight { index, .. } => {
                ItemRef::new(JoinColumns, *index, Update)
            }

            Op::InsertSelect { index, .. } => ItemRef::new(SelectColumns, *index, Insert),
            Op::DeleteSelect { index, .. } => ItemRef::new(SelectColumns, *index, Delete),
            Op::SetSelectColumn { index, .. } | Op::SetSelectAlias { index, .. } => {
                ItemRef::new(SelectColumns, *index, Update)
            }

            Op::InsertSorter { index, .. } => ItemRef::new(Sorters, *index, Insert),
            Op::DeleteSorter { index, .. } => ItemRef::new(Sorters, *index, Delete),
            Op::SetSortColumn { index, .. } | Op::SetSortDirection { index, .. } => {
                ItemRef::new(Sorters, *index, Update)
            }

            Op::InsertNode { .. }
            | Op::DeleteNode { .. }
            | Op::SetInput { .. }
            | Op::SetPosition { .. }
            | Op::SetCaseName { .. }
            | Op::SetCaseDataType { .. }
            | Op::SetCaseDefault { .. }
            | Op::SetCastName { .. }
            | Op::SetCastColumn { .. }
            | Op::SetCastDataType { .. }
            | Op::SetComputeName { .. }
            | Op::SetComputeColumn { .. }
            | Op::SetComputeOperation { .. }
            | Op::SetFilterColumn { .. }
            | Op::SetFilterPredicate { .. }
            | Op::SetLoadCsvFilename { .. }
            | Op::SetJoinType { .. } => return None,
        };

        Some(item)
    }

    /// Mutable access to the addressed index, `None` for unindexed operations.
    pub fn index_mut(&mut self) -> Option<&mut usize> {
        use Operation::*;

        match self {
            InsertIndex { index, .. }
            | DeleteIndex { index, .. }
            | InsertAggregate { index, .. }
            | DeleteAggregate { index, .. }
            | SetAggregateComputation { index, .. }
            | SetAggregateColumn { index, .. }
            | SetAggregateAlias { index, .. }
            | InsertCase { index, .. }
            | DeleteCase { index, .. }
            | SetCaseColumn { index, .. }
            | SetCaseValue { index, .. }
            | InsertJoinColumn { index, .. }
            | DeleteJoinColumn { index, .. }
            | SetJoinColumnLeft { index, .. }
            | SetJoinColumnRight { index, .. }
            | InsertSelect { index, .. }
            | DeleteSelect { index, .. }
            | SetSelectColumn { index, .. }
            | SetSelectAlias { index, .. }
            | InsertSorter { index, .. }
            | DeleteSorter { index, .. }
            | SetSortColumn { index, .. }
            | SetSortDirection { index, .. } => Some(index),

            InsertNode { .. }
            | DeleteNode { .. }
            | SetInput { .. }
            | SetPosition { .. }
            | SetCaseName { .. }
            | SetCaseDataType { .. }
            | SetCaseDefault { .. }
            | SetCastName { .. }
            | SetCastColumn { .. }
            | SetCastDataType { .. }
            | SetComputeName { .. }
            | SetComputeColumn { .. }
            | SetComputeOperation { .. }
            | SetFilterColumn { .. }
            | SetFilterPredicate { .. }
            | SetLoadCsvFilename { .. }
            | SetJoinType { .. } => None,
        }
    }

    /// Copy of this operation re-addressed at `index`. Unindexed operations
    /// are returned unchanged.
    pub fn with_index(&self, index: usize) -> Operation {
        let mut op = self.clone();
        if let Some(slot) = op.index_mut() {
            *slot = index;
        }
        op
    }

    pub fn is_insert_node(&self) -> bool {
        matches!(self, Operation::InsertNode { .. })
    }
}
