//! Pipeline nodes.
//!
//! A node is an id, a canvas position, a kind-specific body and the set of
//! nodes that read from it. Edges are stored on both ends: a consumer keeps
//! the source id in one of its input slots and the source keeps the consumer
//! id in `outputs`. All references are ids into the owning document, never
//! pointers.

use crate::types::{
    Aggregate, Case, ComputeOperation, DataType, FilterPredicate, InputName, JoinColumn, JoinType,
    Position, SelectColumn, SortDirection, Sorter, Value, AggregateComputation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use ulid::Ulid;

/// Unique identifier of a node within a document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Generate a fresh, globally unique id.
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The closed set of node kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Aggregate,
    Case,
    Cast,
    Compute,
    Filter,
    Join,
    LoadCsv,
    Select,
    Sort,
    Union,
}

impl NodeKind {
    pub const ALL: [NodeKind; 10] = [
        NodeKind::Aggregate,
        NodeKind::Case,
        NodeKind::Cast,
        NodeKind::Compute,
        NodeKind::Filter,
        NodeKind::Join,
        NodeKind::LoadCsv,
        NodeKind::Select,
        NodeKind::Sort,
        NodeKind::Union,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Aggregate => "aggregate",
            NodeKind::Case => "case",
            NodeKind::Cast => "cast",
            NodeKind::Compute => "compute",
            NodeKind::Filter => "filter",
            NodeKind::Join => "join",
            NodeKind::LoadCsv => "load_csv",
            NodeKind::Select => "select",
            NodeKind::Sort => "sort",
            NodeKind::Union => "union",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateNode {
    pub input: Option<NodeId>,
    pub aggregates: Vec<Aggregate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseNode {
    pub input: Option<NodeId>,
    pub name: String,
    pub data_type: DataType,
    pub cases: Vec<Case>,
    pub default: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CastNode {
    pub input: Option<NodeId>,
    pub name: String,
    pub column: String,
    pub data_type: DataType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputeNode {
    pub input: Option<NodeId>,
    pub name: String,
    pub column: String,
    pub operation: ComputeOperation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterNode {
    pub input: Option<NodeId>,
    pub column: String,
    pub predicate: FilterPredicate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinNode {
    pub left_input: Option<NodeId>,
    pub right_input: Option<NodeId>,
    pub join_type: JoinType,
    pub columns: Vec<JoinColumn>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadCsvNode {
    pub filename: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectNode {
    pub input: Option<NodeId>,
    pub columns: Vec<SelectColumn>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortNode {
    pub input: Option<NodeId>,
    pub sorters: Vec<Sorter>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnionNode {
    pub primary_input: Option<NodeId>,
    pub secondary_input: Option<NodeId>,
}

/// Kind-specific part of a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeBody {
    Aggregate(AggregateNode),
    Case(CaseNode),
    Cast(CastNode),
    Compute(ComputeNode),
    Filter(FilterNode),
    Join(JoinNode),
    LoadCsv(LoadCsvNode),
    Select(SelectNode),
    Sort(SortNode),
    Union(UnionNode),
}

impl NodeBody {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeBody::Aggregate(_) => NodeKind::Aggregate,
            NodeBody::Case(_) => NodeKind::Case,
            NodeBody::Cast(_) => NodeKind::Cast,
            NodeBody::Compute(_) => NodeKind::Compute,
            NodeBody::Filter(_) => NodeKind::Filter,
            NodeBody::Join(_) => NodeKind::Join,
            NodeBody::LoadCsv(_) => NodeKind::LoadCsv,
            NodeBody::Select(_) => NodeKind::Select,
            NodeBody::Sort(_) => NodeKind::Sort,
            NodeBody::Union(_) => NodeKind::Union,
        }
    }

    /// Default body for a freshly created node. Nodes with a sub-item family
    /// start with one blank item, matching what the editor shows.
    pub fn template(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Aggregate => NodeBody::Aggregate(AggregateNode {
                input: None,
                aggregates: vec![Aggregate {
                    column: String::new(),
                    computation: AggregateComputation::Group,
                    alias: String::new(),
                }],
            }),
            NodeKind::Case => NodeBody::Case(CaseNode {
                input: None,
                name: String::new(),
                data_type: DataType::Utf8,
                cases: vec![Case {
                    column: String::new(),
                    value: Value::default(),
                }],
                default: Value::default(),
            }),
            NodeKind::Cast => NodeBody::Cast(CastNode {
                input: None,
                name: String::new(),
                column: String::new(),
                data_type: DataType::Boolean,
            }),
            NodeKind::Compute => NodeBody::Compute(ComputeNode {
                input: None,
                name: String::new(),
                column: String::new(),
                operation: ComputeOperation::Add(Value::default()),
            }),
            NodeKind::Filter => NodeBody::Filter(FilterNode {
                input: None,
                column: String::new(),
                predicate: FilterPredicate::IsEqualTo(Value::default()),
            }),
            NodeKind::Join => NodeBody::Join(JoinNode {
                left_input: None,
                right_input: None,
                join_type: JoinType::Left,
                columns: vec![JoinColumn::default()],
            }),
            NodeKind::LoadCsv => NodeBody::LoadCsv(LoadCsvNode {
                filename: String::new(),
            }),
            NodeKind::Select => NodeBody::Select(SelectNode {
                input: None,
                columns: vec![SelectColumn::default()],
            }),
            NodeKind::Sort => NodeBody::Sort(SortNode {
                input: None,
                sorters: vec![Sorter {
                    column: String::new(),
                    direction: SortDirection::Desc,
                }],
            }),
            NodeKind::Union => NodeBody::Union(UnionNode {
                primary_input: None,
                secondary_input: None,
            }),
        }
    }
}

/// A node of the pipeline graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    #[serde(flatten)]
    pub body: NodeBody,
    #[serde(default)]
    pub outputs: BTreeSet<NodeId>,
}

impl Node {
    pub fn new(id: NodeId, position: Position, body: NodeBody) -> Self {
        Self {
            id,
            position,
            body,
            outputs: BTreeSet::new(),
        }
    }

    /// A default node of `kind`, disconnected.
    pub fn template(kind: NodeKind, id: NodeId, position: Position) -> Self {
        Self::new(id, position, NodeBody::template(kind))
    }

    pub fn kind(&self) -> NodeKind {
        self.body.kind()
    }

    /// Input slots in slot order, connected or not.
    pub fn slots(&self) -> Vec<(InputName, Option<&NodeId>)> {
        use InputName::*;

        match &self.body {
            NodeBody::Aggregate(n) => vec![(Primary, n.input.as_ref())],
            NodeBody::Case(n) => vec![(Primary, n.input.as_ref())],
            NodeBody::Cast(n) => vec![(Primary, n.input.as_ref())],
            NodeBody::Compute(n) => vec![(Primary, n.input.as_ref())],
            NodeBody::Filter(n) => vec![(Primary, n.input.as_ref())],
            NodeBody::Select(n) => vec![(Primary, n.input.as_ref())],
            NodeBody::Sort(n) => vec![(Primary, n.input.as_ref())],
            NodeBody::Join(n) => vec![
                (Primary, n.left_input.as_ref()),
                (Secondary, n.right_input.as_ref()),
            ],
            NodeBody::Union(n) => vec![
                (Primary, n.primary_input.as_ref()),
                (Secondary, n.secondary_input.as_ref()),
            ],
            NodeBody::LoadCsv(_) => vec![],
        }
    }

    /// Mutable access to one input slot, `None` if the kind has no such slot.
    pub fn slot_mut(&mut self, name: InputName) -> Option<&mut Option<NodeId>> {
        match (&mut self.body, name) {
            (NodeBody::Aggregate(n), InputName::Primary) => Some(&mut n.input),
            (NodeBody::Case(n), InputName::Primary) => Some(&mut n.input),
            (NodeBody::Cast(n), InputName::Primary) => Some(&mut n.input),
            (NodeBody::Compute(n), InputName::Primary) => Some(&mut n.input),
            (NodeBody::Filter(n), InputName::Primary) => Some(&mut n.input),
            (NodeBody::Select(n), InputName::Primary) => Some(&mut n.input),
            (NodeBody::Sort(n), InputName::Primary) => Some(&mut n.input),
            (NodeBody::Join(n), InputName::Primary) => Some(&mut n.left_input),
            (NodeBody::Join(n), InputName::Secondary) => Some(&mut n.right_input),
            (NodeBody::Union(n), InputName::Primary) => Some(&mut n.primary_input),
            (NodeBody::Union(n), InputName::Secondary) => Some(&mut n.secondary_input),
            _ => None,
        }
    }

    /// Connected sources in slot order. A source referenced through two
    /// slots appears twice.
    pub fn inputs(&self) -> impl Iterator<Item = &NodeId> {
        self.slots().into_iter().filter_map(|(_, input)| input)
    }

    /// Number of slots of this node that read from `source`.
    pub fn references(&self, source: &NodeId) -> usize {
        self.inputs().filter(|input| *input == source).count()
    }

    /// True if any input slot is set or any node reads from this one.
    pub fn is_connected(&self) -> bool {
        self.inputs().next().is_some() || !self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_start_disconnected() {
        for kind in NodeKind::ALL {
            let node = Node::template(kind, NodeId::from("n"), Position::default());
            assert_eq!(node.kind(), kind);
            assert!(!node.is_connected());
        }
    }

    #[test]
    fn test_slot_layout() {
        let mut join = Node::template(NodeKind::Join, NodeId::from("j"), Position::default());
        assert_eq!(join.slots().len(), 2);
        *join.slot_mut(InputName::Secondary).unwrap() = Some(NodeId::from("s"));
        assert_eq!(join.inputs().collect::<Vec<_>>(), vec![&NodeId::from("s")]);

        let mut load = Node::template(NodeKind::LoadCsv, NodeId::from("l"), Position::default());
        assert!(load.slots().is_empty());
        assert!(load.slot_mut(InputName::Primary).is_none());

        let mut filter = Node::template(NodeKind::Filter, NodeId::from("f"), Position::default());
        assert!(filter.slot_mut(InputName::Secondary).is_none());
    }

    #[test]
    fn test_references_count_every_slot() {
        let mut union = Node::template(NodeKind::Union, NodeId::from("u"), Position::default());
        let source = NodeId::from("s");
        *union.slot_mut(InputName::Primary).unwrap() = Some(source.clone());
        *union.slot_mut(InputName::Secondary).unwrap() = Some(source.clone());
        assert_eq!(union.references(&source), 2);
    }

    #[test]
    fn test_node_json_shape() {
        let node = Node::template(NodeKind::Cast, NodeId::from("c"), Position::new(1.0, 2.0));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "cast");
        assert_eq!(json["id"], "c");
        assert_eq!(json["data_type"], "Boolean");

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
