//! A small starter pipeline: load a CSV, aggregate by industry, sort.

use crate::document::Document;
use crate::error::Result;
use crate::node::{AggregateNode, LoadCsvNode, Node, NodeBody, NodeId, SortNode};
use crate::operation::Operation;
use crate::types::{Aggregate, AggregateComputation, InputName, Position, SortDirection, Sorter};

const SPACING: f64 = 256.0 + 64.0;

/// Operations that build the starter pipeline on an empty document.
pub fn demo_ops() -> Vec<Operation> {
    let load = NodeId::from("demo_1");
    let aggregate = NodeId::from("demo_2");
    let sort = NodeId::from("demo_3");

    let nodes = [
        Node::new(
            load.clone(),
            Position::new(0.0, 0.0),
            NodeBody::LoadCsv(LoadCsvNode {
                filename: "Forbes 2000.csv".into(),
            }),
        ),
        Node::new(
            aggregate.clone(),
            Position::new(SPACING, 0.0),
            NodeBody::Aggregate(AggregateNode {
                input: None,
                aggregates: vec![
                    Aggregate {
                        column: "Industry".into(),
                        computation: AggregateComputation::Group,
                        alias: String::new(),
                    },
                    Aggregate {
                        column: "Market Value (Billions)".into(),
                        computation: AggregateComputation::Sum,
                        alias: String::new(),
                    },
                ],
            }),
        ),
        Node::new(
            sort.clone(),
            Position::new(2.0 * SPACING, 0.0),
            NodeBody::Sort(SortNode {
                input: None,
                sorters: vec![Sorter {
                    column: "Market Value (Billions)".into(),
                    direction: SortDirection::Desc,
                }],
            }),
        ),
    ];

    let mut ops = Vec::new();
    for (index, node) in nodes.into_iter().enumerate() {
        let id = node.id.clone();
        ops.push(Operation::InsertNode { node });
        ops.push(Operation::InsertIndex { id, index });
    }
    ops.push(Operation::SetInput {
        id: aggregate.clone(),
        name: InputName::Primary,
        input: Some(load),
    });
    ops.push(Operation::SetInput {
        id: sort,
        name: InputName::Primary,
        input: Some(aggregate),
    });
    ops
}

impl Document {
    /// The starter pipeline as a document.
    pub fn demo() -> Result<Document> {
        Ok(Document::new().apply_batch(&demo_ops())?.doc)
    }
}
