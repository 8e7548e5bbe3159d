//! Property-based tests for the executor.
//!
//! Random edit scripts are interpreted against a live document so that most
//! generated operations are applicable. After every step:
//!  - the structural invariants hold
//!  - the undo operation restores the previous document exactly

use flowsync_doc::*;
use proptest::prelude::*;

/// Turn four random bytes into an operation that targets the current doc.
fn interpret(doc: &Document, (kind, a, b, c): (u8, u8, u8, u8)) -> Option<Operation> {
    let ids: Vec<&NodeId> = doc.index.iter().collect();
    let pick = |n: u8| -> Option<NodeId> {
        if ids.is_empty() {
            None
        } else {
            Some(ids[n as usize % ids.len()].clone())
        }
    };
    let label = format!("v{}", c % 7);

    let op = match kind % 8 {
        0 => {
            let kinds = NodeKind::ALL;
            let kind = kinds[a as usize % kinds.len()];
            let node = Node::template(kind, NodeId::from(format!("n{b}-{c}").as_str()), Position::default());
            if doc.contains(&node.id) {
                return None;
            }
            // caller applies the pair as one step
            return Some(Operation::InsertNode { node });
        }
        1 => {
            let target = pick(a)?;
            let slots = doc.node(&target)?.slots();
            if slots.is_empty() {
                return None;
            }
            let (slot, _) = slots[b as usize % slots.len()];
            let input = if c % 4 == 0 { None } else { pick(c) };
            Operation::SetInput {
                id: target,
                name: slot,
                input,
            }
        }
        2 => Operation::SetPosition {
            id: pick(a)?,
            position: Position::new(b as f64, c as f64),
        },
        3 => {
            let id = pick(a)?;
            match &doc.node(&id)?.body {
                NodeBody::Select(n) => Operation::InsertSelect {
                    id,
                    index: b as usize % (n.columns.len() + 1),
                    column: SelectColumn {
                        column: label,
                        alias: String::new(),
                    },
                },
                NodeBody::Sort(n) => Operation::InsertSorter {
                    id,
                    index: b as usize % (n.sorters.len() + 1),
                    sorter: Sorter {
                        column: label,
                        direction: SortDirection::Asc,
                    },
                },
                NodeBody::Aggregate(n) => Operation::InsertAggregate {
                    id,
                    index: b as usize % (n.aggregates.len() + 1),
                    aggregate: Aggregate {
                        column: label,
                        computation: AggregateComputation::Max,
                        alias: String::new(),
                    },
                },
                _ => return None,
            }
        }
        4 => {
            let id = pick(a)?;
            match &doc.node(&id)?.body {
                NodeBody::Select(n) if !n.columns.is_empty() => Operation::DeleteSelect {
                    id,
                    index: b as usize % n.columns.len(),
                },
                NodeBody::Join(n) if !n.columns.is_empty() => Operation::DeleteJoinColumn {
                    id,
                    index: b as usize % n.columns.len(),
                },
                NodeBody::Case(n) if !n.cases.is_empty() => Operation::DeleteCase {
                    id,
                    index: b as usize % n.cases.len(),
                },
                _ => return None,
            }
        }
        5 => {
            let id = pick(a)?;
            match &doc.node(&id)?.body {
                NodeBody::Select(n) if !n.columns.is_empty() => Operation::SetSelectAlias {
                    id,
                    index: b as usize % n.columns.len(),
                    alias: label,
                },
                NodeBody::Sort(n) if !n.sorters.is_empty() => Operation::SetSortColumn {
                    id,
                    index: b as usize % n.sorters.len(),
                    column: label,
                },
                NodeBody::Cast(_) => Operation::SetCastName { id, name: label },
                NodeBody::Filter(_) => Operation::SetFilterColumn { id, column: label },
                NodeBody::LoadCsv(_) => Operation::SetLoadCsvFilename { id, filename: label },
                _ => return None,
            }
        }
        6 => {
            let id = pick(a)?;
            let index = doc.index_of(&id)?;
            Operation::DeleteIndex { id, index }
        }
        _ => Operation::DeleteNode { id: pick(a)? },
    };
    Some(op)
}

/// Expand single operations into the pairs that keep the index consistent.
fn step_ops(doc: &Document, op: Operation) -> Vec<Operation> {
    match op {
        Operation::InsertNode { node } => doc.add_node_ops(node),
        Operation::DeleteIndex { id, .. } => doc.raise_ops(&id).unwrap_or_default(),
        Operation::DeleteNode { id } => doc.remove_node_ops(&id).unwrap_or_default(),
        other => vec![other],
    }
}

fn script_strategy() -> impl Strategy<Value = Vec<(u8, u8, u8, u8)>> {
    prop::collection::vec(any::<(u8, u8, u8, u8)>(), 1..40)
}

// ============================================================================
// Executor properties
// ============================================================================

proptest! {
    #[test]
    fn random_scripts_keep_invariants_and_undo(script in script_strategy()) {
        let mut doc = Document::demo().unwrap();

        for choice in script {
            let Some(op) = interpret(&doc, choice) else { continue };
            let ops = step_ops(&doc, op);
            prop_assert!(validate_sequence(&ops).is_ok());

            let batch = doc.apply_batch(&ops).unwrap();
            batch.doc.validate().unwrap();

            let undo: Vec<Operation> = batch.undo.iter().rev().cloned().collect();
            let restored = batch.doc.apply_batch(&undo).unwrap();
            prop_assert_eq!(restored.applied.len(), undo.len());
            prop_assert_eq!(&restored.doc, &doc);

            doc = batch.doc;
        }
    }

    #[test]
    fn documents_survive_json(script in script_strategy()) {
        let mut doc = Document::demo().unwrap();
        for choice in script {
            let Some(op) = interpret(&doc, choice) else { continue };
            let ops = step_ops(&doc, op);
            doc = doc.apply_batch(&ops).unwrap().doc;
        }
        let json = doc.to_json().unwrap();
        prop_assert_eq!(Document::from_json(&json).unwrap(), doc);
    }
}
