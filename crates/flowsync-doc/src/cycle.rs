//! Acyclicity guard for the input graph.
//!
//! Before `set_input` points `target` at `source`, the executor walks
//! backward from `source` along input slots. Reaching `target` means the
//! new edge would close a loop. The walk is breadth-first over a FIFO queue
//! and visits slots in slot order, so the reported path is reproducible.

use crate::document::Document;
use crate::error::{DocError, Result};
use crate::node::NodeId;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Find the chain that an edge `source -> target` would close.
///
/// Returns the path in data-flow order, starting at `target` and ending at
/// `source`, or `None` if the edge is safe. A node referenced as an input but
/// missing from the document is a hard error.
pub fn find_cycle(doc: &Document, source: &NodeId, target: &NodeId) -> Result<Option<Vec<NodeId>>> {
    if source == target {
        return Ok(Some(vec![source.clone()]));
    }

    // child -> the node that reads from it, for path reconstruction
    let mut reader: BTreeMap<&NodeId, &NodeId> = BTreeMap::new();
    let mut visited: BTreeSet<&NodeId> = BTreeSet::new();
    let mut queue: VecDeque<&NodeId> = VecDeque::new();

    visited.insert(source);
    queue.push_back(source);

    while let Some(current) = queue.pop_front() {
        let node = doc.nodes.get(current).ok_or_else(|| DocError::NodeNotFound {
            op: "set_input",
            id: current.clone(),
        })?;

        for input in node.inputs() {
            if !visited.insert(input) {
                continue;
            }
            reader.insert(input, current);

            if input == target {
                let mut path = vec![target.clone()];
                let mut step = target;
                while let Some(&next) = reader.get(step) {
                    path.push(next.clone());
                    step = next;
                }
                return Ok(Some(path));
            }

            if !doc.nodes.contains_key(input) {
                return Err(DocError::DanglingInput {
                    node: current.clone(),
                    input: input.clone(),
                });
            }
            queue.push_back(input);
        }
    }

    Ok(None)
}

/// Verify that the whole input graph is acyclic.
///
/// Kahn's algorithm over the `outputs` edges; any node left with unresolved
/// inputs sits on a cycle.
pub fn check_acyclic(doc: &Document) -> Result<()> {
    let mut pending: BTreeMap<&NodeId, usize> = doc
        .nodes
        .iter()
        .map(|(id, node)| (id, node.inputs().count()))
        .collect();

    let mut ready: VecDeque<&NodeId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut resolved = 0;

    while let Some(id) = ready.pop_front() {
        resolved += 1;
        let Some(node) = doc.nodes.get(id) else {
            continue;
        };
        for consumer in &node.outputs {
            let Some(reader) = doc.nodes.get(consumer) else {
                continue;
            };
            // one decrement per slot that reads from `id`
            for _ in 0..reader.references(id) {
                if let Some(count) = pending.get_mut(consumer) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.push_back(consumer);
                    }
                }
            }
        }
    }

    if resolved == doc.nodes.len() {
        Ok(())
    } else {
        let stuck: Vec<String> = pending
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        Err(DocError::InvariantViolation(format!(
            "input graph has a cycle through {}",
            stuck.join(", ")
        )))
    }
}
