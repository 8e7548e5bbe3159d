//! Error types for the document layer.
//!
//! Everything here is a hard error: the document or the operation stream is
//! corrupt and the session has to resync. Expected races are reported as
//! [`crate::Rejection`] values instead.

use crate::node::{NodeId, NodeKind};
use crate::types::InputName;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocError {
    #[error("{op}: node not found: {id}")]
    NodeNotFound { op: &'static str, id: NodeId },

    #[error("{op}: node already exists: {id}")]
    NodeExists { op: &'static str, id: NodeId },

    #[error("{op}: node {id} is a {found} node, expected {expected}")]
    KindMismatch {
        op: &'static str,
        id: NodeId,
        expected: NodeKind,
        found: NodeKind,
    },

    #[error("{op}: index {index} out of bounds for node {id} (length: {length})")]
    IndexOutOfBounds {
        op: &'static str,
        id: NodeId,
        index: usize,
        length: usize,
    },

    #[error("{op}: node {id} has no {name} input")]
    NoSuchInput {
        op: &'static str,
        id: NodeId,
        name: InputName,
    },

    #[error("{op}: node {id} is still connected")]
    NodeConnected { op: &'static str, id: NodeId },

    #[error("delete_node: node {0} is still in the index")]
    StillIndexed(NodeId),

    #[error("insert_index: node {0} is already in the index")]
    AlreadyIndexed(NodeId),

    #[error("delete_index: index {index} holds {found}, expected {expected}")]
    IndexIdMismatch {
        index: usize,
        expected: NodeId,
        found: NodeId,
    },

    #[error("node {node} reads from missing node {input}")]
    DanglingInput { node: NodeId, input: NodeId },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid operation sequence at {position}: {reason}")]
    InvalidSequence { position: usize, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DocError {
    fn from(err: serde_json::Error) -> Self {
        DocError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DocError>;
