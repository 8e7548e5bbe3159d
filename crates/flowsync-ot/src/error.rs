//! Error types for the transform engine.

use flowsync_doc::Operation;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// `op` depends on `mapper` but no rule says how to re-address it.
    #[error("Can't map {} onto {}", .op.name(), .mapper.name())]
    Unmappable {
        op: Box<Operation>,
        mapper: Box<Operation>,
    },
}

pub type Result<T> = std::result::Result<T, TransformError>;
