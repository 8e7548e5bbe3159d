//! Error types for the sync layer.

use crate::message::{ClientId, ErrorCode};
use flowsync_doc::DocError;
use flowsync_ot::TransformError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// No document is loaded, or a resync is in flight.
    #[error("Document not ready")]
    NotReady,

    #[error(transparent)]
    Doc(#[from] DocError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    /// An undo operation was rejected while unwinding local edits.
    #[error("Unwind rejected {op} on {id}")]
    UnwindRejected { op: &'static str, id: String },

    #[error("Version {version} is outside the server history ({oldest}..={current})")]
    Unsyncable {
        version: u64,
        oldest: u64,
        current: u64,
    },

    #[error("No document open for client {0}")]
    NoDocument(ClientId),

    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    #[error("Server error {code}: {message}")]
    Server { code: ErrorCode, message: String },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// The code a server reports for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::Unsyncable { .. } => ErrorCode::Unsyncable,
            SyncError::Codec(_) => ErrorCode::ParseError,
            SyncError::Server { code, .. } => *code,
            _ => ErrorCode::InvalidRequest,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
