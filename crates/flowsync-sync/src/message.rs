//! Messages exchanged between clients and the document server.
//!
//! Request ids are chosen by the client and echoed on the matching reply.
//! An `update_doc` from the server with `id: None` is another client's
//! batch; with `id: Some(..)` it acknowledges the receiver's own batch.

use flowsync_doc::{Document, Operation};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identity the server assigns to each connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to the document at `path`, leaving any other.
    OpenDoc { id: u64, path: String },
    /// Submit a batch produced against `version`.
    UpdateDoc {
        id: u64,
        version: u64,
        operations: Vec<Operation>,
    },
    /// Ask for the full current document.
    GetDoc { id: u64 },
    CloseDoc { id: u64 },
}

impl ClientMessage {
    pub fn id(&self) -> u64 {
        match self {
            ClientMessage::OpenDoc { id, .. }
            | ClientMessage::UpdateDoc { id, .. }
            | ClientMessage::GetDoc { id }
            | ClientMessage::CloseDoc { id } => *id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection.
    ClientId { client_id: ClientId },
    /// Full document, in reply to `open_doc` or `get_doc`.
    Doc {
        id: u64,
        version: u64,
        doc: Document,
    },
    /// An accepted batch, as applied by the server.
    UpdateDoc {
        id: Option<u64>,
        version: u64,
        operations: Vec<Operation>,
    },
    DocClosed { id: u64 },
    Error {
        id: Option<u64>,
        code: ErrorCode,
        message: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The frame could not be decoded.
    ParseError,
    /// The request is malformed or does not apply to the document.
    InvalidRequest,
    /// The batch was produced against a version the server no longer has
    /// history for, or has not reached yet.
    Unsyncable,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::ParseError => "parse_error",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::Unsyncable => "unsyncable",
        };
        f.write_str(name)
    }
}

/// A server message addressed to one client.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub to: ClientId,
    pub message: ServerMessage,
}

impl Envelope {
    pub fn new(to: ClientId, message: ServerMessage) -> Self {
        Self { to, message }
    }
}
