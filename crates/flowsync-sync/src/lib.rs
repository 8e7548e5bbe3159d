//! # flowsync-sync
//!
//! Keeping many editors of one pipeline document in step.
//!
//! One server holds the authoritative document and orders every batch.
//! Clients edit optimistically and reconcile when another client's batch is
//! ordered ahead of theirs.
//!
//! - [`Replica`] - the client reconciliation loop, free of I/O
//! - [`DocumentHost`] and [`Broker`] - the server side
//! - [`ClientMessage`] and [`ServerMessage`] - the wire protocol, encoded
//!   as JSON by [`codec`]
//! - [`Transport`], [`spawn_host`] and [`SyncClient`] - tokio drivers
//!
//! ## Example
//!
//! ```rust
//! use flowsync_doc::Operation;
//! use flowsync_sync::{Broker, ClientId, Replica};
//!
//! let mut broker = Broker::default();
//! let mut replica = Replica::default();
//!
//! let client = ClientId::new();
//! let greeting = broker.connect(client.clone());
//! replica.receive(greeting.message).unwrap();
//!
//! let open = replica.open("demo");
//! for reply in broker.handle(&client, open) {
//!     replica.receive(reply.message).unwrap();
//! }
//!
//! let id = replica.document().unwrap().index[0].clone();
//! let edit = Operation::SetLoadCsvFilename { id, filename: "q3.csv".into() };
//! let update = replica.edit(&[edit]).unwrap().unwrap();
//! for reply in broker.handle(&client, update) {
//!     replica.receive(reply.message).unwrap();
//! }
//! assert!(replica.is_settled());
//! assert_eq!(replica.version(), 1);
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod host;
pub mod message;
pub mod replica;
pub mod runtime;
pub mod transport;

pub use config::{ClientConfig, ClientConfigBuilder, HostConfig, HostConfigBuilder, ReplicaConfig};
pub use error::{Result, SyncError};
pub use host::{Broker, DocumentHost};
pub use message::{ClientId, ClientMessage, Envelope, ErrorCode, ServerMessage};
pub use replica::{Batch, Replica, Status};
pub use runtime::{spawn_host, HostHandle, Snapshot, SyncClient, SyncEvent};
pub use transport::{ChannelTransport, Transport};
