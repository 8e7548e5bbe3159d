//! Server side: the authoritative copy of each document and the routing of
//! client requests to it.
//!
//! Everything here is synchronous and single-owner. [`crate::spawn_host`]
//! runs one [`Broker`] inside one task, so batches for a document are
//! serialized into a single order without locks.

use crate::config::HostConfig;
use crate::error::{Result, SyncError};
use crate::message::{ClientId, ClientMessage, Envelope, ServerMessage};
use flowsync_doc::{validate_sequence, Document, Operation};
use flowsync_ot::transform_batch;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, info, warn};

/// The authoritative state of one open document.
///
/// Every accepted batch is logged so that a batch produced against an older
/// version can be rebased over whatever was accepted since. The version is
/// the number of batches accepted so far.
#[derive(Debug)]
pub struct DocumentHost {
    path: String,
    doc: Document,
    log: VecDeque<Vec<Operation>>,
    trimmed: u64,
    subscribers: BTreeSet<ClientId>,
    history_limit: usize,
}

impl DocumentHost {
    pub fn new(path: impl Into<String>, doc: Document, config: &HostConfig) -> Self {
        Self {
            path: path.into(),
            doc,
            log: VecDeque::new(),
            trimmed: 0,
            subscribers: BTreeSet::new(),
            history_limit: config.history_limit,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn version(&self) -> u64 {
        self.trimmed + self.log.len() as u64
    }

    /// Oldest version a batch may still be produced against.
    pub fn oldest_version(&self) -> u64 {
        self.trimmed
    }

    pub fn subscribers(&self) -> &BTreeSet<ClientId> {
        &self.subscribers
    }

    pub fn subscribe(&mut self, client: ClientId) {
        self.subscribers.insert(client);
    }

    pub fn unsubscribe(&mut self, client: &ClientId) -> bool {
        self.subscribers.remove(client)
    }

    /// Accept a batch produced against `version`.
    ///
    /// Returns the operations that were actually applied, which is what every
    /// subscriber must replay. On error the document is unchanged.
    pub fn update(&mut self, version: u64, operations: &[Operation]) -> Result<Vec<Operation>> {
        let current = self.version();
        if version < self.trimmed || version > current {
            return Err(SyncError::Unsyncable {
                version,
                oldest: self.trimmed,
                current,
            });
        }
        validate_sequence(operations)?;

        let skip = (version - self.trimmed) as usize;
        let preceding: Vec<Operation> = self.log.iter().skip(skip).flatten().cloned().collect();
        let transformed = transform_batch(operations, &preceding)?;
        let batch = self.doc.apply_batch(&transformed)?;

        debug!(
            path = %self.path,
            version,
            rebased_over = preceding.len(),
            received = operations.len(),
            applied = batch.applied.len(),
            "batch accepted"
        );
        self.doc = batch.doc;
        self.log.push_back(batch.applied.clone());
        while self.log.len() > self.history_limit {
            self.log.pop_front();
            self.trimmed += 1;
        }
        Ok(batch.applied)
    }
}

#[derive(Debug, Default)]
struct Connection {
    path: Option<String>,
}

/// Routes client requests to document hosts and fans out the replies.
#[derive(Debug)]
pub struct Broker {
    config: HostConfig,
    hosts: HashMap<String, DocumentHost>,
    clients: HashMap<ClientId, Connection>,
}

impl Broker {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            hosts: HashMap::new(),
            clients: HashMap::new(),
        }
    }

    /// Register a new connection and produce its greeting.
    pub fn connect(&mut self, client_id: ClientId) -> Envelope {
        self.clients.insert(client_id.clone(), Connection::default());
        info!(%client_id, "client connected");
        Envelope::new(
            client_id.clone(),
            ServerMessage::ClientId { client_id },
        )
    }

    pub fn disconnect(&mut self, client: &ClientId) {
        if let Some(conn) = self.clients.remove(client) {
            self.leave(client, conn.path.as_deref());
            info!(client_id = %client, "client disconnected");
        }
    }

    pub fn host(&self, path: &str) -> Option<&DocumentHost> {
        self.hosts.get(path)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn leave(&mut self, client: &ClientId, path: Option<&str>) {
        if let Some(host) = path.and_then(|path| self.hosts.get_mut(path)) {
            host.unsubscribe(client);
        }
    }

    fn new_document(&self) -> Result<Document> {
        if self.config.seed_demo {
            Ok(Document::demo()?)
        } else {
            Ok(Document::new())
        }
    }

    /// Handle one request from `from`, producing every message it causes.
    pub fn handle(&mut self, from: &ClientId, message: ClientMessage) -> Vec<Envelope> {
        let id = message.id();
        match self.dispatch(from, message) {
            Ok(out) => out,
            Err(err) => {
                warn!(client_id = %from, id, %err, "request refused");
                vec![Envelope::new(
                    from.clone(),
                    ServerMessage::Error {
                        id: Some(id),
                        code: err.code(),
                        message: err.to_string(),
                    },
                )]
            }
        }
    }

    fn dispatch(&mut self, from: &ClientId, message: ClientMessage) -> Result<Vec<Envelope>> {
        let current = self
            .clients
            .get(from)
            .ok_or_else(|| SyncError::UnknownClient(from.clone()))?
            .path
            .clone();

        match message {
            ClientMessage::OpenDoc { id, path } => {
                self.leave(from, current.as_deref());
                if !self.hosts.contains_key(&path) {
                    let doc = self.new_document()?;
                    info!(%path, "document opened");
                    self.hosts
                        .insert(path.clone(), DocumentHost::new(path.clone(), doc, &self.config));
                }
                let host = self
                    .hosts
                    .get_mut(&path)
                    .ok_or_else(|| SyncError::NoDocument(from.clone()))?;
                host.subscribe(from.clone());
                let reply = snapshot(host, id);
                if let Some(conn) = self.clients.get_mut(from) {
                    conn.path = Some(path);
                }
                Ok(vec![Envelope::new(from.clone(), reply)])
            }
            ClientMessage::GetDoc { id } => {
                let host = current
                    .as_deref()
                    .and_then(|path| self.hosts.get(path))
                    .ok_or_else(|| SyncError::NoDocument(from.clone()))?;
                Ok(vec![Envelope::new(from.clone(), snapshot(host, id))])
            }
            ClientMessage::UpdateDoc {
                id,
                version,
                operations,
            } => {
                let host = current
                    .as_deref()
                    .and_then(|path| self.hosts.get_mut(path))
                    .ok_or_else(|| SyncError::NoDocument(from.clone()))?;
                let applied = host.update(version, &operations)?;
                let version = host.version();
                Ok(host
                    .subscribers()
                    .iter()
                    .map(|client| {
                        let id = (client == from).then_some(id);
                        Envelope::new(
                            client.clone(),
                            ServerMessage::UpdateDoc {
                                id,
                                version,
                                operations: applied.clone(),
                            },
                        )
                    })
                    .collect())
            }
            ClientMessage::CloseDoc { id } => {
                self.leave(from, current.as_deref());
                if let Some(conn) = self.clients.get_mut(from) {
                    conn.path = None;
                }
                Ok(vec![Envelope::new(from.clone(), ServerMessage::DocClosed { id })])
            }
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

fn snapshot(host: &DocumentHost, id: u64) -> ServerMessage {
    ServerMessage::Doc {
        id,
        version: host.version(),
        doc: host.document().clone(),
    }
}
