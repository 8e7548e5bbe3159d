//! Client-side reconciliation loop.
//!
//! A [`Replica`] holds everything one client knows about one document: the
//! optimistic local state, the last version the server confirmed, at most
//! one batch awaiting acknowledgement (`sent`) and the edits made since
//! (`pending`). It performs no I/O; every entry point returns the messages
//! to transmit.
//!
//! Edits apply immediately. When another client's batch arrives first, the
//! replica unwinds its own edits back to the confirmed state, applies the
//! remote batch, rebases its edits over it and reapplies them. Anything
//! that goes wrong on that path means local state can no longer be trusted,
//! so the replica drops its edits and fetches the document again.

use crate::config::ReplicaConfig;
use crate::error::{Result, SyncError};
use crate::message::{ClientId, ClientMessage, ServerMessage};
use flowsync_doc::{Document, Operation, Outcome};
use flowsync_ot::{merge_batch, rebase};
use tracing::{debug, info, warn};

/// Operations applied locally together with their inverses.
///
/// `undo[i]` restores the state before `ops[i]`, except after compaction,
/// where a coalesced run keeps the undo of its first edit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub ops: Vec<Operation>,
    pub undo: Vec<Operation>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// No document open.
    Closed,
    /// Waiting for the first copy of the document.
    Syncing,
    Synced,
    /// Local state was discarded; waiting for a fresh copy.
    Resyncing,
}

#[derive(Debug)]
pub struct Replica {
    config: ReplicaConfig,
    client_id: Option<ClientId>,
    path: Option<String>,
    doc: Option<Document>,
    version: u64,
    sent: Batch,
    pending: Batch,
    outstanding: Option<u64>,
    /// Request id of the `open_doc` or `get_doc` awaiting its document.
    awaiting_doc: Option<u64>,
    next_id: u64,
    status: Status,
}

impl Replica {
    pub fn new(config: ReplicaConfig) -> Self {
        Self {
            config,
            client_id: None,
            path: None,
            doc: None,
            version: 0,
            sent: Batch::default(),
            pending: Batch::default(),
            outstanding: None,
            awaiting_doc: None,
            next_id: 0,
            status: Status::Closed,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The optimistic document: confirmed state plus local edits.
    pub fn document(&self) -> Option<&Document> {
        self.doc.as_ref()
    }

    /// Last version confirmed by the server.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn sent(&self) -> &Batch {
        &self.sent
    }

    pub fn pending(&self) -> &Batch {
        &self.pending
    }

    /// Request id of the batch awaiting acknowledgement.
    pub fn outstanding(&self) -> Option<u64> {
        self.outstanding
    }

    /// True when synced with nothing in flight and nothing queued.
    pub fn is_settled(&self) -> bool {
        self.status == Status::Synced && self.outstanding.is_none() && self.pending.is_empty()
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn clear_local(&mut self) {
        self.sent = Batch::default();
        self.pending = Batch::default();
        self.outstanding = None;
    }

    /// Start following the document at `path`.
    pub fn open(&mut self, path: impl Into<String>) -> ClientMessage {
        let path = path.into();
        self.clear_local();
        self.doc = None;
        self.version = 0;
        self.status = Status::Syncing;
        self.path = Some(path.clone());
        info!(%path, "opening document");
        let id = self.next_request_id();
        self.awaiting_doc = Some(id);
        ClientMessage::OpenDoc { id, path }
    }

    /// Stop following the current document. Unacknowledged edits are lost.
    pub fn close(&mut self) -> Option<ClientMessage> {
        self.path.take()?;
        self.clear_local();
        self.doc = None;
        self.awaiting_doc = None;
        self.status = Status::Closed;
        Some(ClientMessage::CloseDoc {
            id: self.next_request_id(),
        })
    }

    /// Drop local edits and ask for the authoritative document.
    pub fn resync(&mut self) -> ClientMessage {
        info!(
            dropped = self.sent.len() + self.pending.len(),
            "resyncing document"
        );
        self.clear_local();
        self.status = Status::Resyncing;
        let id = self.next_request_id();
        self.awaiting_doc = Some(id);
        ClientMessage::GetDoc { id }
    }

    /// Apply a local edit.
    ///
    /// Returns the `update_doc` to send if no batch was in flight. A hard
    /// error leaves the replica untouched.
    pub fn edit(&mut self, ops: &[Operation]) -> Result<Option<ClientMessage>> {
        if self.status != Status::Synced {
            return Err(SyncError::NotReady);
        }
        let doc = self.doc.as_ref().ok_or(SyncError::NotReady)?;
        let batch = doc.apply_batch(ops)?;
        if batch.applied.is_empty() {
            return Ok(None);
        }
        self.doc = Some(batch.doc);

        let replaced = if self.config.compact_batches {
            merge_batch(&mut self.pending.ops, &batch.applied)
        } else {
            self.pending.ops.extend_from_slice(&batch.applied);
            false
        };
        if !replaced {
            self.pending.undo.extend(batch.undo);
        }

        if self.outstanding.is_none() {
            Ok(Some(self.flush()))
        } else {
            Ok(None)
        }
    }

    /// Promote pending edits to the in-flight batch.
    fn flush(&mut self) -> ClientMessage {
        let id = self.next_request_id();
        self.sent = std::mem::take(&mut self.pending);
        self.outstanding = Some(id);
        debug!(id, count = self.sent.len(), version = self.version, "sending batch");
        ClientMessage::UpdateDoc {
            id,
            version: self.version,
            operations: self.sent.ops.clone(),
        }
    }

    /// Handle one message from the server.
    ///
    /// Errors are only returned for server errors that do not concern the
    /// in-flight batch; reconciliation failures resync instead.
    pub fn receive(&mut self, message: ServerMessage) -> Result<Vec<ClientMessage>> {
        match message {
            ServerMessage::ClientId { client_id } => {
                info!(%client_id, "connected");
                self.client_id = Some(client_id);
                Ok(Vec::new())
            }
            ServerMessage::Doc { version, doc, .. } => {
                if self.status == Status::Closed {
                    debug!(version, "ignoring document after close");
                } else {
                    self.load(doc, version);
                }
                Ok(Vec::new())
            }
            ServerMessage::UpdateDoc {
                id: Some(id),
                version,
                operations,
            } => Ok(self.on_ack(id, version, &operations)),
            ServerMessage::UpdateDoc {
                id: None,
                version,
                operations,
            } => Ok(self.on_remote(version, &operations)),
            ServerMessage::DocClosed { .. } => {
                debug!("document closed");
                Ok(Vec::new())
            }
            ServerMessage::Error { id, code, message } => {
                if id.is_some() && id == self.outstanding {
                    warn!(%code, %message, "batch refused");
                    return Ok(vec![self.resync()]);
                }
                // a batch abandoned by an earlier resync
                if self.status == Status::Resyncing && id.is_some() && id != self.awaiting_doc {
                    debug!(?id, %code, "ignoring error for abandoned request");
                    return Ok(Vec::new());
                }
                Err(SyncError::Server { code, message })
            }
        }
    }

    fn load(&mut self, doc: Document, version: u64) {
        info!(version, nodes = doc.len(), "document loaded");
        self.clear_local();
        self.awaiting_doc = None;
        self.doc = Some(doc);
        self.version = version;
        self.status = Status::Synced;
    }

    fn on_ack(&mut self, id: u64, version: u64, operations: &[Operation]) -> Vec<ClientMessage> {
        if self.status != Status::Synced {
            debug!(id, "ignoring ack while not synced");
            return Vec::new();
        }
        if self.outstanding != Some(id) {
            warn!(id, outstanding = ?self.outstanding, "ack for unknown batch");
            return vec![self.resync()];
        }
        // The server rebased and applied the batch on its own; if it kept a
        // different set of operations the optimistic state is wrong.
        if operations != self.sent.ops.as_slice() {
            warn!(id, "server applied a different batch");
            return vec![self.resync()];
        }

        self.version = version;
        self.outstanding = None;
        self.sent = Batch::default();
        debug!(id, version, "batch acknowledged");

        if self.pending.is_empty() {
            Vec::new()
        } else {
            vec![self.flush()]
        }
    }

    fn on_remote(&mut self, version: u64, operations: &[Operation]) -> Vec<ClientMessage> {
        if self.status != Status::Synced {
            debug!(version, "ignoring remote batch while not synced");
            return Vec::new();
        }
        match self.absorb(operations) {
            Ok(()) => {
                self.version = version;
                Vec::new()
            }
            Err(err) => {
                warn!(%err, "reconciliation failed");
                vec![self.resync()]
            }
        }
    }

    /// Unwind local edits, apply `remote`, then rebase and reapply them.
    fn absorb(&mut self, remote: &[Operation]) -> Result<()> {
        let doc = self.doc.as_ref().ok_or(SyncError::NotReady)?;
        let undo = self.pending.undo.iter().rev().chain(self.sent.undo.iter().rev());
        let confirmed = unwind(doc, undo)?;

        let received = confirmed.apply_batch(remote)?;
        if received.applied.len() != remote.len() {
            return Err(SyncError::Protocol(
                "remote batch did not apply cleanly".into(),
            ));
        }

        let split = self.sent.len();
        let local: Vec<Operation> = self
            .sent
            .ops
            .iter()
            .chain(&self.pending.ops)
            .cloned()
            .collect();
        let rebased = rebase(&local, remote)?;
        let (sent, pending) = rebased.split_at(split);

        let sent_ops: Vec<Operation> = sent.iter().flatten().cloned().collect();
        let pending_ops: Vec<Operation> = pending.iter().flatten().cloned().collect();
        let sent_batch = received.doc.apply_batch(&sent_ops)?;
        let pending_batch = sent_batch.doc.apply_batch(&pending_ops)?;

        debug!(
            remote = remote.len(),
            sent = sent_batch.applied.len(),
            pending = pending_batch.applied.len(),
            "rebased local edits"
        );
        self.doc = Some(pending_batch.doc);
        self.sent = Batch {
            ops: sent_batch.applied,
            undo: sent_batch.undo,
        };
        self.pending = Batch {
            ops: pending_batch.applied,
            undo: pending_batch.undo,
        };
        Ok(())
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new(ReplicaConfig::default())
    }
}

/// Apply undo operations strictly: a rejection means the ledger is corrupt.
fn unwind<'a>(doc: &Document, undo: impl IntoIterator<Item = &'a Operation>) -> Result<Document> {
    let mut doc = doc.clone();
    for op in undo {
        match doc.apply(op)? {
            Outcome::Applied { doc: next, .. } => doc = next,
            Outcome::Rejected(_) => {
                return Err(SyncError::UnwindRejected {
                    op: op.name(),
                    id: op.node_id().to_string(),
                })
            }
        }
    }
    Ok(doc)
}
