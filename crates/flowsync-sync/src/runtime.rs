//! Async drivers: the server task and the client actor.
//!
//! Both sides are single tasks that process one message at a time, so the
//! synchronous [`Broker`] and [`Replica`] never see concurrent access.

use crate::codec;
use crate::config::{ClientConfig, HostConfig};
use crate::error::{Result, SyncError};
use crate::host::Broker;
use crate::message::{ClientId, Envelope, ServerMessage};
use crate::replica::{Replica, Status};
use crate::transport::{ChannelTransport, Inbound, Transport};
use flowsync_doc::{Document, Operation};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outgoing frame senders, keyed by connection.
type Routes = Arc<RwLock<HashMap<ClientId, mpsc::UnboundedSender<String>>>>;

/// Handle to a running document server.
pub struct HostHandle {
    inbox: mpsc::UnboundedSender<Inbound>,
    routes: Routes,
    task: JoinHandle<()>,
}

/// Start a document server on the current runtime.
pub fn spawn_host(config: HostConfig) -> HostHandle {
    let (inbox, rx) = mpsc::unbounded_channel();
    let routes: Routes = Arc::new(RwLock::new(HashMap::new()));
    let task = tokio::spawn(run_host(Broker::new(config), rx, routes.clone()));
    HostHandle { inbox, routes, task }
}

impl HostHandle {
    /// Open a new in-memory connection.
    pub fn connect(&self) -> Result<ChannelTransport> {
        let client_id = ClientId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.write().insert(client_id.clone(), tx);
        self.inbox
            .send(Inbound::Connected(client_id.clone()))
            .map_err(|_| SyncError::ChannelClosed)?;
        Ok(ChannelTransport::new(client_id, self.inbox.clone(), rx))
    }

    pub fn connection_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Current version and contents of the document at `path`, if open.
    pub async fn snapshot(&self, path: impl Into<String>) -> Result<Option<(u64, Document)>> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Inbound::Snapshot {
                path: path.into(),
                reply,
            })
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    /// Stop the server after the requests already queued.
    pub async fn shutdown(self) {
        let _ = self.inbox.send(Inbound::Shutdown);
        let _ = self.task.await;
    }
}

async fn run_host(mut broker: Broker, mut inbox: mpsc::UnboundedReceiver<Inbound>, routes: Routes) {
    info!("document server started");
    while let Some(event) = inbox.recv().await {
        let out = match event {
            Inbound::Connected(client_id) => vec![broker.connect(client_id)],
            Inbound::Frame(from, frame) => match codec::decode_client(&frame) {
                Ok(message) => broker.handle(&from, message),
                Err(err) => {
                    warn!(client_id = %from, %err, "undecodable frame");
                    vec![Envelope::new(
                        from,
                        ServerMessage::Error {
                            id: None,
                            code: err.code(),
                            message: err.to_string(),
                        },
                    )]
                }
            },
            Inbound::Disconnected(client_id) => {
                routes.write().remove(&client_id);
                broker.disconnect(&client_id);
                continue;
            }
            Inbound::Snapshot { path, reply } => {
                let snapshot = broker
                    .host(&path)
                    .map(|host| (host.version(), host.document().clone()));
                let _ = reply.send(snapshot);
                continue;
            }
            Inbound::Shutdown => break,
        };
        deliver(&routes, out);
    }
    info!("document server stopped");
}

fn deliver(routes: &Routes, out: Vec<Envelope>) {
    let routes = routes.read();
    for Envelope { to, message } in out {
        let Some(tx) = routes.get(&to) else {
            debug!(client_id = %to, "dropping message for closed connection");
            continue;
        };
        match codec::encode(&message) {
            Ok(frame) => {
                if tx.send(frame).is_err() {
                    debug!(client_id = %to, "connection receiver gone");
                }
            }
            Err(err) => warn!(client_id = %to, %err, "failed to encode message"),
        }
    }
}

/// Events emitted by a [`SyncClient`].
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// The server assigned an identity.
    Connected(ClientId),
    /// A full copy of the document arrived.
    Loaded { version: u64 },
    /// The server accepted our batch.
    Acknowledged { version: u64 },
    /// Another client's batch was merged in.
    RemoteBatch { version: u64, count: usize },
    /// Local edits were dropped and the document requested again.
    Resyncing,
    /// The server reported an error unrelated to our batch.
    ServerError(SyncError),
    Disconnected,
}

/// What a [`SyncClient`] publishes after every message it processes.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub doc: Option<Document>,
    pub version: u64,
    pub status: Status,
    /// Nothing in flight and nothing queued.
    pub settled: bool,
}

impl Snapshot {
    fn of(replica: &Replica) -> Self {
        Self {
            doc: replica.document().cloned(),
            version: replica.version(),
            status: replica.status(),
            settled: replica.is_settled(),
        }
    }
}

enum Command {
    Edit {
        ops: Vec<Operation>,
        reply: oneshot::Sender<Result<()>>,
    },
    Resync,
    Close,
}

/// A replica driven by its own task.
///
/// Local edits and server messages are handled strictly one at a time.
pub struct SyncClient {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    events: broadcast::Sender<SyncEvent>,
    task: JoinHandle<()>,
}

impl SyncClient {
    /// Open `config.path` over `transport` and start reconciling.
    pub fn start<T: Transport>(config: ClientConfig, transport: T) -> Self {
        let replica = Replica::new(config.replica.clone());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(Snapshot::of(&replica));
        let (events, _) = broadcast::channel(config.event_capacity);
        let task = tokio::spawn(run_client(
            replica,
            config.path,
            transport,
            command_rx,
            snapshot_tx,
            events.clone(),
        ));
        Self {
            commands,
            snapshots,
            events,
            task,
        }
    }

    /// Apply a local edit. Hard errors are returned and change nothing.
    pub async fn edit(&self, ops: Vec<Operation>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Edit { ops, reply })
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    /// Discard local edits and fetch the document again.
    pub fn resync(&self) -> Result<()> {
        self.commands
            .send(Command::Resync)
            .map_err(|_| SyncError::ChannelClosed)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Wait until the replica is synced with nothing in flight, at `version`
    /// or later.
    pub async fn wait_settled(&self, version: u64) -> Result<Snapshot> {
        let mut rx = self.snapshots.clone();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if snapshot.settled && snapshot.version >= version {
                    return Ok(snapshot.clone());
                }
            }
            rx.changed().await.map_err(|_| SyncError::ChannelClosed)?;
        }
    }

    /// Close the document and stop the task.
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close);
        let _ = self.task.await;
    }
}

async fn run_client<T: Transport>(
    mut replica: Replica,
    path: String,
    mut transport: T,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<Snapshot>,
    events: broadcast::Sender<SyncEvent>,
) {
    if transport.send(replica.open(path)).await.is_err() {
        let _ = events.send(SyncEvent::Disconnected);
        return;
    }

    loop {
        let outgoing = tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Edit { ops, reply }) => match replica.edit(&ops) {
                    Ok(message) => {
                        let _ = reply.send(Ok(()));
                        message.into_iter().collect()
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                        Vec::new()
                    }
                },
                Some(Command::Resync) => {
                    let _ = events.send(SyncEvent::Resyncing);
                    vec![replica.resync()]
                }
                Some(Command::Close) | None => {
                    if let Some(message) = replica.close() {
                        let _ = transport.send(message).await;
                    }
                    snapshots.send_replace(Snapshot::of(&replica));
                    break;
                }
            },
            message = transport.recv() => match message {
                Ok(Some(message)) => {
                    let before = replica.status();
                    let event = describe(&message);
                    let outgoing = match replica.receive(message) {
                        Ok(outgoing) => {
                            if let Some(event) = event {
                                if took_effect(&event, before, replica.status()) {
                                    let _ = events.send(event);
                                }
                            }
                            outgoing
                        }
                        Err(err) => {
                            warn!(%err, "server error");
                            let _ = events.send(SyncEvent::ServerError(err));
                            Vec::new()
                        }
                    };
                    if replica.status() == Status::Resyncing && before != Status::Resyncing {
                        let _ = events.send(SyncEvent::Resyncing);
                    }
                    outgoing
                }
                Ok(None) => {
                    info!("connection closed by server");
                    let _ = events.send(SyncEvent::Disconnected);
                    break;
                }
                Err(err) => {
                    warn!(%err, "dropping frame");
                    Vec::new()
                }
            },
        };

        let mut closed = false;
        for message in outgoing {
            if transport.send(message).await.is_err() {
                closed = true;
                break;
            }
        }
        snapshots.send_replace(Snapshot::of(&replica));
        if closed {
            let _ = events.send(SyncEvent::Disconnected);
            break;
        }
    }
}

fn describe(message: &ServerMessage) -> Option<SyncEvent> {
    match message {
        ServerMessage::ClientId { client_id } => Some(SyncEvent::Connected(client_id.clone())),
        ServerMessage::Doc { version, .. } => Some(SyncEvent::Loaded { version: *version }),
        ServerMessage::UpdateDoc {
            id: Some(_),
            version,
            ..
        } => Some(SyncEvent::Acknowledged { version: *version }),
        ServerMessage::UpdateDoc {
            id: None,
            version,
            operations,
        } => Some(SyncEvent::RemoteBatch {
            version: *version,
            count: operations.len(),
        }),
        ServerMessage::DocClosed { .. } | ServerMessage::Error { .. } => None,
    }
}

/// Whether the replica acted on the message behind `event`, rather than
/// ignoring it or falling back to a resync.
fn took_effect(event: &SyncEvent, before: Status, after: Status) -> bool {
    match event {
        SyncEvent::Acknowledged { .. } | SyncEvent::RemoteBatch { .. } => {
            before == Status::Synced && after == Status::Synced
        }
        SyncEvent::Loaded { .. } => after == Status::Synced,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfigBuilder;
    use crate::message::ClientMessage;
    use flowsync_doc::{NodeId, Position};

    #[tokio::test]
    async fn test_client_loads_and_edits() {
        let host = spawn_host(HostConfig::default());
        let config = ClientConfigBuilder::new().path("demo").build();
        let client = SyncClient::start(config, host.connect().unwrap());
        let mut events = client.subscribe();

        let loaded = client.wait_settled(0).await.unwrap();
        assert_eq!(loaded.doc.unwrap().len(), 3);

        client
            .edit(vec![Operation::SetPosition {
                id: NodeId::from("demo_1"),
                position: Position::new(5.0, 5.0),
            }])
            .await
            .unwrap();
        let settled = client.wait_settled(1).await.unwrap();
        assert_eq!(settled.version, 1);

        let mut acknowledged = false;
        while let Ok(event) = events.try_recv() {
            acknowledged |= matches!(event, SyncEvent::Acknowledged { version: 1 });
        }
        assert!(acknowledged);

        let (version, doc) = host.snapshot("demo").await.unwrap().unwrap();
        assert_eq!(version, 1);
        assert_eq!(Some(doc), settled.doc);

        client.close().await;
        host.shutdown().await;
    }

    /// Transport whose server side is played by the test.
    struct Scripted {
        sent: mpsc::UnboundedSender<ClientMessage>,
        replies: mpsc::UnboundedReceiver<ServerMessage>,
    }

    #[async_trait::async_trait]
    impl Transport for Scripted {
        async fn send(&mut self, message: ClientMessage) -> Result<()> {
            self.sent.send(message).map_err(|_| SyncError::ChannelClosed)
        }

        async fn recv(&mut self) -> Result<Option<ServerMessage>> {
            Ok(self.replies.recv().await)
        }
    }

    #[tokio::test]
    async fn test_rejected_ack_reports_only_resync() {
        let (sent, mut outbox) = mpsc::unbounded_channel();
        let (server, replies) = mpsc::unbounded_channel();
        let client = SyncClient::start(ClientConfig::default(), Scripted { sent, replies });
        let mut events = client.subscribe();

        let open = outbox.recv().await.unwrap();
        server
            .send(ServerMessage::ClientId {
                client_id: ClientId::new(),
            })
            .unwrap();
        server
            .send(ServerMessage::Doc {
                id: open.id(),
                version: 0,
                doc: Document::demo().unwrap(),
            })
            .unwrap();
        client.wait_settled(0).await.unwrap();

        client
            .edit(vec![Operation::SetPosition {
                id: NodeId::from("demo_1"),
                position: Position::new(3.0, 3.0),
            }])
            .await
            .unwrap();
        let update = outbox.recv().await.unwrap();
        assert!(matches!(update, ClientMessage::UpdateDoc { .. }));

        // the server claims to have applied nothing
        server
            .send(ServerMessage::UpdateDoc {
                id: Some(update.id()),
                version: 1,
                operations: Vec::new(),
            })
            .unwrap();
        assert!(matches!(outbox.recv().await.unwrap(), ClientMessage::GetDoc { .. }));

        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.unwrap();
            if event == SyncEvent::Resyncing {
                break;
            }
            seen.push(event);
        }
        assert!(!seen
            .iter()
            .any(|event| matches!(event, SyncEvent::Acknowledged { .. })));
        assert_eq!(client.snapshot().status, Status::Resyncing);

        drop(server);
        client.close().await;
    }

    #[tokio::test]
    async fn test_edit_hard_error_is_returned() {
        let host = spawn_host(HostConfig::default());
        let client = SyncClient::start(ClientConfig::default(), host.connect().unwrap());
        client.wait_settled(0).await.unwrap();

        let err = client
            .edit(vec![Operation::SetPosition {
                id: NodeId::from("missing"),
                position: Position::default(),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Doc(_)));
        assert!(client.snapshot().settled);

        client.close().await;
        host.shutdown().await;
    }
}
