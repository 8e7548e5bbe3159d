//! Transport abstraction between a client and the document server.

use crate::codec;
use crate::error::{Result, SyncError};
use crate::message::{ClientId, ClientMessage, ServerMessage};
use async_trait::async_trait;
use flowsync_doc::Document;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// A client's connection to the server.
///
/// Delivery is ordered and reliable for as long as the connection lives.
/// `recv` must be cancel safe: it is polled inside `tokio::select!`.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, message: ClientMessage) -> Result<()>;

    /// The next server message, or `None` once the connection is gone.
    async fn recv(&mut self) -> Result<Option<ServerMessage>>;
}

/// What the server task receives from its connections and its handle.
#[derive(Debug)]
pub(crate) enum Inbound {
    Connected(ClientId),
    Frame(ClientId, String),
    Disconnected(ClientId),
    Snapshot {
        path: String,
        reply: oneshot::Sender<Option<(u64, Document)>>,
    },
    Shutdown,
}

/// In-memory connection that carries JSON text frames over tokio channels,
/// the same frames a socket would carry.
pub struct ChannelTransport {
    client_id: ClientId,
    outbound: mpsc::UnboundedSender<Inbound>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
    pub(crate) fn new(
        client_id: ClientId,
        outbound: mpsc::UnboundedSender<Inbound>,
        inbound: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self {
            client_id,
            outbound,
            inbound,
        }
    }

    /// Identity the server knows this connection by.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        let frame = codec::encode(&message)?;
        self.outbound
            .send(Inbound::Frame(self.client_id.clone(), frame))
            .map_err(|_| SyncError::ChannelClosed)
    }

    async fn recv(&mut self) -> Result<Option<ServerMessage>> {
        match self.inbound.recv().await {
            Some(frame) => codec::decode_server(&frame).map(Some).map_err(|err| {
                warn!(client_id = %self.client_id, %err, "undecodable frame");
                err
            }),
            None => Ok(None),
        }
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        debug!(client_id = %self.client_id, "closing connection");
        let _ = self
            .outbound
            .send(Inbound::Disconnected(self.client_id.clone()));
    }
}
