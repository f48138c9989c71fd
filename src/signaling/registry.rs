use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;

use super::types::{ConnId, Identity, OutboundMessage, SignalingError};

/// A live transport connection.
#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) identity: Option<Identity>,
    pub(crate) tx: mpsc::UnboundedSender<OutboundMessage>,
    pub(crate) opened_at: Instant,
}

/// Tracks every live connection and the identity it has claimed.
///
/// Every other component refers to a connection by `ConnId`; only the
/// registry holds the outbound channel, so all deliveries funnel through
/// `send`. The id stays valid until `unregister`, which callers run last
/// when tearing a connection down.
#[derive(Debug, Default)]
pub(crate) struct ConnectionRegistry {
    connections: HashMap<ConnId, Connection>,
}

impl ConnectionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admit a connection and mint its id. Identity is unknown until the
    /// connection joins the queue.
    pub(crate) fn register(&mut self, tx: mpsc::UnboundedSender<OutboundMessage>) -> ConnId {
        let conn = ConnId::generate();
        let previous = self.connections.insert(
            conn,
            Connection {
                identity: None,
                tx,
                opened_at: Instant::now(),
            },
        );
        // 64 random bits per id; a collision among live connections means
        // the generator is broken, not bad luck.
        assert!(
            previous.is_none(),
            "duplicate connection id generated: {conn}"
        );
        conn
    }

    pub(crate) fn identity_of(&self, conn: &ConnId) -> Option<&Identity> {
        self.connections.get(conn)?.identity.as_ref()
    }

    pub(crate) fn record_identity(&mut self, conn: &ConnId, identity: Identity) {
        if let Some(connection) = self.connections.get_mut(conn) {
            connection.identity = Some(identity);
        }
    }

    /// Registered and its outbound channel is still open.
    pub(crate) fn is_live(&self, conn: &ConnId) -> bool {
        self.connections
            .get(conn)
            .is_some_and(|connection| !connection.tx.is_closed())
    }

    /// Deliver a message into the connection's outbound channel.
    pub(crate) fn send(
        &self,
        conn: &ConnId,
        message: OutboundMessage,
    ) -> Result<(), SignalingError> {
        let connection = self
            .connections
            .get(conn)
            .ok_or(SignalingError::UnknownTarget(*conn))?;
        connection
            .tx
            .send(message)
            .map_err(|_| SignalingError::UnknownTarget(*conn))
    }

    /// Forget a connection. Pool and room eviction run before this so the
    /// id resolves throughout the teardown.
    pub(crate) fn unregister(&mut self, conn: &ConnId) -> Option<Connection> {
        self.connections.remove(conn)
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }
}
