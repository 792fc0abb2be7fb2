use std::future;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::watch;
use tracing::warn;
use uuid::Uuid;

use duel_table_core::ServerMessage;

use crate::error::ConnectionClosed;

pub type ConnectionId = Uuid;

/// The sending side of one client's connection.
///
/// Outbound records go through an MPSC queue drained by a dedicated writer task that
/// owns the socket, so records to one client are written whole and in order. Once the
/// writer task stops (the socket failed, or every handle was dropped) all sends fail.
///
/// A connection can also be abandoned: the table does this when a client lets its
/// queue fill up. An abandoned connection refuses further sends, its writer stops
/// and its session ends, which reports the disconnect.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<ServerMessage>,
    abandoned: Arc<watch::Sender<bool>>,
}

/// The writer task's end of a connection.
#[derive(Debug)]
pub struct Outbound {
    messages: mpsc::Receiver<ServerMessage>,
    abandoned: watch::Receiver<bool>,
}

impl ConnectionHandle {
    /// Creates a handle with a fresh id and the receiver its writer task must drain.
    pub fn channel(queue_depth: usize) -> (ConnectionHandle, Outbound) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let (abandon_tx, abandon_rx) = watch::channel(false);
        let handle = ConnectionHandle {
            id: Uuid::new_v4(),
            outbound: tx,
            abandoned: Arc::new(abandon_tx),
        };
        let outbound = Outbound {
            messages: rx,
            abandoned: abandon_rx,
        };
        (handle, outbound)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a record, waiting for room. Used by the connection's own session.
    pub async fn send(&self, msg: ServerMessage) -> Result<(), ConnectionClosed> {
        if self.is_abandoned() {
            return Err(ConnectionClosed(self.id));
        }
        tokio::select! {
            res = self.outbound.send(msg) => res.map_err(|_| ConnectionClosed(self.id)),
            _ = self.wait_abandoned() => Err(ConnectionClosed(self.id)),
        }
    }

    /// Queues a record without waiting. A full queue means the client has stopped
    /// reading; the connection is abandoned rather than left to stall the caller.
    pub fn try_send(&self, msg: ServerMessage) -> Result<(), ConnectionClosed> {
        if self.is_abandoned() {
            return Err(ConnectionClosed(self.id));
        }
        match self.outbound.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(conn = %self.id, "outbound queue full, abandoning connection");
                self.abandon();
                Err(ConnectionClosed(self.id))
            }
            Err(TrySendError::Closed(_)) => Err(ConnectionClosed(self.id)),
        }
    }

    pub fn abandon(&self) {
        self.abandoned.send_replace(true);
    }

    fn is_abandoned(&self) -> bool {
        *self.abandoned.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed() || self.is_abandoned()
    }

    /// Resolves once the writer task has gone away or the connection was abandoned.
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.outbound.closed() => {}
            _ = self.wait_abandoned() => {}
        }
    }

    async fn wait_abandoned(&self) {
        let mut rx = self.abandoned.subscribe();
        // the sender lives in `self`, so this only returns once abandoned
        let _ = rx.wait_for(|abandoned| *abandoned).await;
    }
}

impl Outbound {
    /// Next record to write; `None` once every handle is gone or the connection
    /// was abandoned.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        let Outbound { messages, abandoned } = self;
        if *abandoned.borrow() {
            return None;
        }
        tokio::select! {
            biased;
            _ = wait_abandoned(abandoned) => None,
            msg = messages.recv() => msg,
        }
    }

    pub fn try_recv(&mut self) -> Result<ServerMessage, TryRecvError> {
        self.messages.try_recv()
    }

    /// Resolves when the connection is abandoned. Writers race their socket writes
    /// against this so a client that never reads cannot pin the task.
    pub async fn abandoned(&mut self) {
        wait_abandoned(&mut self.abandoned).await
    }
}

async fn wait_abandoned(abandoned: &mut watch::Receiver<bool>) {
    if abandoned.wait_for(|abandoned| *abandoned).await.is_err() {
        // every handle dropped without abandoning; queued records still flush
        future::pending::<()>().await;
    }
}
