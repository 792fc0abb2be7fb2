//! Error types for the table server.

use std::io;
use std::net::SocketAddr;

use crate::connection::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The table actor has stopped and no longer accepts commands
    #[error("table is closed")]
    TableClosed,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// A send to a connection whose writer task has already stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection {0} is closed")]
pub struct ConnectionClosed(pub ConnectionId);
