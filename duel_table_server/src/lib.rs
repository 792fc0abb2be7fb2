//! # Heads-up table server
//!
//! Clients connect over TCP (one JSON record per line) or WebSocket, join a
//! waiting queue, and are paired two at a time. Each pair plays a single round:
//! private and community cards are dealt, both hands are scored and the result is
//! broadcast. If a seated player leaves, the other is told and sent back to the
//! end of the queue.

pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod session;
pub mod table;
pub mod transport;

pub use connection::{ConnectionHandle, ConnectionId};
pub use error::{ConnectionClosed, ServerError};
pub use table::{TableHandle, TableSnapshot};
