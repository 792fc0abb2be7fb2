//! Listeners that accept clients and hand each one to a session loop.

pub mod tcp;
pub mod ws;

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::error::ServerError;

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}
