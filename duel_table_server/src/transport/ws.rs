//! WebSocket endpoint at `/ws`: one JSON record per text frame, same table as TCP.

use std::io;
use std::net::SocketAddr;

use axum::{
    Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt, future};
use tokio::net::TcpListener;
use tracing::{Instrument, debug, error, info, info_span};

use crate::connection::ConnectionHandle;
use crate::session::run_session;
use crate::table::TableHandle;

#[derive(Clone)]
struct WsState {
    table: TableHandle,
    queue_depth: usize,
}

pub fn router(table: TableHandle, queue_depth: usize) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(WsState { table, queue_depth })
}

pub async fn serve(listener: TcpListener, table: TableHandle, queue_depth: usize) -> io::Result<()> {
    let app = router(table, queue_depth);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: WsState) {
    let (mut sender, receiver) = socket.split();
    let (conn, mut outbound) = ConnectionHandle::channel(state.queue_depth);
    let span = info_span!("ws", id = %conn.id(), %peer);

    tokio::spawn(
        async move {
            while let Some(msg) = outbound.recv().await {
                let payload = match serde_json::to_string(&msg) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(error = %e, "failed to encode outbound record");
                        break;
                    }
                };
                tokio::select! {
                    res = sender.send(Message::Text(payload.into())) => {
                        if res.is_err() {
                            break;
                        }
                    }
                    _ = outbound.abandoned() => {
                        debug!("abandoned mid-write");
                        break;
                    }
                }
            }
            // an abandoned peer is not reading, so a close frame could block too
            tokio::select! {
                _ = sender.close() => {}
                _ = outbound.abandoned() => {}
            }
        }
        .instrument(span.clone()),
    );

    // control frames are handled by axum; binary frames are read as text
    let frames = receiver.filter_map(|msg| {
        future::ready(match msg {
            Ok(Message::Text(text)) => Some(Ok(text.to_string())),
            Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
    });

    async move {
        info!("client connected");
        run_session(conn, frames, state.table).await;
        info!("client disconnected");
    }
    .instrument(span)
    .await
}
