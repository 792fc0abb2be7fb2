//! Per-connection request loop.

use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use tracing::{debug, trace, warn};

use duel_table_core::{ClientMessage, decode_request};

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::ServerError;
use crate::table::TableHandle;

/// Reads inbound frames until the client goes away, then tells the table.
///
/// The loop ends on end-of-stream, on a read error, or when the connection's writer
/// task stops. Whichever way it ends, the table sees exactly one disconnect for `conn`.
pub async fn run_session<S, E>(conn: ConnectionHandle, frames: S, table: TableHandle)
where
    S: Stream<Item = Result<String, E>>,
    E: Display,
{
    let mut guard = DisconnectGuard {
        id: conn.id(),
        table: Some(table.clone()),
    };
    let mut frames = std::pin::pin!(frames);

    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = conn.closed() => {
                debug!("outbound side closed");
                break;
            }
        };
        let text = match frame {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                debug!(error = %e, "read failed");
                break;
            }
            None => {
                debug!("end of stream");
                break;
            }
        };

        if text.trim().is_empty() {
            continue;
        }
        if let Err(e) = dispatch(&conn, &text, &table).await {
            warn!(error = %e, "table unavailable, ending session");
            break;
        }
    }

    guard.finish().await;
}

async fn dispatch(conn: &ConnectionHandle, text: &str, table: &TableHandle) -> Result<(), ServerError> {
    match decode_request(text) {
        Ok(ClientMessage::Join { name }) => table.join(conn.clone(), name).await?,
        Ok(ClientMessage::Ready) => trace!("ready"),
        Err(e) => {
            debug!(error = %e, "rejected request");
            // a dead connection is noticed by the loop through `closed()`
            let _ = conn.send(e.reply()).await;
        }
    }
    Ok(())
}

/// Reports the disconnect when the session future is dropped before finishing.
struct DisconnectGuard {
    id: ConnectionId,
    table: Option<TableHandle>,
}

impl DisconnectGuard {
    async fn finish(&mut self) {
        if let Some(table) = self.table.take() {
            if let Err(e) = table.disconnect(self.id).await {
                debug!(error = %e, "disconnect not delivered");
            }
        }
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Some(table) = self.table.take() else {
            return;
        };
        let id = self.id;
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                let _ = table.disconnect(id).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use crate::table::{self, TableSnapshot};
    use duel_table_core::{MATCHED, OPPONENT_LEFT, RankSum, Seat, ServerMessage, WAITING};
    use futures_util::stream;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::convert::Infallible;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    /// A live session fed through a channel, like a socket the test types into.
    struct Peer {
        id: ConnectionId,
        input: Option<mpsc::UnboundedSender<String>>,
        output: Outbound,
        task: JoinHandle<()>,
    }

    impl Peer {
        fn connect(table: &TableHandle) -> Peer {
            let (conn, output) = ConnectionHandle::channel(64);
            let (input, inbox) = mpsc::unbounded_channel::<String>();
            let frames = stream::unfold(inbox, |mut inbox| async move {
                inbox.recv().await.map(|line| (Ok::<_, Infallible>(line), inbox))
            });
            let id = conn.id();
            let task = tokio::spawn(run_session(conn, frames, table.clone()));
            Peer { id, input: Some(input), output, task }
        }

        fn send(&self, line: &str) {
            self.input.as_ref().unwrap().send(line.to_string()).unwrap();
        }

        async fn recv(&mut self) -> ServerMessage {
            tokio::time::timeout(Duration::from_secs(5), self.output.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("connection closed")
        }

        async fn hang_up(mut self) {
            self.input.take();
            self.task.await.unwrap();
        }
    }

    fn table() -> TableHandle {
        table::spawn(RankSum, StdRng::seed_from_u64(5)).0
    }

    async fn settle(table: &TableHandle) -> TableSnapshot {
        // snapshot is queued behind any command the sessions already sent
        tokio::time::sleep(Duration::from_millis(20)).await;
        table.snapshot().await.unwrap()
    }

    #[tokio::test]
    async fn test_bad_request_keeps_connection_usable() {
        let table = table();
        let mut peer = Peer::connect(&table);

        peer.send("this is not json");
        assert_eq!(peer.recv().await, ServerMessage::error("bad_request"));

        peer.send(r#"{"type":"join","name":"alice"}"#);
        assert_eq!(peer.recv().await, ServerMessage::status(WAITING));

        let snap = settle(&table).await;
        assert_eq!(snap.waiting, vec![(peer.id, "alice".to_string())]);
    }

    #[tokio::test]
    async fn test_unknown_kind_answers_only_sender() {
        let table = table();
        let mut a = Peer::connect(&table);
        let mut b = Peer::connect(&table);
        a.send(r#"{"type":"join","name":"a"}"#);
        assert_eq!(a.recv().await, ServerMessage::status(WAITING));

        b.send(r#"{"type":"fold"}"#);
        assert_eq!(b.recv().await, ServerMessage::error("unknown"));
        assert!(a.output.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ready_and_blank_lines_are_ignored() {
        let table = table();
        let mut peer = Peer::connect(&table);
        peer.send(r#"{"type":"ready"}"#);
        peer.send("   ");
        peer.send(r#"{"type":"join","name":"a"}"#);
        assert_eq!(peer.recv().await, ServerMessage::status(WAITING));
    }

    #[tokio::test]
    async fn test_hang_up_frees_opponent() {
        let table = table();
        let mut a = Peer::connect(&table);
        let mut b = Peer::connect(&table);

        a.send(r#"{"type":"join","name":"a"}"#);
        assert_eq!(a.recv().await, ServerMessage::status(WAITING));
        b.send(r#"{"type":"join","name":"b"}"#);
        assert_eq!(b.recv().await, ServerMessage::status(WAITING));

        assert_eq!(b.recv().await, ServerMessage::Matched { seat: Seat::One });
        assert_eq!(b.recv().await, ServerMessage::status(MATCHED));
        assert!(matches!(b.recv().await, ServerMessage::Deal { seat: Seat::One, .. }));
        assert!(matches!(b.recv().await, ServerMessage::Result { .. }));

        let a_id = a.id;
        a.hang_up().await;
        assert_eq!(b.recv().await, ServerMessage::status(OPPONENT_LEFT));

        let snap = settle(&table).await;
        assert_eq!(snap.seated, None);
        assert_eq!(snap.waiting, vec![(b.id, "b".to_string())]);
        assert!(snap.waiting.iter().all(|(id, _)| *id != a_id));
    }

    #[tokio::test]
    async fn test_session_ends_when_writer_dies() {
        let table = table();
        let mut a = Peer::connect(&table);
        a.send(r#"{"type":"join","name":"a"}"#);
        assert_eq!(a.recv().await, ServerMessage::status(WAITING));

        // inbound stays open, but nobody drains the socket any more
        let Peer { input, output, task, .. } = a;
        drop(output);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("session did not notice the dead writer")
            .unwrap();
        drop(input);

        assert!(table.snapshot().await.unwrap().waiting.is_empty());
    }

    #[tokio::test]
    async fn test_finite_stream_disconnects_once() {
        let table = table();
        let (conn, mut output) = ConnectionHandle::channel(8);
        let frames = stream::iter(vec![
            Ok::<_, Infallible>("{oops".to_string()),
            Ok(r#"{"type":"join","name":"x"}"#.to_string()),
        ]);
        run_session(conn, frames, table.clone()).await;

        assert_eq!(output.recv().await, Some(ServerMessage::error("bad_request")));
        assert_eq!(output.recv().await, Some(ServerMessage::status(WAITING)));
        assert!(table.snapshot().await.unwrap().waiting.is_empty());
    }

    #[tokio::test]
    async fn test_read_error_ends_session() {
        let table = table();
        let (conn, _output) = ConnectionHandle::channel(8);
        let frames = stream::iter(vec![
            Ok(r#"{"type":"join","name":"x"}"#.to_string()),
            Err("connection reset"),
            Ok(r#"{"type":"join","name":"never read"}"#.to_string()),
        ]);
        run_session(conn, frames, table.clone()).await;
        assert!(table.snapshot().await.unwrap().waiting.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_session_still_disconnects() {
        let table = table();
        let mut a = Peer::connect(&table);
        a.send(r#"{"type":"join","name":"a"}"#);
        assert_eq!(a.recv().await, ServerMessage::status(WAITING));

        a.task.abort();
        let snap = settle(&table).await;
        assert!(snap.waiting.is_empty());
    }
}
