//! Line-delimited JSON over plain TCP: one record per `\n`-terminated line.

use std::io;
use std::net::SocketAddr;

use futures_util::stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::connection::{ConnectionHandle, Outbound};
use crate::session::run_session;
use crate::table::TableHandle;

/// Longest inbound line accepted when none is configured, in bytes.
pub const DEFAULT_MAX_LINE: usize = 64 * 1024;

/// Accepts clients forever. Accept errors are logged and do not stop the listener.
pub async fn serve(listener: TcpListener, table: TableHandle, queue_depth: usize, max_line: usize) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_stream(stream, peer, table.clone(), queue_depth, max_line));
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}

async fn handle_stream(
    stream: TcpStream,
    peer: SocketAddr,
    table: TableHandle,
    queue_depth: usize,
    max_line: usize,
) {
    let (read, write) = stream.into_split();
    let (conn, outbound) = ConnectionHandle::channel(queue_depth);
    let span = info_span!("conn", id = %conn.id(), %peer);

    tokio::spawn(write_lines(write, outbound).instrument(span.clone()));

    // an over-long line is a read error, which ends the session
    let frames = stream::unfold(BufReader::new(read), move |mut reader| async move {
        match read_line_bounded(&mut reader, max_line).await {
            Ok(Some(line)) => Some((Ok(decode_line(line)), reader)),
            Ok(None) => None,
            Err(e) => Some((Err::<String, io::Error>(e), reader)),
        }
    });

    async move {
        info!("client connected");
        run_session(conn, frames, table).await;
        info!("client disconnected");
    }
    .instrument(span)
    .await
}

/// Reads one line without its `\n`. An unterminated tail before end-of-stream still
/// counts as a line. Fails once a line grows past `max_line` bytes, without
/// buffering the rest of it.
async fn read_line_bounded<R>(reader: &mut R, max_line: usize) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok((!line.is_empty()).then_some(line));
        }
        let newline = available.iter().position(|b| *b == b'\n');
        let chunk = &available[..newline.unwrap_or(available.len())];
        if line.len() + chunk.len() > max_line {
            warn!(max_line, "inbound line too long");
            return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
        }
        line.extend_from_slice(chunk);
        let used = chunk.len() + usize::from(newline.is_some());
        reader.consume(used);
        if newline.is_some() {
            return Ok(Some(line));
        }
    }
}

/// Undecodable bytes still reach the session, which answers `bad_request`.
fn decode_line(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Drains the outbound queue onto the socket. Ends on the first write failure,
/// which makes every later send on the connection fail, or when the connection is
/// abandoned, even while a write is stuck on a peer that stopped reading.
async fn write_lines(mut write: OwnedWriteHalf, mut outbound: Outbound) {
    while let Some(msg) = outbound.recv().await {
        let line = match msg.encode_line() {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to encode outbound record");
                break;
            }
        };
        tokio::select! {
            res = write.write_all(line.as_bytes()) => {
                if let Err(e) = res {
                    debug!(error = %e, "write failed");
                    break;
                }
            }
            _ = outbound.abandoned() => {
                debug!("abandoned mid-write");
                break;
            }
        }
    }
    let _ = write.shutdown().await;
}
