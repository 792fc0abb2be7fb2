use anyhow::{Context, bail};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use duel_table_core::{ClientMessage, Outcome, Seat, ServerMessage};

/// Joins the table and prints everything the server says.
#[derive(Debug, Parser)]
#[command(name = "duel_table_client", version)]
struct ClientArgs {
    /// `host:port` for the line protocol, or a `ws://host:port/ws` URL
    #[arg(long, default_value = "127.0.0.1:7777")]
    addr: String,

    /// Display name sent with the join request
    #[arg(long, default_value = "player")]
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ClientArgs::parse();
    let hello = [
        ClientMessage::Join { name: args.name.clone() },
        // the server starts rounds on its own; sent for older servers
        ClientMessage::Ready,
    ];

    println!("connecting to {}", args.addr);
    if args.addr.starts_with("ws://") || args.addr.starts_with("wss://") {
        run_ws(&args.addr, &hello).await
    } else {
        run_tcp(&args.addr, &hello).await
    }
}

async fn run_tcp(addr: &str, hello: &[ClientMessage]) -> anyhow::Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    let (read, mut write) = stream.into_split();

    for msg in hello {
        let mut line = serde_json::to_string(msg)?;
        line.push('\n');
        write.write_all(line.as_bytes()).await?;
    }

    let mut lines = BufReader::new(read).lines();
    let mut view = View::default();
    while let Some(line) = lines.next_line().await? {
        view.show_raw(&line);
    }
    println!("server closed the connection");
    Ok(())
}

async fn run_ws(addr: &str, hello: &[ClientMessage]) -> anyhow::Result<()> {
    let url = Url::parse(addr).with_context(|| format!("bad url {addr}"))?;
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("connecting to {url}"))?;
    let (mut write, mut read) = ws_stream.split();

    for msg in hello {
        let payload = serde_json::to_string(msg)?;
        write.send(Message::Text(payload.into())).await?;
    }

    let mut view = View::default();
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => view.show_raw(text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => bail!("receive failed: {e}"),
        }
    }
    println!("server closed the connection");
    Ok(())
}

/// What this client has learned so far, used to phrase the result from its seat.
#[derive(Debug, Default)]
struct View {
    seat: Option<Seat>,
}

impl View {
    fn show_raw(&mut self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(msg) => println!("{}", self.render(&msg)),
            Err(e) => eprintln!("unreadable server record ({e}): {text}"),
        }
    }

    fn render(&mut self, msg: &ServerMessage) -> String {
        match msg {
            ServerMessage::Status { msg } => format!("[status] {msg}"),
            ServerMessage::Matched { seat } => {
                self.seat = Some(*seat);
                format!("[matched] you are seat {seat}")
            }
            ServerMessage::Deal { seat, your_hand, community } => {
                self.seat = Some(*seat);
                format!("[deal] you: {}  board: {}", join(your_hand), join(community))
            }
            ServerMessage::Result { hands, community, winner } => {
                let verdict = match (winner, self.seat) {
                    (Outcome::Draw, _) => "draw".to_string(),
                    (Outcome::Winner(w), Some(me)) if *w == me => "you win".to_string(),
                    (Outcome::Winner(_), Some(_)) => "you lose".to_string(),
                    (Outcome::Winner(w), None) => format!("seat {w} wins"),
                };
                format!(
                    "[result] seat 0: {}  seat 1: {}  board: {}  => {verdict}",
                    join(hands.get(Seat::Zero)),
                    join(hands.get(Seat::One)),
                    join(community),
                )
            }
            ServerMessage::Error { msg } => format!("[error] {msg}"),
        }
    }
}

fn join(cards: &[duel_table_core::Card]) -> String {
    cards.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_table_core::SeatHands;

    fn cards<const N: usize>(codes: [&str; N]) -> [duel_table_core::Card; N] {
        codes.map(|c| c.parse().unwrap())
    }

    #[test]
    fn test_render_round_from_seat_one() {
        let mut view = View::default();
        assert_eq!(view.render(&ServerMessage::status("waiting")), "[status] waiting");
        assert_eq!(
            view.render(&ServerMessage::Matched { seat: Seat::One }),
            "[matched] you are seat 1"
        );
        assert_eq!(
            view.render(&ServerMessage::Deal {
                seat: Seat::One,
                your_hand: cards(["AS", "TD"]),
                community: cards(["2C", "3C", "4C", "5C", "6C"]),
            }),
            "[deal] you: AS TD  board: 2C 3C 4C 5C 6C"
        );
        let result = ServerMessage::Result {
            hands: SeatHands { seat0: cards(["2S", "3D"]), seat1: cards(["AS", "TD"]) },
            community: cards(["2C", "3C", "4C", "5C", "6C"]),
            winner: Outcome::Winner(Seat::One),
        };
        assert!(view.render(&result).ends_with("=> you win"));
    }

    #[test]
    fn test_render_without_seat() {
        let mut view = View::default();
        let result = ServerMessage::Result {
            hands: SeatHands { seat0: cards(["2S", "3D"]), seat1: cards(["AS", "TD"]) },
            community: cards(["2C", "3C", "4C", "5C", "6C"]),
            winner: Outcome::Winner(Seat::Zero),
        };
        assert!(view.render(&result).ends_with("=> seat 0 wins"));
        assert_eq!(view.render(&ServerMessage::error("unknown")), "[error] unknown");
    }
}
