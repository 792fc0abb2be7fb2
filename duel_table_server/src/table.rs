//! The table: waiting queue, seated pair and the one-round-at-a-time game flow.
//!
//! All state is owned by a single actor task. Session loops talk to it through a
//! cloneable [`TableHandle`]; each call enqueues a command and waits until the actor
//! has finished processing it, so a round's deal and result are never interleaved
//! with another join or disconnect.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use duel_table_core::{
    ALREADY_JOINED, Card, Deck, MATCHED, OPPONENT_LEFT, Outcome, Scorer, Seat, SeatHands,
    ServerMessage, WAITING,
};

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::ServerError;

const COMMAND_QUEUE_DEPTH: usize = 256;

enum Command {
    Join {
        conn: ConnectionHandle,
        name: String,
        done: oneshot::Sender<()>,
    },
    Disconnect {
        id: ConnectionId,
        done: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<TableSnapshot>,
    },
}

/// Point-in-time view of the table, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    /// Waiting participants, front of the queue first
    pub waiting: Vec<(ConnectionId, String)>,
    /// Seat 0 and seat 1, when a pair is seated
    pub seated: Option<[ConnectionId; 2]>,
    pub rounds_played: u64,
    pub last_round: Option<RoundRecord>,
}

/// Cards and outcome of the most recent round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundRecord {
    pub hands: SeatHands,
    pub community: [Card; 5],
    pub outcome: Outcome,
}

#[derive(Clone)]
pub struct TableHandle {
    commands: mpsc::Sender<Command>,
}

impl TableHandle {
    /// Adds a participant to the back of the waiting queue and pairs if possible.
    pub async fn join(&self, conn: ConnectionHandle, name: String) -> Result<(), ServerError> {
        let (done, wait) = oneshot::channel();
        self.request(Command::Join { conn, name, done }).await?;
        wait.await.map_err(|_| ServerError::TableClosed)
    }

    /// Forgets a connection, releasing its seat or queue slot.
    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), ServerError> {
        let (done, wait) = oneshot::channel();
        self.request(Command::Disconnect { id, done }).await?;
        wait.await.map_err(|_| ServerError::TableClosed)
    }

    pub async fn snapshot(&self) -> Result<TableSnapshot, ServerError> {
        let (reply, wait) = oneshot::channel();
        self.request(Command::Snapshot { reply }).await?;
        wait.await.map_err(|_| ServerError::TableClosed)
    }

    async fn request(&self, cmd: Command) -> Result<(), ServerError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| ServerError::TableClosed)
    }
}

/// Starts a table actor. It runs until every [`TableHandle`] has been dropped.
pub fn spawn<S: Scorer>(scorer: S, rng: StdRng) -> (TableHandle, JoinHandle<()>) {
    let (commands, inbox) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let actor = TableActor {
        scorer,
        rng,
        waiting: VecDeque::new(),
        pair: None,
        last_round: None,
        rounds_played: 0,
        inbox,
    };
    (TableHandle { commands }, tokio::spawn(actor.run()))
}

struct Participant {
    conn: ConnectionHandle,
    name: String,
}

struct Seated {
    participant: Participant,
    seat: Seat,
    // cleared after the first failed send; nothing more is sent to this seat
    reachable: bool,
}

impl Seated {
    fn id(&self) -> ConnectionId {
        self.participant.conn.id()
    }

    /// Never waits: a seat whose queue is full is abandoned and counts as gone.
    fn deliver(&mut self, msg: ServerMessage) -> bool {
        if !self.reachable {
            return false;
        }
        if self.participant.conn.try_send(msg).is_err() {
            warn!(conn = %self.id(), seat = %self.seat, "delivery failed, seat unreachable");
            self.reachable = false;
        }
        self.reachable
    }
}

struct TableActor<S: Scorer> {
    scorer: S,
    rng: StdRng,
    waiting: VecDeque<Participant>,
    // a pair is either fully seated or absent
    pair: Option<[Seated; 2]>,
    last_round: Option<RoundRecord>,
    rounds_played: u64,
    inbox: mpsc::Receiver<Command>,
}

impl<S: Scorer> TableActor<S> {
    async fn run(mut self) {
        info!("table open");
        while let Some(cmd) = self.inbox.recv().await {
            match cmd {
                Command::Join { conn, name, done } => {
                    self.add_participant(conn, name);
                    let _ = done.send(());
                }
                Command::Disconnect { id, done } => {
                    self.handle_disconnect(id);
                    let _ = done.send(());
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }
        info!("table closed");
    }

    fn is_member(&self, id: ConnectionId) -> bool {
        self.waiting.iter().any(|p| p.conn.id() == id)
            || self
                .pair
                .as_ref()
                .is_some_and(|pair| pair.iter().any(|s| s.id() == id))
    }

    fn add_participant(&mut self, conn: ConnectionHandle, name: String) {
        if self.is_member(conn.id()) {
            debug!(conn = %conn.id(), "duplicate join rejected");
            let _ = conn.try_send(ServerMessage::error(ALREADY_JOINED));
            return;
        }

        info!(conn = %conn.id(), %name, "participant joined");
        if conn.try_send(ServerMessage::status(WAITING)).is_err() {
            debug!(conn = %conn.id(), "joined on a dead connection, not queued");
        } else {
            self.waiting.push_back(Participant { conn, name });
        }
        self.match_if_possible();
    }

    /// Seats the two earliest waiters whenever the table is free.
    fn match_if_possible(&mut self) {
        while self.pair.is_none() && self.waiting.len() >= 2 {
            let (Some(first), Some(second)) = (self.waiting.pop_front(), self.waiting.pop_front())
            else {
                break;
            };
            let mut pair = [
                Seated { participant: first, seat: Seat::Zero, reachable: true },
                Seated { participant: second, seat: Seat::One, reachable: true },
            ];

            for seated in pair.iter_mut() {
                let seat = seated.seat;
                seated.deliver(ServerMessage::Matched { seat });
            }
            broadcast(&mut pair, ServerMessage::status(MATCHED));

            if pair.iter().all(|s| s.reachable) {
                info!(
                    seat0 = %pair[0].participant.name,
                    seat1 = %pair[1].participant.name,
                    "pair seated"
                );
                self.pair = Some(pair);
                self.start_round();
            } else {
                // never seat a pair of one
                for mut seated in pair {
                    if seated.deliver(ServerMessage::status(OPPONENT_LEFT)) {
                        self.waiting.push_back(seated.participant);
                    } else {
                        warn!(conn = %seated.id(), "dropped unreachable participant while matching");
                    }
                }
            }
        }
    }

    /// Deals and settles one round for the seated pair.
    fn start_round(&mut self) {
        let Some(pair) = self.pair.as_mut() else {
            return;
        };

        let mut deck = Deck::shuffled(&mut self.rng);
        let (Some(community), Some(hand0), Some(hand1)) =
            (deck.draw_n::<5>(), deck.draw_n::<2>(), deck.draw_n::<2>())
        else {
            warn!("deck ran short, round abandoned");
            return;
        };
        let hands = SeatHands { seat0: hand0, seat1: hand1 };

        for seated in pair.iter_mut() {
            let seat = seated.seat;
            seated
                .deliver(ServerMessage::Deal {
                    seat,
                    your_hand: *hands.get(seat),
                    community,
                });
        }

        let strength0 = self.scorer.strength(&hands.seat0, &community);
        let strength1 = self.scorer.strength(&hands.seat1, &community);
        let outcome = Outcome::decide(strength0, strength1);
        debug!(?strength0, ?strength1, "strengths");

        broadcast(
            pair,
            ServerMessage::Result {
                hands,
                community,
                winner: outcome,
            },
        );

        self.rounds_played += 1;
        self.last_round = Some(RoundRecord {
            hands,
            community,
            outcome,
        });
        info!(round = self.rounds_played, %outcome, "round settled");
    }

    fn handle_disconnect(&mut self, id: ConnectionId) {
        let queued = self.waiting.len();
        self.waiting.retain(|p| p.conn.id() != id);
        if self.waiting.len() != queued {
            info!(conn = %id, "waiting participant left");
        }

        if let Some(pair) = self
            .pair
            .take_if(|pair| pair.iter().any(|s| s.id() == id))
        {
            info!(conn = %id, "seated participant left, table freed");
            for mut seated in pair {
                if seated.id() == id {
                    continue;
                }
                if seated.deliver(ServerMessage::status(OPPONENT_LEFT)) {
                    debug!(conn = %seated.id(), "opponent requeued");
                    self.waiting.push_back(seated.participant);
                }
            }
        }

        self.match_if_possible();
    }

    fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            waiting: self
                .waiting
                .iter()
                .map(|p| (p.conn.id(), p.name.clone()))
                .collect(),
            seated: self.pair.as_ref().map(|[a, b]| [a.id(), b.id()]),
            rounds_played: self.rounds_played,
            last_round: self.last_round,
        }
    }
}

/// Sends to every reachable seat; a failing seat never blocks the other.
fn broadcast(pair: &mut [Seated; 2], msg: ServerMessage) {
    for seated in pair.iter_mut() {
        seated.deliver(msg.clone());
    }
}
