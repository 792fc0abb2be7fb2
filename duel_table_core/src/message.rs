use crate::card::Card;
use crate::scoring::{Outcome, Seat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const WAITING: &str = "waiting";
pub const MATCHED: &str = "matched";
pub const OPPONENT_LEFT: &str = "opponent_left";

pub const BAD_REQUEST: &str = "bad_request";
pub const UNKNOWN: &str = "unknown";
pub const ALREADY_JOINED: &str = "already_joined";

/// Name used when a `join` carries none.
pub const DEFAULT_NAME: &str = "guest";

// --- Client -> server ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the waiting queue under a display name
    Join { name: String },
    /// Accepted for compatibility; rounds start as soon as a pair forms
    Ready,
}

/// Why an inbound record could not be turned into a [`ClientMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("request is not a JSON object")]
    BadRequest,
    #[error("unknown request kind {0:?}")]
    Unknown(Option<String>),
}

impl RequestError {
    /// The error record sent back to the offending connection.
    pub fn reply(&self) -> ServerMessage {
        match self {
            RequestError::BadRequest => ServerMessage::error(BAD_REQUEST),
            RequestError::Unknown(_) => ServerMessage::error(UNKNOWN),
        }
    }
}

/// Decodes one inbound record.
///
/// Anything that is not a JSON object is a bad request; an object whose `type` is
/// missing or unrecognised is unknown. A `join` name that is not a string is kept
/// as its JSON text.
pub fn decode_request(text: &str) -> Result<ClientMessage, RequestError> {
    let value: Value = serde_json::from_str(text).map_err(|_| RequestError::BadRequest)?;
    let Value::Object(fields) = value else {
        return Err(RequestError::BadRequest);
    };

    match fields.get("type").and_then(Value::as_str) {
        Some("join") => {
            let name = match fields.get("name") {
                None | Some(Value::Null) => DEFAULT_NAME.to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            Ok(ClientMessage::Join { name })
        }
        Some("ready") => Ok(ClientMessage::Ready),
        other => Err(RequestError::Unknown(other.map(str::to_string))),
    }
}

// --- Server -> client ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Queue / table status: "waiting", "matched", "opponent_left"
    Status { msg: String },
    /// Sent privately to each member of a new pair
    Matched { seat: Seat },
    /// Private deal: own hole cards plus the shared board
    Deal {
        seat: Seat,
        your_hand: [Card; 2],
        community: [Card; 5],
    },
    /// Showdown, identical for both seats
    Result {
        hands: SeatHands,
        community: [Card; 5],
        winner: Outcome,
    },
    Error { msg: String },
}

/// Both seats' hole cards, keyed `"0"` and `"1"` on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatHands {
    #[serde(rename = "0")]
    pub seat0: [Card; 2],
    #[serde(rename = "1")]
    pub seat1: [Card; 2],
}

impl SeatHands {
    pub fn get(&self, seat: Seat) -> &[Card; 2] {
        match seat {
            Seat::Zero => &self.seat0,
            Seat::One => &self.seat1,
        }
    }
}

impl ServerMessage {
    pub fn status(msg: impl Into<String>) -> Self {
        ServerMessage::Status { msg: msg.into() }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        ServerMessage::Error { msg: msg.into() }
    }

    /// JSON text followed by a newline, for line-delimited transports.
    pub fn encode_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cards<const N: usize>(codes: [&str; N]) -> [Card; N] {
        codes.map(|c| c.parse().unwrap())
    }

    #[test]
    fn test_decode_join_and_ready() {
        assert_eq!(
            decode_request(r#"{"type":"join","name":"alice"}"#),
            Ok(ClientMessage::Join { name: "alice".into() })
        );
        assert_eq!(decode_request(r#"{"type":"ready"}"#), Ok(ClientMessage::Ready));
    }

    #[test]
    fn test_decode_join_name_is_opaque() {
        assert_eq!(
            decode_request(r#"{"type":"join"}"#),
            Ok(ClientMessage::Join { name: DEFAULT_NAME.into() })
        );
        assert_eq!(
            decode_request(r#"{"type":"join","name":42}"#),
            Ok(ClientMessage::Join { name: "42".into() })
        );
        assert_eq!(
            decode_request(r#"{"type":"join","name":""}"#),
            Ok(ClientMessage::Join { name: "".into() })
        );
    }

    #[test]
    fn test_decode_bad_request() {
        assert_eq!(decode_request("{not json"), Err(RequestError::BadRequest));
        assert_eq!(decode_request("[1,2]"), Err(RequestError::BadRequest));
        assert_eq!(decode_request("\"join\""), Err(RequestError::BadRequest));
    }

    #[test]
    fn test_decode_unknown() {
        assert_eq!(
            decode_request(r#"{"type":"fold"}"#),
            Err(RequestError::Unknown(Some("fold".into())))
        );
        assert_eq!(decode_request(r#"{"name":"x"}"#), Err(RequestError::Unknown(None)));
        assert_eq!(decode_request(r#"{"type":7}"#), Err(RequestError::Unknown(None)));
    }

    #[test]
    fn test_error_replies() {
        assert_eq!(RequestError::BadRequest.reply(), ServerMessage::error("bad_request"));
        assert_eq!(RequestError::Unknown(None).reply(), ServerMessage::error("unknown"));
    }

    #[test]
    fn test_client_message_encoding() {
        let join = serde_json::to_value(ClientMessage::Join { name: "bob".into() }).unwrap();
        assert_eq!(join, json!({"type": "join", "name": "bob"}));
        let ready = serde_json::to_value(ClientMessage::Ready).unwrap();
        assert_eq!(ready, json!({"type": "ready"}));
    }

    #[test]
    fn test_server_message_shapes() {
        assert_eq!(
            serde_json::to_value(ServerMessage::status(WAITING)).unwrap(),
            json!({"type": "status", "msg": "waiting"})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::Matched { seat: Seat::One }).unwrap(),
            json!({"type": "matched", "seat": 1})
        );

        let deal = ServerMessage::Deal {
            seat: Seat::Zero,
            your_hand: cards(["AS", "KD"]),
            community: cards(["2C", "3C", "4C", "5C", "TH"]),
        };
        assert_eq!(
            serde_json::to_value(deal).unwrap(),
            json!({
                "type": "deal",
                "seat": 0,
                "your_hand": ["AS", "KD"],
                "community": ["2C", "3C", "4C", "5C", "TH"],
            })
        );

        let result = ServerMessage::Result {
            hands: SeatHands { seat0: cards(["AS", "KD"]), seat1: cards(["9H", "9S"]) },
            community: cards(["2C", "3C", "4C", "5C", "TH"]),
            winner: Outcome::Draw,
        };
        assert_eq!(
            serde_json::to_value(result).unwrap(),
            json!({
                "type": "result",
                "hands": {"0": ["AS", "KD"], "1": ["9H", "9S"]},
                "community": ["2C", "3C", "4C", "5C", "TH"],
                "winner": "draw",
            })
        );
    }

    #[test]
    fn test_encode_line() {
        let line = ServerMessage::error(UNKNOWN).encode_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let back: ServerMessage = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(back, ServerMessage::error(UNKNOWN));
    }
}
