//! # Heads-up table core
//!
//! Cards, the deck, round scoring and the request/response records exchanged
//! between the table server and its clients. Nothing here performs I/O, so the
//! server, the console client and tests can all share it.

mod card;
mod message;
mod scoring;

pub use card::*;

pub use message::*;

pub use scoring::*;
